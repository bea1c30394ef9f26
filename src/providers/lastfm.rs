//! Last.fm client in the tag role: top tags, similar artists, album search.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use governor::state::NotKeyed;
use governor::{Quota, RateLimiter};
use log::debug;
use serde_json::Value;

use crate::model::TagSet;
use crate::providers::http::{self, HttpFailure, HttpFailureKind, RetryPolicy};
use crate::providers::{AlbumMatch, AlbumSummary, ArtistRef, ArtistTags, MusicMetadataProvider};

const LASTFM_API_URL: &str = "https://ws.audioscrobbler.com/2.0/";
const LASTFM_SOURCE_NAME: &str = "Last.fm";
const LASTFM_USER_AGENT: &str = "metalwall/0.1.0 (random album discovery)";
const LASTFM_ERROR_NOT_FOUND: i64 = 6;
const RATE_LIMIT_WAIT_LIMIT: Duration = Duration::from_secs(3);

/// Connection settings for [`LastFmClient`].
#[derive(Debug, Clone)]
pub struct LastFmSettings {
    pub api_key: String,
    pub request_timeout: Duration,
    pub requests_per_second: u32,
}

impl Default for LastFmSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            request_timeout: Duration::from_secs(10),
            requests_per_second: 5,
        }
    }
}

/// Last.fm web-service client backed by `ureq`.
pub struct LastFmClient {
    http_client: ureq::Agent,
    api_key: String,
    request_timeout: Duration,
    retry_policy: RetryPolicy,
    limiter: RateLimiter<NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>,
}

impl LastFmClient {
    pub fn new(settings: LastFmSettings) -> Self {
        let per_second = NonZeroU32::new(settings.requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        Self {
            http_client: http::build_agent(Duration::from_secs(5), settings.request_timeout),
            api_key: settings.api_key.trim().to_string(),
            request_timeout: settings.request_timeout,
            retry_policy: RetryPolicy::default(),
            limiter: RateLimiter::direct(Quota::per_second(per_second)),
        }
    }

    fn wait_for_rate_limit_slot(&self) -> bool {
        if self.limiter.check().is_ok() {
            return true;
        }
        let deadline = Instant::now() + RATE_LIMIT_WAIT_LIMIT;
        while Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
            if self.limiter.check().is_ok() {
                return true;
            }
        }
        false
    }

    fn call(&self, method: &str, params: &[(&str, &str)]) -> Result<Value, String> {
        let mut all_params = vec![
            ("method", method),
            ("api_key", self.api_key.as_str()),
            ("format", "json"),
        ];
        all_params.extend_from_slice(params);
        let url = http::request_url(LASTFM_API_URL, &all_params);

        let label = format!("Last.fm {method}");
        let payload = http::with_timeout_backoff(&label, &self.retry_policy, || {
            if !self.wait_for_rate_limit_slot() {
                return Err(HttpFailure::new(
                    HttpFailureKind::RateLimited,
                    "Last.fm rate limit saturated",
                ));
            }
            http::get_json_once(
                &self.http_client,
                &url,
                &[("User-Agent", LASTFM_USER_AGENT)],
                self.request_timeout,
            )
        })?;
        Self::check_api_error(method, payload)
    }

    /// Maps Last.fm's in-body error objects; "not found" becomes an empty payload.
    fn check_api_error(method: &str, payload: Value) -> Result<Value, String> {
        let Some(code) = payload["error"].as_i64() else {
            return Ok(payload);
        };
        if code == LASTFM_ERROR_NOT_FOUND {
            debug!("Last.fm {method}: not found");
            return Ok(Value::Null);
        }
        let message = payload["message"].as_str().unwrap_or("unknown error");
        Err(format!("Last.fm {method} error {code}: {message}"))
    }

    fn best_image(value: &Value) -> Option<String> {
        http::array_or_single(&value["image"])
            .into_iter()
            .rev()
            .filter_map(|image| http::str_field(image, "#text"))
            .next()
    }

    fn parse_artist_matches(payload: &Value) -> Vec<ArtistRef> {
        http::array_or_single(&payload["results"]["artistmatches"]["artist"])
            .into_iter()
            .filter_map(|artist| {
                let name = http::str_field(artist, "name")?;
                Some(ArtistRef {
                    id: http::str_field(artist, "mbid"),
                    name,
                    url: http::str_field(artist, "url"),
                })
            })
            .collect()
    }

    fn parse_similar_artists(payload: &Value, limit: usize) -> Vec<String> {
        http::array_or_single(&payload["similarartists"]["artist"])
            .into_iter()
            .filter_map(|artist| http::str_field(artist, "name"))
            .take(limit)
            .collect()
    }

    fn parse_top_tags(payload: &Value, limit: usize) -> ArtistTags {
        let artist = payload["toptags"]["@attr"]["artist"]
            .as_str()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        let tags: TagSet = http::array_or_single(&payload["toptags"]["tag"])
            .into_iter()
            .filter(|tag| {
                let count = tag["count"]
                    .as_i64()
                    .or_else(|| tag["count"].as_str().and_then(|count| count.parse().ok()));
                match count {
                    Some(count) => count > 0,
                    None => true,
                }
            })
            .filter_map(|tag| http::str_field(tag, "name"))
            .map(|name| name.to_lowercase())
            .take(limit)
            .collect();
        ArtistTags { artist, tags }
    }

    fn parse_top_albums(payload: &Value) -> Vec<AlbumSummary> {
        http::array_or_single(&payload["topalbums"]["album"])
            .into_iter()
            .filter_map(|album| {
                let title = http::str_field(album, "name").filter(|name| name != "(null)")?;
                Some(AlbumSummary {
                    id: http::str_field(album, "mbid"),
                    title,
                    artist: http::str_field(&album["artist"], "name").unwrap_or_default(),
                    cover_url: Self::best_image(album),
                    url: http::str_field(album, "url"),
                    ..AlbumSummary::default()
                })
            })
            .collect()
    }

    fn parse_album_info(payload: &Value, summary: &AlbumSummary) -> AlbumSummary {
        let album = &payload["album"];
        if album.is_null() {
            return summary.clone();
        }
        let track_count = http::array_or_single(&album["tracks"]["track"]).len();
        let genres: Vec<String> = http::array_or_single(&album["tags"]["tag"])
            .into_iter()
            .filter_map(|tag| http::str_field(tag, "name"))
            .map(|name| name.to_lowercase())
            .collect();
        AlbumSummary {
            id: summary.id.clone(),
            title: http::str_field(album, "name").unwrap_or_else(|| summary.title.clone()),
            artist: http::str_field(album, "artist").unwrap_or_else(|| summary.artist.clone()),
            cover_url: Self::best_image(album).or_else(|| summary.cover_url.clone()),
            url: http::str_field(album, "url").or_else(|| summary.url.clone()),
            release_date: http::str_field(&album["wiki"], "published")
                .or_else(|| summary.release_date.clone()),
            track_count: u32::try_from(track_count)
                .ok()
                .filter(|count| *count > 0)
                .or(summary.track_count),
            genres: if genres.is_empty() {
                summary.genres.clone()
            } else {
                genres
            },
        }
    }

    fn parse_album_matches(payload: &Value) -> Vec<AlbumMatch> {
        http::array_or_single(&payload["results"]["albummatches"]["album"])
            .into_iter()
            .filter_map(|album| {
                Some(AlbumMatch {
                    title: http::str_field(album, "name")?,
                    artist: http::str_field(album, "artist")?,
                    url: http::str_field(album, "url"),
                })
            })
            .collect()
    }
}

impl MusicMetadataProvider for LastFmClient {
    fn name(&self) -> &'static str {
        LASTFM_SOURCE_NAME
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn accepts_artist_names(&self) -> bool {
        true
    }

    fn search_artists(&self, name: &str, limit: usize) -> Result<Vec<ArtistRef>, String> {
        let limit = limit.to_string();
        let payload = self.call("artist.search", &[("artist", name), ("limit", limit.as_str())])?;
        Ok(Self::parse_artist_matches(&payload))
    }

    fn related_artists(&self, artist: &ArtistRef, limit: usize) -> Result<Vec<String>, String> {
        let limit_param = limit.to_string();
        let payload = self.call(
            "artist.getsimilar",
            &[
                ("artist", artist.name.as_str()),
                ("autocorrect", "1"),
                ("limit", limit_param.as_str()),
            ],
        )?;
        Ok(Self::parse_similar_artists(&payload, limit))
    }

    fn top_tags(&self, artist: &ArtistRef, limit: usize) -> Result<ArtistTags, String> {
        let payload = self.call(
            "artist.gettoptags",
            &[("artist", artist.name.as_str()), ("autocorrect", "1")],
        )?;
        Ok(Self::parse_top_tags(&payload, limit))
    }

    fn artist_albums(
        &self,
        artist: &ArtistRef,
        limit: usize,
    ) -> Result<Vec<AlbumSummary>, String> {
        let limit = limit.to_string();
        let payload = self.call(
            "artist.gettopalbums",
            &[
                ("artist", artist.name.as_str()),
                ("autocorrect", "1"),
                ("limit", limit.as_str()),
            ],
        )?;
        Ok(Self::parse_top_albums(&payload))
    }

    fn album_detail(&self, album: &AlbumSummary) -> Result<AlbumSummary, String> {
        let payload = self.call(
            "album.getinfo",
            &[
                ("artist", album.artist.as_str()),
                ("album", album.title.as_str()),
                ("autocorrect", "1"),
            ],
        )?;
        Ok(Self::parse_album_info(&payload, album))
    }

    fn search_albums(
        &self,
        title: &str,
        artist: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AlbumMatch>, String> {
        let limit_param = limit.to_string();
        let mut matches = Vec::new();
        if let Some(artist) = artist.filter(|artist| !artist.trim().is_empty()) {
            let query = format!("{title} {artist}");
            let payload =
                self.call("album.search", &[("album", query.as_str()), ("limit", limit_param.as_str())])?;
            matches = Self::parse_album_matches(&payload);
        }
        if matches.is_empty() {
            let payload =
                self.call("album.search", &[("album", title), ("limit", limit_param.as_str())])?;
            matches = Self::parse_album_matches(&payload);
        }
        matches.truncate(limit);
        Ok(matches)
    }
}
