//! Spotify Web API client in the catalog role.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use base64::Engine;
use log::{debug, info};
use serde_json::Value;

use crate::model::TagSet;
use crate::providers::http::{self, HttpFailure, HttpFailureKind, RetryPolicy};
use crate::providers::{AlbumSummary, ArtistRef, ArtistTags, MusicMetadataProvider};

const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SPOTIFY_SOURCE_NAME: &str = "Spotify";
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);
const MAX_PAGE_SIZE: usize = 50;

/// Connection settings for [`SpotifyClient`].
#[derive(Debug, Clone)]
pub struct SpotifySettings {
    pub client_id: String,
    pub client_secret: String,
    pub request_timeout: Duration,
    /// ISO country code applied to album listings; empty means no filter.
    pub market: String,
}

impl Default for SpotifySettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            request_timeout: Duration::from_secs(10),
            market: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Client-credentials Spotify client backed by `ureq`.
pub struct SpotifyClient {
    http_client: ureq::Agent,
    settings: SpotifySettings,
    retry_policy: RetryPolicy,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(settings: SpotifySettings) -> Self {
        Self {
            http_client: http::build_agent(Duration::from_secs(5), settings.request_timeout),
            settings: SpotifySettings {
                client_id: settings.client_id.trim().to_string(),
                client_secret: settings.client_secret.trim().to_string(),
                ..settings
            },
            retry_policy: RetryPolicy::default(),
            token: Mutex::new(None),
        }
    }

    fn basic_authorization(&self) -> String {
        let credentials = format!("{}:{}", self.settings.client_id, self.settings.client_secret);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        )
    }

    fn parse_token(payload: &Value, now: Instant) -> Result<AccessToken, String> {
        let value = http::str_field(payload, "access_token")
            .ok_or_else(|| "Spotify token response missing access_token".to_string())?;
        let lifetime = Duration::from_secs(payload["expires_in"].as_u64().unwrap_or(3600));
        Ok(AccessToken {
            value,
            expires_at: now + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        })
    }

    fn access_token(&self) -> Result<String, String> {
        let mut guard = self
            .token
            .lock()
            .map_err(|_| "Spotify token cache poisoned".to_string())?;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting Spotify access token");
        let authorization = self.basic_authorization();
        let payload = http::with_timeout_backoff("Spotify token", &self.retry_policy, || {
            http::post_form_json_once(
                &self.http_client,
                SPOTIFY_TOKEN_URL,
                &[("Authorization", authorization.as_str())],
                &[("grant_type", "client_credentials")],
                self.settings.request_timeout,
            )
        })?;
        let token = Self::parse_token(&payload, Instant::now())?;
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    fn invalidate_token(&self) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = None;
        }
    }

    fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, String> {
        let url = http::request_url(&format!("{SPOTIFY_API_URL}{path}"), params);
        let label = format!("Spotify {path}");
        let mut refreshed = false;
        loop {
            let token = self.access_token()?;
            let authorization = format!("Bearer {token}");
            let result = http::with_timeout_backoff(&label, &self.retry_policy, || {
                http::get_json_once(
                    &self.http_client,
                    &url,
                    &[("Authorization", authorization.as_str())],
                    self.settings.request_timeout,
                )
            });
            match result {
                Err(HttpFailure {
                    kind: HttpFailureKind::Unauthorized,
                    ..
                }) if !refreshed => {
                    info!("Spotify token rejected, refreshing");
                    self.invalidate_token();
                    refreshed = true;
                }
                other => return other.map_err(String::from),
            }
        }
    }

    fn market_params(&self) -> Vec<(&str, &str)> {
        let market = self.settings.market.trim();
        if market.is_empty() {
            Vec::new()
        } else {
            vec![("market", market)]
        }
    }

    fn parse_artist(value: &Value) -> Option<ArtistRef> {
        Some(ArtistRef {
            id: http::str_field(value, "id"),
            name: http::str_field(value, "name")?,
            url: http::str_field(&value["external_urls"], "spotify"),
        })
    }

    fn parse_artist_search(payload: &Value) -> Vec<ArtistRef> {
        http::array_or_single(&payload["artists"]["items"])
            .into_iter()
            .filter_map(Self::parse_artist)
            .collect()
    }

    fn parse_related_artists(payload: &Value, limit: usize) -> Vec<String> {
        http::array_or_single(&payload["artists"])
            .into_iter()
            .filter_map(|artist| http::str_field(artist, "name"))
            .take(limit)
            .collect()
    }

    fn parse_artist_genres(payload: &Value, fallback_name: &str, limit: usize) -> ArtistTags {
        let tags: TagSet = payload["genres"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(str::to_lowercase)
            .take(limit)
            .collect();
        ArtistTags {
            artist: http::str_field(payload, "name").unwrap_or_else(|| fallback_name.to_string()),
            tags,
        }
    }

    /// First (largest) image of an album or artist object.
    fn first_image(value: &Value) -> Option<String> {
        value["images"]
            .as_array()
            .into_iter()
            .flatten()
            .find_map(|image| http::str_field(image, "url"))
    }

    fn primary_artist_name(album: &Value) -> String {
        album["artists"]
            .as_array()
            .and_then(|artists| artists.first())
            .and_then(|artist| http::str_field(artist, "name"))
            .unwrap_or_default()
    }

    fn parse_album(album: &Value) -> Option<AlbumSummary> {
        let track_count = album["total_tracks"]
            .as_u64()
            .or_else(|| album["tracks"]["total"].as_u64())
            .and_then(|count| u32::try_from(count).ok());
        let genres = album["genres"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(str::to_lowercase)
            .collect();
        Some(AlbumSummary {
            id: http::str_field(album, "id"),
            title: http::str_field(album, "name")?,
            artist: Self::primary_artist_name(album),
            cover_url: Self::first_image(album),
            url: http::str_field(&album["external_urls"], "spotify"),
            release_date: http::str_field(album, "release_date"),
            track_count,
            genres,
        })
    }

    fn parse_artist_albums(payload: &Value) -> Vec<AlbumSummary> {
        http::array_or_single(&payload["items"])
            .into_iter()
            .filter_map(Self::parse_album)
            .collect()
    }

    fn artist_id(&self, artist: &ArtistRef) -> Result<Option<String>, String> {
        if let Some(id) = artist.id.as_ref().filter(|id| !id.trim().is_empty()) {
            return Ok(Some(id.clone()));
        }
        let resolved = self.search_artists(&artist.name, 1)?;
        Ok(resolved.into_iter().next().and_then(|artist| artist.id))
    }
}

impl MusicMetadataProvider for SpotifyClient {
    fn name(&self) -> &'static str {
        SPOTIFY_SOURCE_NAME
    }

    fn is_configured(&self) -> bool {
        !self.settings.client_id.is_empty() && !self.settings.client_secret.is_empty()
    }

    fn search_artists(&self, name: &str, limit: usize) -> Result<Vec<ArtistRef>, String> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE).to_string();
        let payload = self.get(
            "/search",
            &[("q", name), ("type", "artist"), ("limit", limit.as_str())],
        )?;
        Ok(Self::parse_artist_search(&payload))
    }

    fn related_artists(&self, artist: &ArtistRef, limit: usize) -> Result<Vec<String>, String> {
        let Some(id) = self.artist_id(artist)? else {
            return Ok(Vec::new());
        };
        let payload = self.get(&format!("/artists/{id}/related-artists"), &[])?;
        Ok(Self::parse_related_artists(&payload, limit))
    }

    fn top_tags(&self, artist: &ArtistRef, limit: usize) -> Result<ArtistTags, String> {
        let Some(id) = self.artist_id(artist)? else {
            return Ok(ArtistTags {
                artist: artist.name.clone(),
                tags: TagSet::default(),
            });
        };
        let payload = self.get(&format!("/artists/{id}"), &[])?;
        Ok(Self::parse_artist_genres(&payload, &artist.name, limit))
    }

    fn artist_albums(
        &self,
        artist: &ArtistRef,
        limit: usize,
    ) -> Result<Vec<AlbumSummary>, String> {
        let Some(id) = self.artist_id(artist)? else {
            return Ok(Vec::new());
        };
        let limit = limit.clamp(1, MAX_PAGE_SIZE).to_string();
        let mut params = vec![("include_groups", "album"), ("limit", limit.as_str())];
        params.extend(self.market_params());
        let payload = self.get(&format!("/artists/{id}/albums"), &params)?;
        Ok(Self::parse_artist_albums(&payload))
    }

    fn album_detail(&self, album: &AlbumSummary) -> Result<AlbumSummary, String> {
        let Some(id) = album.id.as_ref() else {
            return Ok(album.clone());
        };
        let payload = self.get(&format!("/albums/{id}"), &self.market_params())?;
        let Some(detailed) = Self::parse_album(&payload) else {
            return Ok(album.clone());
        };
        Ok(AlbumSummary {
            cover_url: detailed.cover_url.or_else(|| album.cover_url.clone()),
            url: detailed.url.or_else(|| album.url.clone()),
            release_date: detailed.release_date.or_else(|| album.release_date.clone()),
            track_count: detailed.track_count.or(album.track_count),
            genres: if detailed.genres.is_empty() {
                album.genres.clone()
            } else {
                detailed.genres
            },
            ..detailed
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_artist_search_reads_ids_and_urls() {
        let payload = json!({
            "artists": {"items": [{
                "id": "4x1nvY2FN8jxqAFA0DA02H",
                "name": "Dying Fetus",
                "external_urls": {"spotify": "https://open.spotify.com/artist/4x1n"}
            }]}
        });
        let artists = SpotifyClient::parse_artist_search(&payload);
        assert_eq!(artists.len(), 1);
        assert_eq!(artists[0].id.as_deref(), Some("4x1nvY2FN8jxqAFA0DA02H"));
        assert_eq!(
            artists[0].url.as_deref(),
            Some("https://open.spotify.com/artist/4x1n")
        );
    }

    #[test]
    fn test_parse_related_artists_respects_limit() {
        let payload = json!({"artists": [
            {"name": "Devourment"}, {"name": "Internal Bleeding"}, {"name": "Skinless"}
        ]});
        assert_eq!(
            SpotifyClient::parse_related_artists(&payload, 2),
            vec!["Devourment".to_string(), "Internal Bleeding".to_string()]
        );
    }

    #[test]
    fn test_parse_artist_genres_lowercases_and_keeps_name() {
        let payload = json!({"name": "Dying Fetus", "genres": ["Brutal Death Metal", "grindcore"]});
        let tags = SpotifyClient::parse_artist_genres(&payload, "dying fetus", 10);
        assert_eq!(tags.artist, "Dying Fetus");
        assert!(tags.tags.contains("brutal death metal"));
        assert!(tags.tags.contains("grindcore"));
    }

    #[test]
    fn test_parse_artist_albums_takes_primary_artist_and_first_image() {
        let payload = json!({"items": [{
            "id": "abc",
            "name": "Destroy the Opposition",
            "release_date": "2000-01-01",
            "total_tracks": 8,
            "artists": [{"name": "Dying Fetus"}, {"name": "Guest"}],
            "images": [{"url": "https://i.scdn.co/large"}, {"url": "https://i.scdn.co/small"}],
            "external_urls": {"spotify": "https://open.spotify.com/album/abc"}
        }]});
        let albums = SpotifyClient::parse_artist_albums(&payload);
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].artist, "Dying Fetus");
        assert_eq!(albums[0].cover_url.as_deref(), Some("https://i.scdn.co/large"));
        assert_eq!(albums[0].track_count, Some(8));
    }

    #[test]
    fn test_parse_token_applies_expiry_margin() {
        let now = Instant::now();
        let token = SpotifyClient::parse_token(
            &json!({"access_token": "tok", "expires_in": 3600}),
            now,
        )
        .expect("token");
        assert_eq!(token.value, "tok");
        assert_eq!(token.expires_at, now + Duration::from_secs(3570));
        assert!(SpotifyClient::parse_token(&json!({}), now).is_err());
    }

    #[test]
    fn test_is_configured_requires_both_credentials() {
        let client = SpotifyClient::new(SpotifySettings {
            client_id: "id".to_string(),
            ..SpotifySettings::default()
        });
        assert!(!client.is_configured());
        let client = SpotifyClient::new(SpotifySettings {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            ..SpotifySettings::default()
        });
        assert!(client.is_configured());
        assert_eq!(client.basic_authorization(), "Basic aWQ6c2VjcmV0");
    }
}
