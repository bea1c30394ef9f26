//! Bandcamp search-page scraping for alternate album links.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::fallback::{self, Strategy};
use crate::model::AlternateLink;
use crate::providers::http::{self, HttpFailure, RetryPolicy};
use crate::providers::StorefrontSearch;
use crate::text;

const BANDCAMP_BASE_URL: &str = "https://bandcamp.com";
const BANDCAMP_SEARCH_URL: &str = "https://bandcamp.com/search";
const RESULT_BLOCK_WINDOW: usize = 6000;

const DESKTOP_USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0",
];
const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1";

static JSON_LD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("valid json-ld regex")
});
static RESULT_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<(?:li|div)[^>]*class\s*=\s*["'][^"']*\b(?:searchresult|search-item|result-item)\b[^"']*["'][^>]*>"#)
        .expect("valid result regex")
});
static HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a[^>]*href\s*=\s*["']([^"']+)["']"#).expect("valid href regex")
});
static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<div[^>]*class\s*=\s*["'][^"']*\bheading\b[^"']*["'][^>]*>(.*?)</div>|<h[23][^>]*>(.*?)</h[23]>"#)
        .expect("valid heading regex")
});
static SUBHEAD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<div[^>]*class\s*=\s*["'][^"']*\b(?:subhead|artist)\b[^"']*["'][^>]*>(.*?)</div>|<p[^>]*>(.*?)</p>"#)
        .expect("valid subhead regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag regex"));

/// Request pacing and timeouts for [`BandcampStorefront`].
#[derive(Debug, Clone, Copy)]
pub struct StorefrontSettings {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub request_timeout: Duration,
    pub mobile_retry_timeout: Duration,
}

impl Default for StorefrontSettings {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(3000),
            request_timeout: Duration::from_secs(20),
            mobile_retry_timeout: Duration::from_secs(30),
        }
    }
}

pub struct BandcampStorefront {
    http_client: ureq::Agent,
    settings: StorefrontSettings,
    retry_policy: RetryPolicy,
    next_user_agent: AtomicUsize,
}

impl BandcampStorefront {
    pub fn new(settings: StorefrontSettings) -> Self {
        let io_timeout = settings.request_timeout.max(settings.mobile_retry_timeout);
        Self {
            http_client: http::build_agent(Duration::from_secs(10), io_timeout),
            settings,
            retry_policy: RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            },
            next_user_agent: AtomicUsize::new(rand::random::<u64>() as usize),
        }
    }

    fn desktop_user_agent(&self) -> &'static str {
        let index = self.next_user_agent.fetch_add(1, Ordering::Relaxed);
        DESKTOP_USER_AGENTS[index % DESKTOP_USER_AGENTS.len()]
    }

    fn jitter_delay(settings: &StorefrontSettings, random: u64) -> Duration {
        let min = settings.min_delay.as_millis() as u64;
        let max = (settings.max_delay.as_millis() as u64).max(min);
        Duration::from_millis(min + random % (max - min + 1))
    }

    fn fetch(&self, url: &str, user_agent: &str, timeout: Duration) -> Result<String, HttpFailure> {
        std::thread::sleep(Self::jitter_delay(&self.settings, rand::random::<u64>()));
        http::with_timeout_backoff("Bandcamp search", &self.retry_policy, || {
            http::get_text_once(
                &self.http_client,
                url,
                &[
                    ("User-Agent", user_agent),
                    (
                        "Accept",
                        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                    ),
                    ("Accept-Language", "en-US,en;q=0.9"),
                    ("Referer", "https://bandcamp.com/"),
                ],
                timeout,
            )
        })
    }
}

impl StorefrontSearch for BandcampStorefront {
    fn search(&self, artist: &str, album: &str) -> Result<Option<AlternateLink>, String> {
        let query = format!("{artist} {album}");
        let url = http::request_url(
            BANDCAMP_SEARCH_URL,
            &[("q", query.trim()), ("item_type", "a")],
        );

        let desktop = self.fetch(&url, self.desktop_user_agent(), self.settings.request_timeout);
        let page = match desktop {
            Ok(page) => {
                if let Some(link) = parse_search_page(&page) {
                    return Ok(Some(link));
                }
                debug!("Bandcamp desktop page had no results for '{query}', retrying as mobile");
                self.fetch(&url, MOBILE_USER_AGENT, self.settings.mobile_retry_timeout)
            }
            Err(failure) => {
                info!("Bandcamp desktop request failed ({failure}), retrying as mobile");
                self.fetch(&url, MOBILE_USER_AGENT, self.settings.mobile_retry_timeout)
            }
        }?;
        Ok(parse_search_page(&page))
    }
}

/// Extracts the first album result from a storefront page.
pub fn parse_search_page(html: &str) -> Option<AlternateLink> {
    let from_structured_data = |page: &str| parse_structured_data(page);
    let from_result_list = |page: &str| parse_result_list(page);
    let strategies: [Strategy<'_, str, AlternateLink>; 2] = [
        ("structured data", &from_structured_data),
        ("result list", &from_result_list),
    ];
    fallback::first_success("Bandcamp page", html, &strategies).map(|(_, link)| link)
}

fn parse_structured_data(html: &str) -> Option<AlternateLink> {
    JSON_LD_RE
        .captures_iter(html)
        .filter_map(|captures| serde_json::from_str::<Value>(captures.get(1)?.as_str().trim()).ok())
        .find_map(|value| find_music_album(&value))
}

fn is_music_album(value: &Value) -> bool {
    match &value["@type"] {
        Value::String(kind) => kind == "MusicAlbum",
        Value::Array(kinds) => kinds.iter().any(|kind| kind == "MusicAlbum"),
        _ => false,
    }
}

fn find_music_album(value: &Value) -> Option<AlternateLink> {
    match value {
        Value::Object(map) => {
            if is_music_album(value) {
                let album = http::str_field(value, "name")?;
                let artist = match &value["byArtist"] {
                    Value::String(name) => Some(name.trim().to_string()),
                    by_artist => http::array_or_single(by_artist)
                        .into_iter()
                        .find_map(|artist| http::str_field(artist, "name")),
                }?;
                let url = http::str_field(value, "url").or_else(|| http::str_field(value, "@id"))?;
                return Some(AlternateLink {
                    url: clean_result_url(&url),
                    artist: text::decode_html_entities(&artist),
                    album: text::decode_html_entities(&album),
                });
            }
            map.values().find_map(find_music_album)
        }
        Value::Array(items) => items.iter().find_map(find_music_album),
        _ => None,
    }
}

fn strip_tags(fragment: &str) -> String {
    let without_tags = TAG_RE.replace_all(fragment, " ");
    text::collapse_whitespace(&text::decode_html_entities(&without_tags))
}

fn first_group(re: &Regex, block: &str) -> Option<String> {
    re.captures_iter(block)
        .filter_map(|captures| captures.get(1).or_else(|| captures.get(2)))
        .map(|group| strip_tags(group.as_str()))
        .find(|text| !text.is_empty())
}

fn parse_result_list(html: &str) -> Option<AlternateLink> {
    let start = RESULT_START_RE.find(html)?.start();
    let mut end = (start + RESULT_BLOCK_WINDOW).min(html.len());
    while !html.is_char_boundary(end) {
        end -= 1;
    }
    let window = &html[start..end];
    let block = match window.find("</li>") {
        Some(close) => &window[..close],
        None => window,
    };

    let href = HREF_RE.captures(block)?.get(1)?.as_str();
    let album = first_group(&HEADING_RE, block)?;
    let artist = first_group(&SUBHEAD_RE, block)
        .map(|subhead| strip_by_prefix(&subhead))
        .unwrap_or_default();
    Some(AlternateLink {
        url: clean_result_url(&text::decode_html_entities(href)),
        artist,
        album,
    })
}

/// "by Artist" subheads; track results also carry "from Album".
fn strip_by_prefix(subhead: &str) -> String {
    let trimmed = subhead.trim();
    let without_by = trimmed
        .strip_prefix("by ")
        .or_else(|| trimmed.strip_prefix("By "))
        .unwrap_or(trimmed);
    let artist = match without_by.find(" from ") {
        Some(index) => &without_by[..index],
        None => without_by,
    };
    artist.trim().to_string()
}

/// Drops the query string and makes site-relative links absolute.
pub fn clean_result_url(href: &str) -> String {
    let without_query = href.split('?').next().unwrap_or(href).trim();
    if without_query.starts_with("//") {
        format!("https:{without_query}")
    } else if without_query.starts_with('/') {
        format!("{BANDCAMP_BASE_URL}{without_query}")
    } else {
        without_query.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_PAGE: &str = r#"
        <ul class="result-items">
          <li class="searchresult data-search">
            <a class="artcont" href="https://dyingfetus.bandcamp.com/album/destroy-the-opposition?from=search&amp;search_item_id=1">
              <div class="art"><img src="cover.jpg"></div>
            </a>
            <div class="result-info">
              <div class="itemtype">ALBUM</div>
              <div class="heading">
                <a href="https://dyingfetus.bandcamp.com/album/destroy-the-opposition?from=search">Destroy the Opposition</a>
              </div>
              <div class="subhead">
                by Dying Fetus
              </div>
            </div>
          </li>
          <li class="searchresult data-search">
            <div class="heading"><a href="/other">Other</a></div>
          </li>
        </ul>"#;

    #[test]
    fn test_parse_result_list_reads_first_result() {
        let link = parse_search_page(SEARCH_PAGE).expect("result");
        assert_eq!(
            link.url,
            "https://dyingfetus.bandcamp.com/album/destroy-the-opposition"
        );
        assert_eq!(link.album, "Destroy the Opposition");
        assert_eq!(link.artist, "Dying Fetus");
    }

    #[test]
    fn test_structured_data_wins_over_result_list() {
        let page = format!(
            r#"<script type="application/ld+json">
            {{"@context": "https://schema.org", "@graph": [
              {{"@type": "MusicAlbum", "name": "Obscura &amp; More",
                "@id": "https://gorguts.bandcamp.com/album/obscura",
                "byArtist": {{"@type": "MusicGroup", "name": "Gorguts"}}}}
            ]}}
            </script>{SEARCH_PAGE}"#
        );
        let link = parse_search_page(&page).expect("result");
        assert_eq!(link.artist, "Gorguts");
        assert_eq!(link.album, "Obscura & More");
        assert_eq!(link.url, "https://gorguts.bandcamp.com/album/obscura");
    }

    #[test]
    fn test_invalid_structured_data_falls_back_to_result_list() {
        let page = format!(
            r#"<script type="application/ld+json">{{not json</script>{SEARCH_PAGE}"#
        );
        assert_eq!(
            parse_search_page(&page).map(|link| link.artist),
            Some("Dying Fetus".to_string())
        );
    }

    #[test]
    fn test_page_without_results_yields_none() {
        assert_eq!(parse_search_page("<html><body>No results</body></html>"), None);
    }

    #[test]
    fn test_clean_result_url_makes_absolute() {
        assert_eq!(
            clean_result_url("/album/x?from=search"),
            "https://bandcamp.com/album/x"
        );
        assert_eq!(clean_result_url("//a.bandcamp.com/album/y"), "https://a.bandcamp.com/album/y");
    }

    #[test]
    fn test_strip_by_prefix_drops_track_source() {
        assert_eq!(strip_by_prefix("by Gorguts"), "Gorguts");
        assert_eq!(strip_by_prefix("from Obscura by Gorguts"), "from Obscura by Gorguts");
        assert_eq!(strip_by_prefix("by Gorguts from Obscura"), "Gorguts");
    }

    #[test]
    fn test_jitter_delay_stays_in_range() {
        let settings = StorefrontSettings::default();
        for random in [0, 1, 2500, 2501, u64::MAX] {
            let jitter = BandcampStorefront::jitter_delay(&settings, random);
            assert!(jitter >= settings.min_delay && jitter <= settings.max_delay);
        }
    }

    #[test]
    fn test_user_agents_rotate() {
        let storefront = BandcampStorefront::new(StorefrontSettings::default());
        let first = storefront.desktop_user_agent();
        let second = storefront.desktop_user_agent();
        assert_ne!(first, second);
    }
}
