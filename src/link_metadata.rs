//! Album metadata from a streaming or store link, for posting to the wall.

use std::collections::HashMap;
use std::time::Duration;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::fallback::{self, Strategy};
use crate::providers::http;
use crate::text;

const FETCH_TIMEOUT: Duration = Duration::from_secs(8);
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const OTHER_PLATFORM: &str = "Other";

const PLATFORMS: [(&str, &str); 12] = [
    ("spotify", "Spotify"),
    ("bandcamp", "Bandcamp"),
    ("tidal", "Tidal"),
    ("music.apple", "Apple Music"),
    ("deezer", "Deezer"),
    ("youtube", "YouTube Music"),
    ("soundcloud", "SoundCloud"),
    ("genius", "Genius"),
    ("last.fm", "Last.fm"),
    ("pandora", "Pandora"),
    ("amazon", "Amazon Music"),
    ("jiosaavn", "JioSaavn"),
];

static META_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("valid meta regex"));
static ATTRIBUTE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)([a-z][a-z0-9:_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("valid attribute regex")
});
static DESCRIPTION_BY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bby\s+(.+?)(?:\s+on\s+\S.*)?$").expect("valid description regex")
});

/// Metadata extracted from an album page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMetadata {
    pub artist: String,
    pub album_name: String,
    pub cover_url: Option<String>,
    pub platform: String,
}

/// Raw title/description/image triple read from a page's meta tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PageCard {
    title: String,
    description: String,
    image: Option<String>,
}

pub struct LinkMetadataFetcher {
    http_client: ureq::Agent,
}

impl LinkMetadataFetcher {
    pub fn new() -> Self {
        Self {
            http_client: http::build_agent(Duration::from_secs(5), FETCH_TIMEOUT),
        }
    }

    pub fn fetch(&self, url: &str) -> Result<LinkMetadata, String> {
        let page = http::get_text_once(
            &self.http_client,
            url,
            &[
                ("User-Agent", BROWSER_USER_AGENT),
                ("Accept", "text/html,application/xhtml+xml"),
            ],
            FETCH_TIMEOUT,
        )?;
        parse_link_metadata(url, &page)
            .ok_or_else(|| format!("No title metadata found at {url}"))
    }
}

impl Default for LinkMetadataFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Platform display name for a URL, by domain keyword.
pub fn detect_platform(url: &str) -> &'static str {
    let lowered = url.to_lowercase();
    PLATFORMS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, name)| *name)
        .unwrap_or(OTHER_PLATFORM)
}

fn meta_tags(html: &str) -> Vec<HashMap<String, String>> {
    META_TAG_RE
        .find_iter(html)
        .map(|tag| {
            ATTRIBUTE_RE
                .captures_iter(tag.as_str())
                .filter_map(|captures| {
                    let name = captures.get(1)?.as_str().to_lowercase();
                    let value = captures.get(2).or_else(|| captures.get(3))?.as_str();
                    Some((name, text::decode_html_entities(value.trim())))
                })
                .collect()
        })
        .collect()
}

fn meta_content(tags: &[HashMap<String, String>], attribute: &str, key: &str) -> Option<String> {
    tags.iter()
        .filter(|tag| {
            tag.get(attribute)
                .is_some_and(|value| value.eq_ignore_ascii_case(key))
        })
        .filter_map(|tag| tag.get("content"))
        .find(|content| !content.is_empty())
        .cloned()
}

fn open_graph_card(tags: &[HashMap<String, String>]) -> Option<PageCard> {
    let title = meta_content(tags, "property", "og:title")?;
    Some(PageCard {
        title,
        description: meta_content(tags, "property", "og:description").unwrap_or_default(),
        image: meta_content(tags, "property", "og:image"),
    })
}

fn twitter_card(tags: &[HashMap<String, String>]) -> Option<PageCard> {
    let title = meta_content(tags, "name", "twitter:title")?;
    Some(PageCard {
        title,
        description: meta_content(tags, "name", "description")
            .or_else(|| meta_content(tags, "name", "twitter:description"))
            .unwrap_or_default(),
        image: meta_content(tags, "name", "twitter:image"),
    })
}

/// Parses album metadata out of a fetched page, `None` when it carries no title.
pub fn parse_link_metadata(url: &str, html: &str) -> Option<LinkMetadata> {
    let tags = meta_tags(html);
    let from_open_graph = |tags: &[HashMap<String, String>]| open_graph_card(tags);
    let from_twitter = |tags: &[HashMap<String, String>]| twitter_card(tags);
    let strategies: [Strategy<'_, [HashMap<String, String>], PageCard>; 2] = [
        ("open graph", &from_open_graph),
        ("twitter card", &from_twitter),
    ];
    let (source, card) = fallback::first_success("Link metadata", tags.as_slice(), &strategies)?;
    debug!("Read {source} metadata from {url}");

    Some(LinkMetadata {
        artist: extract_artist(&card.title, &card.description),
        album_name: extract_album(&card.title),
        cover_url: card.image,
        platform: detect_platform(url).to_string(),
    })
}

fn extract_artist(title: &str, description: &str) -> String {
    if let Some((_, artist)) = title.rsplit_once(" - ") {
        let artist = artist.trim();
        if !artist.is_empty() {
            return artist.to_string();
        }
    }
    if let Some(artist) = DESCRIPTION_BY_RE
        .captures(description.trim())
        .and_then(|captures| captures.get(1))
        .map(|artist| artist.as_str().trim())
        .filter(|artist| !artist.is_empty())
    {
        return artist.to_string();
    }
    if let Some((_, artist)) = title.rsplit_once(" by ") {
        let artist = artist.trim();
        if !artist.is_empty() {
            return artist.to_string();
        }
    }
    UNKNOWN_ARTIST.to_string()
}

fn extract_album(title: &str) -> String {
    let album = match title.split_once(" - ") {
        Some((album, _)) => album,
        None => match title.rsplit_once(" by ") {
            Some((album, _)) => album,
            None => title,
        },
    };
    let album = album.trim().trim_end_matches(',').trim();
    if album.is_empty() {
        UNKNOWN_ALBUM.to_string()
    } else {
        album.to_string()
    }
}
