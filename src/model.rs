//! Discovery data model shared between the orchestrator and its callers.

use serde::Serialize;

/// Album taken from the wall that anchors one discovery run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedAlbum {
    pub artist: String,
    pub album_title: String,
    pub cover_url: Option<String>,
    pub source_url: String,
}

/// Related-artist name under consideration before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateArtist {
    pub raw_name: String,
    pub normalized_name: String,
}

impl CandidateArtist {
    pub fn new(raw_name: impl Into<String>) -> Self {
        let raw_name = raw_name.into();
        let normalized_name = crate::text::normalize(&raw_name);
        Self {
            raw_name,
            normalized_name,
        }
    }
}

/// Ranked genre/style tags of one artist, most relevant first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn new(tags: Vec<String>) -> Self {
        Self(tags)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|value| value == tag)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl<T: Into<String>> FromIterator<T> for TagSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(Into::into)
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
        )
    }
}

/// Album that passed validation (or degraded-mode acceptance).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredAlbum {
    pub artist: String,
    pub album_title: String,
    pub cover_image_url: Option<String>,
    pub canonical_url: String,
    pub release_date: Option<String>,
    pub track_count: Option<u32>,
    pub genres: Vec<String>,
    pub matched_tags: Vec<String>,
}

/// Alternate purchase/listen link from the storefront cross-reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlternateLink {
    pub url: String,
    pub artist: String,
    pub album: String,
}

/// External capability that was unconfigured during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Catalog,
    Tags,
    Storefront,
}

impl ProviderKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Tags => "tags",
            Self::Storefront => "storefront",
        }
    }
}

/// Validation note recorded when genre classification was skipped.
pub const UNVALIDATED_NOTE: &str = "unvalidated";

/// Output of a successful discovery run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryResult {
    pub seed: SeedAlbum,
    pub discovered: DiscoveredAlbum,
    pub alternate_link: Option<AlternateLink>,
    pub narrative: String,
    pub validation_note: String,
    /// Candidates tried, including the accepted one.
    pub attempts: usize,
    pub unavailable_providers: Vec<ProviderKind>,
}

impl DiscoveryResult {
    pub fn is_validated(&self) -> bool {
        self.validation_note != UNVALIDATED_NOTE
    }
}

/// Denormalized history row handed to the discovery history store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryRecord {
    pub user: String,
    pub seed_artist: String,
    pub seed_album: String,
    pub discovered_artist: String,
    pub discovered_album: String,
    pub url: String,
    pub cover_url: Option<String>,
    pub tags: Vec<String>,
}

impl DiscoveryRecord {
    pub fn from_result(user: &str, result: &DiscoveryResult) -> Self {
        Self {
            user: user.to_string(),
            seed_artist: result.seed.artist.clone(),
            seed_album: result.seed.album_title.clone(),
            discovered_artist: result.discovered.artist.clone(),
            discovered_album: result.discovered.album_title.clone(),
            url: result.discovered.canonical_url.clone(),
            cover_url: result.discovered.cover_image_url.clone(),
            tags: result.discovered.matched_tags.clone(),
        }
    }
}
