//! External capability interfaces and the tolerant adapters wrapped around them.
//!
//! Concrete clients report failures as `Err(String)`. The adapters turn every
//! failure or missing capability into an empty value so the orchestrator
//! can move on to the next source or candidate.

pub mod bandcamp;
pub mod http;
pub mod lastfm;
pub mod spotify;

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::model::{AlternateLink, DiscoveryRecord, ProviderKind, SeedAlbum, TagSet};
use crate::similarity::{self, SAME_ENTITY_THRESHOLD};

const ARTIST_SEARCH_LIMIT: usize = 10;

/// Provider-side artist identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistRef {
    /// Provider-specific identifier, when the provider has one.
    pub id: Option<String>,
    pub name: String,
    pub url: Option<String>,
}

impl ArtistRef {
    /// Identity known only by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            url: None,
        }
    }
}

/// Album listing entry, optionally enriched with detail fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlbumSummary {
    pub id: Option<String>,
    pub title: String,
    pub artist: String,
    pub cover_url: Option<String>,
    pub url: Option<String>,
    pub release_date: Option<String>,
    pub track_count: Option<u32>,
    pub genres: Vec<String>,
}

/// Ranked tags together with the artist name the provider resolved them for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistTags {
    pub artist: String,
    pub tags: TagSet,
}

/// Album search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumMatch {
    pub title: String,
    pub artist: String,
    pub url: Option<String>,
}

/// Read path into the wall of posted albums.
pub trait WallStore {
    fn sample_random_album(&self) -> Option<SeedAlbum>;
}

/// Write-only sink for successful discoveries.
pub trait DiscoveryHistoryStore {
    fn record_discovery(&self, record: &DiscoveryRecord) -> Result<(), String>;
}

/// Artist/album metadata capability, used in both the catalog and tag roles.
pub trait MusicMetadataProvider: Send + Sync {
    /// Human-readable source name for logs and narratives.
    fn name(&self) -> &'static str;

    /// False when credentials are missing; the provider is then skipped entirely.
    fn is_configured(&self) -> bool {
        true
    }

    /// True when lookups by plain artist name work without resolving an id first.
    fn accepts_artist_names(&self) -> bool {
        false
    }

    fn search_artists(&self, name: &str, limit: usize) -> Result<Vec<ArtistRef>, String>;

    fn related_artists(&self, artist: &ArtistRef, limit: usize) -> Result<Vec<String>, String>;

    fn top_tags(&self, artist: &ArtistRef, limit: usize) -> Result<ArtistTags, String>;

    fn artist_albums(&self, artist: &ArtistRef, limit: usize)
        -> Result<Vec<AlbumSummary>, String>;

    fn album_detail(&self, album: &AlbumSummary) -> Result<AlbumSummary, String> {
        Ok(album.clone())
    }

    fn search_albums(
        &self,
        _title: &str,
        _artist: Option<&str>,
        _limit: usize,
    ) -> Result<Vec<AlbumMatch>, String> {
        Ok(Vec::new())
    }
}

/// Secondary storefront text search.
pub trait StorefrontSearch: Send + Sync {
    fn search(&self, artist: &str, album: &str) -> Result<Option<AlternateLink>, String>;
}

/// Tolerant wrapper around an optional [`MusicMetadataProvider`].
#[derive(Clone, Copy)]
pub struct ProviderAdapter<'a> {
    kind: ProviderKind,
    provider: Option<&'a dyn MusicMetadataProvider>,
    same_entity_threshold: u8,
}

impl<'a> ProviderAdapter<'a> {
    pub fn new(kind: ProviderKind, provider: Option<&'a dyn MusicMetadataProvider>) -> Self {
        Self {
            kind,
            provider,
            same_entity_threshold: SAME_ENTITY_THRESHOLD,
        }
    }

    pub fn with_same_entity_threshold(mut self, threshold: u8) -> Self {
        self.same_entity_threshold = threshold;
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn provider(&self) -> Option<&'a dyn MusicMetadataProvider> {
        self.provider.filter(|provider| provider.is_configured())
    }

    pub fn is_available(&self) -> bool {
        self.provider().is_some()
    }

    pub fn source_name(&self) -> &'static str {
        self.provider()
            .map(|provider| provider.name())
            .unwrap_or_else(|| self.kind.label())
    }

    fn swallow<T: Default>(&self, operation: &str, subject: &str, result: Result<T, String>) -> T {
        match result {
            Ok(value) => value,
            Err(error) => {
                warn!(
                    "{} {operation} failed for '{subject}': {error}",
                    self.source_name()
                );
                T::default()
            }
        }
    }

    /// Resolves `name` to the provider's best-scoring artist, if it clears
    /// the same-entity threshold.
    pub fn find_exact_artist(&self, name: &str) -> Option<ArtistRef> {
        let provider = self.provider()?;
        let results = self.swallow(
            "artist search",
            name,
            provider.search_artists(name, ARTIST_SEARCH_LIMIT),
        );

        let mut best: Option<(u8, ArtistRef)> = None;
        for candidate in results {
            let score = similarity::match_score(name, &candidate.name);
            let improves = match &best {
                Some((best_score, _)) => score > *best_score,
                None => true,
            };
            if improves {
                best = Some((score, candidate));
            }
        }

        match best {
            Some((score, artist)) if score >= self.same_entity_threshold => {
                debug!(
                    "{} resolved '{name}' to '{}' (score {score})",
                    self.source_name(),
                    artist.name
                );
                Some(artist)
            }
            Some((score, artist)) => {
                debug!(
                    "{} best match for '{name}' was '{}' (score {score}), rejecting",
                    self.source_name(),
                    artist.name
                );
                None
            }
            None => None,
        }
    }

    /// Related-artist names for `name`; id-based providers resolve it first.
    pub fn related_artists(&self, name: &str, limit: usize) -> Vec<String> {
        let Some(provider) = self.provider() else {
            return Vec::new();
        };
        let artist = if provider.accepts_artist_names() {
            ArtistRef::named(name)
        } else {
            self.find_exact_artist(name)
                .unwrap_or_else(|| ArtistRef::named(name))
        };
        self.swallow(
            "related artists",
            name,
            provider.related_artists(&artist, limit),
        )
    }

    /// Ranked tags for the artist, `None` when the provider is unavailable or failed.
    pub fn top_tags(&self, artist: &ArtistRef, limit: usize) -> Option<ArtistTags> {
        let provider = self.provider()?;
        match provider.top_tags(artist, limit) {
            Ok(mut artist_tags) => {
                if artist_tags.artist.trim().is_empty() {
                    artist_tags.artist = artist.name.clone();
                }
                Some(artist_tags)
            }
            Err(error) => {
                warn!(
                    "{} top tags failed for '{}': {error}",
                    provider.name(),
                    artist.name
                );
                None
            }
        }
    }

    /// Picks a random album credited to the artist and enriches it with detail.
    pub fn random_album_by_artist(
        &self,
        artist: &ArtistRef,
        limit: usize,
        rng: &mut StdRng,
    ) -> Option<AlbumSummary> {
        let provider = self.provider()?;
        let mut albums: Vec<AlbumSummary> = self
            .swallow(
                "album listing",
                &artist.name,
                provider.artist_albums(artist, limit),
            )
            .into_iter()
            .filter(|album| !album.title.trim().is_empty())
            .filter(|album| {
                album.artist.trim().is_empty()
                    || similarity::are_similar(
                        &album.artist,
                        &artist.name,
                        self.same_entity_threshold,
                    )
            })
            .collect();
        albums.shuffle(rng);
        let album = albums.into_iter().next()?;

        match provider.album_detail(&album) {
            Ok(detailed) => Some(detailed),
            Err(error) => {
                warn!(
                    "{} album detail failed for '{}': {error}",
                    provider.name(),
                    album.title
                );
                Some(album)
            }
        }
    }

    pub fn search_albums(&self, title: &str, artist: Option<&str>, limit: usize) -> Vec<AlbumMatch> {
        let Some(provider) = self.provider() else {
            return Vec::new();
        };
        self.swallow(
            "album search",
            title,
            provider.search_albums(title, artist, limit),
        )
    }
}

/// Best-effort storefront lookup that never surfaces failures.
#[derive(Clone, Copy)]
pub struct StorefrontAdapter<'a> {
    storefront: Option<&'a dyn StorefrontSearch>,
    same_entity_threshold: u8,
}

impl<'a> StorefrontAdapter<'a> {
    pub fn new(storefront: Option<&'a dyn StorefrontSearch>) -> Self {
        Self {
            storefront,
            same_entity_threshold: SAME_ENTITY_THRESHOLD,
        }
    }

    pub fn with_same_entity_threshold(mut self, threshold: u8) -> Self {
        self.same_entity_threshold = threshold;
        self
    }

    pub fn is_available(&self) -> bool {
        self.storefront.is_some()
    }

    /// Alternate link for the album, dropped when the storefront's artist
    /// does not look like the requested one.
    pub fn lookup(&self, artist: &str, album: &str) -> Option<AlternateLink> {
        let storefront = self.storefront?;
        match storefront.search(artist, album) {
            Ok(Some(link)) => {
                if similarity::are_similar(&link.artist, artist, self.same_entity_threshold) {
                    Some(link)
                } else {
                    debug!(
                        "Storefront match '{}' by '{}' does not look like '{artist}', ignoring",
                        link.album, link.artist
                    );
                    None
                }
            }
            Ok(None) => None,
            Err(error) => {
                warn!("Storefront lookup failed for '{artist} - {album}': {error}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    struct FixtureProvider {
        artists: Vec<&'static str>,
        albums: Vec<(&'static str, &'static str)>,
        fail_detail: bool,
    }

    impl FixtureProvider {
        fn new(artists: Vec<&'static str>) -> Self {
            Self {
                artists,
                albums: Vec::new(),
                fail_detail: false,
            }
        }
    }

    impl MusicMetadataProvider for FixtureProvider {
        fn name(&self) -> &'static str {
            "Fixture"
        }

        fn search_artists(&self, _name: &str, _limit: usize) -> Result<Vec<ArtistRef>, String> {
            Ok(self.artists.iter().map(|name| ArtistRef::named(*name)).collect())
        }

        fn related_artists(&self, _artist: &ArtistRef, _limit: usize) -> Result<Vec<String>, String> {
            Err("offline".to_string())
        }

        fn top_tags(&self, _artist: &ArtistRef, _limit: usize) -> Result<ArtistTags, String> {
            Ok(ArtistTags {
                artist: String::new(),
                tags: TagSet::default(),
            })
        }

        fn artist_albums(
            &self,
            _artist: &ArtistRef,
            _limit: usize,
        ) -> Result<Vec<AlbumSummary>, String> {
            Ok(self
                .albums
                .iter()
                .map(|(title, artist)| AlbumSummary {
                    title: title.to_string(),
                    artist: artist.to_string(),
                    ..AlbumSummary::default()
                })
                .collect())
        }

        fn album_detail(&self, album: &AlbumSummary) -> Result<AlbumSummary, String> {
            if self.fail_detail {
                return Err("detail offline".to_string());
            }
            Ok(AlbumSummary {
                track_count: Some(9),
                ..album.clone()
            })
        }
    }

    struct FailingStorefront;

    impl StorefrontSearch for FailingStorefront {
        fn search(&self, _artist: &str, _album: &str) -> Result<Option<AlternateLink>, String> {
            Err("timed out".to_string())
        }
    }

    struct FixedStorefront(AlternateLink);

    impl StorefrontSearch for FixedStorefront {
        fn search(&self, _artist: &str, _album: &str) -> Result<Option<AlternateLink>, String> {
            Ok(Some(self.0.clone()))
        }
    }

    #[test]
    fn test_find_exact_artist_rejects_loose_match() {
        let provider = FixtureProvider::new(vec!["Cattle Decapitation"]);
        let adapter = ProviderAdapter::new(ProviderKind::Catalog, Some(&provider));
        assert_eq!(adapter.find_exact_artist("Decapitation"), None);
    }

    #[test]
    fn test_find_exact_artist_picks_best_scoring_result() {
        let provider = FixtureProvider::new(vec!["Cattle Decapitation", "Decapitated"]);
        let adapter = ProviderAdapter::new(ProviderKind::Catalog, Some(&provider));
        let resolved = adapter.find_exact_artist("decapitated");
        assert_eq!(resolved.map(|artist| artist.name), Some("Decapitated".to_string()));
    }

    #[test]
    fn test_unconfigured_adapter_returns_empty_values() {
        let adapter = ProviderAdapter::new(ProviderKind::Tags, None);
        assert!(!adapter.is_available());
        assert_eq!(adapter.source_name(), "tags");
        assert!(adapter.related_artists("Obituary", 5).is_empty());
        assert!(adapter.top_tags(&ArtistRef::named("Obituary"), 5).is_none());
        assert!(adapter.search_albums("Slowly We Rot", None, 5).is_empty());
    }

    #[test]
    fn test_related_artists_failure_is_swallowed() {
        let provider = FixtureProvider::new(vec!["Obituary"]);
        let adapter = ProviderAdapter::new(ProviderKind::Catalog, Some(&provider));
        assert!(adapter.related_artists("Obituary", 5).is_empty());
    }

    #[test]
    fn test_top_tags_fills_missing_artist_name() {
        let provider = FixtureProvider::new(Vec::new());
        let adapter = ProviderAdapter::new(ProviderKind::Tags, Some(&provider));
        let tags = adapter.top_tags(&ArtistRef::named("Gorguts"), 5);
        assert_eq!(tags.map(|tags| tags.artist), Some("Gorguts".to_string()));
    }

    #[test]
    fn test_random_album_filters_foreign_artists_and_keeps_summary_on_detail_failure() {
        let mut provider = FixtureProvider::new(Vec::new());
        provider.albums = vec![("Colored Sands", "Gorguts"), ("Split", "Someone Else")];
        provider.fail_detail = true;
        let adapter = ProviderAdapter::new(ProviderKind::Catalog, Some(&provider));
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            let album = adapter
                .random_album_by_artist(&ArtistRef::named("Gorguts"), 10, &mut rng)
                .map(|album| (album.title, album.track_count));
            assert_eq!(album, Some(("Colored Sands".to_string(), None)));
        }
    }

    #[test]
    fn test_random_album_applies_detail() {
        let mut provider = FixtureProvider::new(Vec::new());
        provider.albums = vec![("Obscura", "Gorguts")];
        let adapter = ProviderAdapter::new(ProviderKind::Catalog, Some(&provider));
        let mut rng = StdRng::seed_from_u64(1);
        let album = adapter.random_album_by_artist(&ArtistRef::named("Gorguts"), 10, &mut rng);
        assert_eq!(album.and_then(|album| album.track_count), Some(9));
    }

    #[test]
    fn test_storefront_failure_yields_none() {
        let storefront = FailingStorefront;
        let adapter = StorefrontAdapter::new(Some(&storefront));
        assert_eq!(adapter.lookup("Gorguts", "Obscura"), None);
        assert_eq!(StorefrontAdapter::new(None).lookup("Gorguts", "Obscura"), None);
    }

    #[test]
    fn test_storefront_drops_mismatched_artist() {
        let storefront = FixedStorefront(AlternateLink {
            url: "https://example.bandcamp.com/album/x".to_string(),
            artist: "Completely Different".to_string(),
            album: "Obscura".to_string(),
        });
        let adapter = StorefrontAdapter::new(Some(&storefront));
        assert_eq!(adapter.lookup("Gorguts", "Obscura"), None);
    }

    struct CountingProvider {
        by_name: bool,
        searches: std::sync::atomic::AtomicUsize,
    }

    impl MusicMetadataProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "Counting"
        }

        fn accepts_artist_names(&self) -> bool {
            self.by_name
        }

        fn search_artists(&self, name: &str, _limit: usize) -> Result<Vec<ArtistRef>, String> {
            self.searches
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![ArtistRef {
                id: Some("id-1".to_string()),
                ..ArtistRef::named(name)
            }])
        }

        fn related_artists(&self, artist: &ArtistRef, _limit: usize) -> Result<Vec<String>, String> {
            Ok(vec![format!("{} via {:?}", artist.name, artist.id)])
        }

        fn top_tags(&self, artist: &ArtistRef, _limit: usize) -> Result<ArtistTags, String> {
            Ok(ArtistTags {
                artist: artist.name.clone(),
                tags: TagSet::default(),
            })
        }

        fn artist_albums(
            &self,
            _artist: &ArtistRef,
            _limit: usize,
        ) -> Result<Vec<AlbumSummary>, String> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_related_artists_by_name_skips_artist_search() {
        let provider = CountingProvider {
            by_name: true,
            searches: Default::default(),
        };
        let adapter = ProviderAdapter::new(ProviderKind::Tags, Some(&provider));
        assert_eq!(adapter.related_artists("Immolation", 5), vec!["Immolation via None"]);
        assert_eq!(provider.searches.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_related_artists_resolves_id_first_when_needed() {
        let provider = CountingProvider {
            by_name: false,
            searches: Default::default(),
        };
        let adapter = ProviderAdapter::new(ProviderKind::Catalog, Some(&provider));
        assert_eq!(
            adapter.related_artists("Immolation", 5),
            vec!["Immolation via Some(\"id-1\")"]
        );
        assert_eq!(provider.searches.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
