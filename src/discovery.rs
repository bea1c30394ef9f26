//! Random album discovery: seed, related artists, candidate trials, validation.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;

use crate::config::{Config, StrictnessTier};
use crate::fallback::{self, Strategy};
use crate::genre::{ClassifierThresholds, GenreClassifier, GenreVerdict};
use crate::model::{
    CandidateArtist, DiscoveredAlbum, DiscoveryRecord, DiscoveryResult, ProviderKind, SeedAlbum,
    UNVALIDATED_NOTE,
};
use crate::providers::{
    AlbumSummary, ArtistRef, ArtistTags, DiscoveryHistoryStore, MusicMetadataProvider,
    ProviderAdapter, StorefrontAdapter, StorefrontSearch, WallStore,
};
use crate::similarity::{self, CONFUSABLE_THRESHOLD, SAME_ENTITY_THRESHOLD};
use crate::text;

const TAG_PROVIDER_STRATEGY: &str = "tag provider";
const CATALOG_STRATEGY: &str = "catalog";

/// Pipeline-level failures surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("no albums on the wall to start a discovery from")]
    NoAlbumsAvailable,
    #[error("no related artists found for '{seed_artist}'")]
    NoRelatedArtists { seed_artist: String },
    #[error(
        "no validated metal album found from '{seed_album}' by {seed_artist} after {attempts} attempts"
    )]
    NoValidatedMetalAlbumFound {
        seed_artist: String,
        seed_album: String,
        attempts: usize,
    },
}

/// Tunables for one engine; usually built from [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverySettings {
    pub strictness: StrictnessTier,
    /// Overrides the strictness tier when set.
    pub max_attempts: Option<usize>,
    pub same_entity_threshold: u8,
    pub confusable_threshold: u8,
    pub related_artist_limit: usize,
    pub album_search_limit: usize,
    pub tag_limit: usize,
    pub classifier: ClassifierThresholds,
    pub rng_seed: Option<u64>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            strictness: StrictnessTier::default(),
            max_attempts: None,
            same_entity_threshold: SAME_ENTITY_THRESHOLD,
            confusable_threshold: CONFUSABLE_THRESHOLD,
            related_artist_limit: 15,
            album_search_limit: 20,
            tag_limit: 10,
            classifier: ClassifierThresholds::default(),
            rng_seed: None,
        }
    }
}

impl From<&Config> for DiscoverySettings {
    fn from(config: &Config) -> Self {
        Self {
            strictness: config.discovery.strictness,
            max_attempts: config.discovery.max_attempts,
            same_entity_threshold: config.discovery.same_entity_threshold,
            confusable_threshold: config.discovery.confusable_threshold,
            related_artist_limit: config.discovery.related_artist_limit,
            album_search_limit: config.discovery.album_search_limit,
            tag_limit: config.classifier.max_tags,
            classifier: ClassifierThresholds {
                metal_score: config.classifier.metal_score_threshold,
                max_disqualifying_hits: config.classifier.max_disqualifying_hits,
            },
            rng_seed: config.discovery.rng_seed,
        }
    }
}

impl DiscoverySettings {
    fn attempt_budget(&self, requested: Option<usize>) -> usize {
        requested
            .or(self.max_attempts)
            .unwrap_or_else(|| self.strictness.max_attempts())
            .max(1)
    }
}

/// Candidate that passed (or skipped) validation.
struct Accepted {
    artist: String,
    album: AlbumSummary,
    tags: Vec<String>,
    matched_tags: Vec<String>,
    validation_note: String,
}

/// Per-run state; nothing here outlives one `discover` call.
struct DiscoveryRun<'a> {
    catalog: ProviderAdapter<'a>,
    tags: ProviderAdapter<'a>,
    rng: StdRng,
    unavailable: Vec<ProviderKind>,
}

impl<'a> DiscoveryRun<'a> {
    /// Catalog resolves candidates; the tag provider stands in when no catalog is configured.
    fn resolver(&self) -> ProviderAdapter<'a> {
        if self.catalog.is_available() {
            self.catalog
        } else {
            self.tags
        }
    }

    fn mark_unavailable(&mut self, kind: ProviderKind) {
        if !self.unavailable.contains(&kind) {
            self.unavailable.push(kind);
        }
    }
}

/// Discovery orchestrator over the capability interfaces.
pub struct DiscoveryEngine<'a> {
    wall: &'a dyn WallStore,
    catalog: Option<&'a dyn MusicMetadataProvider>,
    tags: Option<&'a dyn MusicMetadataProvider>,
    storefront: Option<&'a dyn StorefrontSearch>,
    history: Option<&'a dyn DiscoveryHistoryStore>,
    settings: DiscoverySettings,
    classifier: GenreClassifier,
}

impl<'a> DiscoveryEngine<'a> {
    pub fn new(wall: &'a dyn WallStore, settings: DiscoverySettings) -> Self {
        let classifier = GenreClassifier::new(settings.classifier);
        Self {
            wall,
            catalog: None,
            tags: None,
            storefront: None,
            history: None,
            settings,
            classifier,
        }
    }

    pub fn with_catalog(mut self, catalog: &'a dyn MusicMetadataProvider) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_tags(mut self, tags: &'a dyn MusicMetadataProvider) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn with_storefront(mut self, storefront: &'a dyn StorefrontSearch) -> Self {
        self.storefront = Some(storefront);
        self
    }

    pub fn with_history(mut self, history: &'a dyn DiscoveryHistoryStore) -> Self {
        self.history = Some(history);
        self
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    fn new_rng(&self) -> StdRng {
        if let Some(seed) = self.settings.rng_seed {
            return StdRng::seed_from_u64(seed);
        }
        let mut seed = [0u8; 32];
        match getrandom::fill(&mut seed) {
            Ok(()) => StdRng::from_seed(seed),
            Err(err) => {
                warn!("Secure random seed unavailable ({err}), seeding from the clock");
                let nanos = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|elapsed| elapsed.as_nanos() as u64)
                    .unwrap_or_default();
                StdRng::seed_from_u64(nanos)
            }
        }
    }

    fn start_run(&self) -> DiscoveryRun<'a> {
        let threshold = self.settings.same_entity_threshold;
        let catalog = ProviderAdapter::new(ProviderKind::Catalog, self.catalog)
            .with_same_entity_threshold(threshold);
        let tags = ProviderAdapter::new(ProviderKind::Tags, self.tags)
            .with_same_entity_threshold(threshold);
        let mut run = DiscoveryRun {
            catalog,
            tags,
            rng: self.new_rng(),
            unavailable: Vec::new(),
        };
        if !catalog.is_available() {
            run.mark_unavailable(ProviderKind::Catalog);
        }
        if !tags.is_available() {
            run.mark_unavailable(ProviderKind::Tags);
        }
        if self.storefront.is_none() {
            run.mark_unavailable(ProviderKind::Storefront);
        }
        for kind in &run.unavailable {
            info!("{} provider is not configured", kind.label());
        }
        run
    }

    /// Runs one discovery from `seed`, or from a random wall album when `None`.
    pub fn discover(
        &self,
        seed: Option<SeedAlbum>,
        max_attempts: Option<usize>,
    ) -> Result<DiscoveryResult, DiscoveryError> {
        let mut seed = match seed {
            Some(seed) => seed,
            None => self
                .wall
                .sample_random_album()
                .ok_or(DiscoveryError::NoAlbumsAvailable)?,
        };
        seed.artist = text::clean_artist_label(&seed.artist);
        info!(
            "Starting discovery from '{}' by {}",
            seed.album_title, seed.artist
        );
        if seed.artist.is_empty() {
            return Err(DiscoveryError::NoRelatedArtists {
                seed_artist: seed.artist,
            });
        }

        let mut run = self.start_run();
        let related = self.find_related(&run, &seed.artist);
        if related.is_empty() {
            return Err(DiscoveryError::NoRelatedArtists {
                seed_artist: seed.artist,
            });
        }

        let mut candidates = self.filter_candidates(&seed.artist, related);
        candidates.shuffle(&mut run.rng);
        let budget = self.settings.attempt_budget(max_attempts);
        info!(
            "{} candidates for '{}', up to {budget} attempts",
            candidates.len(),
            seed.artist
        );

        let mut attempts = 0usize;
        for candidate in candidates {
            if attempts >= budget {
                break;
            }
            attempts += 1;
            debug!("Attempt {attempts}/{budget}: '{}'", candidate.raw_name);
            if let Some(accepted) = self.try_candidate(&mut run, &candidate) {
                return Ok(self.assemble(seed, accepted, attempts, run.unavailable));
            }
        }

        info!(
            "No validated album found from '{}' after {attempts} attempts",
            seed.artist
        );
        Err(DiscoveryError::NoValidatedMetalAlbumFound {
            seed_artist: seed.artist,
            seed_album: seed.album_title,
            attempts,
        })
    }

    /// Reruns discovery from the previous result's seed with a fresh draw.
    pub fn discover_another(
        &self,
        previous: &DiscoveryResult,
    ) -> Result<DiscoveryResult, DiscoveryError> {
        self.discover(Some(previous.seed.clone()), None)
    }

    /// Like [`discover`](Self::discover), recording a success in the history store.
    pub fn discover_for_user(
        &self,
        user: &str,
        seed: Option<SeedAlbum>,
        max_attempts: Option<usize>,
    ) -> Result<DiscoveryResult, DiscoveryError> {
        let result = self.discover(seed, max_attempts)?;
        if let Some(history) = self.history {
            if let Err(err) = history.record_discovery(&DiscoveryRecord::from_result(user, &result))
            {
                warn!("Failed to record discovery for '{user}': {err}");
            }
        }
        Ok(result)
    }

    fn find_related(&self, run: &DiscoveryRun<'_>, seed_artist: &str) -> Vec<String> {
        let limit = self.settings.related_artist_limit;
        let from_tags = |name: &str| Some(run.tags.related_artists(name, limit));
        let from_catalog = |name: &str| Some(run.catalog.related_artists(name, limit));
        let strategies: [Strategy<'_, str, Vec<String>>; 2] = [
            (TAG_PROVIDER_STRATEGY, &from_tags),
            (CATALOG_STRATEGY, &from_catalog),
        ];
        match fallback::first_non_empty("Related artists", seed_artist, &strategies) {
            Some((source, related)) => {
                info!(
                    "Found {} related artists for '{seed_artist}' via {source}",
                    related.len()
                );
                related
            }
            None => Vec::new(),
        }
    }

    /// Drops blanks, duplicates and names that are really the seed artist.
    fn filter_candidates(&self, seed_artist: &str, related: Vec<String>) -> Vec<CandidateArtist> {
        let mut seen = HashSet::new();
        related
            .into_iter()
            .map(CandidateArtist::new)
            .filter(|candidate| !candidate.normalized_name.is_empty())
            .filter(|candidate| seen.insert(candidate.normalized_name.clone()))
            .filter(|candidate| {
                let confusable = similarity::are_similar(
                    seed_artist,
                    &candidate.raw_name,
                    self.settings.confusable_threshold,
                );
                if confusable {
                    debug!(
                        "Dropping '{}': too close to seed '{seed_artist}'",
                        candidate.raw_name
                    );
                }
                !confusable
            })
            .collect()
    }

    fn try_candidate(
        &self,
        run: &mut DiscoveryRun<'_>,
        candidate: &CandidateArtist,
    ) -> Option<Accepted> {
        let resolver = run.resolver();
        let Some(resolved) = resolver.find_exact_artist(&candidate.raw_name) else {
            debug!("'{}' did not resolve to an exact artist", candidate.raw_name);
            return None;
        };
        let Some(album) =
            resolver.random_album_by_artist(&resolved, self.settings.album_search_limit, &mut run.rng)
        else {
            debug!("No albums found for '{}'", resolved.name);
            return None;
        };
        let resolved_by = resolver.kind();

        if !run.tags.is_available() {
            debug!("Accepting '{}' without genre validation", resolved.name);
            return Some(Self::unvalidated(resolved.name, album));
        }

        // A configured provider with no tags for this artist is a miss, not degraded mode
        let Some((source, artist_tags)) = self.fetch_tags(run, &resolved, resolved_by) else {
            debug!("No tags for '{}'", resolved.name);
            return self.correct_artist(run, &resolved.name, album);
        };

        let identity_matches = similarity::are_similar(
            &artist_tags.artist,
            &candidate.raw_name,
            self.settings.same_entity_threshold,
        );
        let verdict = self.classifier.classify(&artist_tags.tags);
        debug!(
            "'{}' via {source}: score {:.1}, {} disqualifying, metal={}, identity '{}' matches={identity_matches}",
            resolved.name,
            verdict.metal_score,
            verdict.disqualifying_hits,
            verdict.is_metal,
            artist_tags.artist
        );

        if identity_matches && verdict.is_metal {
            let note = Self::validation_note(source, &verdict);
            return Some(Accepted {
                artist: resolved.name,
                album,
                tags: artist_tags.tags.into_vec(),
                matched_tags: verdict.matched_tags,
                validation_note: note,
            });
        }
        self.correct_artist(run, &resolved.name, album)
    }

    fn unvalidated(artist: String, album: AlbumSummary) -> Accepted {
        Accepted {
            artist,
            album,
            tags: Vec::new(),
            matched_tags: Vec::new(),
            validation_note: UNVALIDATED_NOTE.to_string(),
        }
    }

    fn validation_note(source: &str, verdict: &GenreVerdict) -> String {
        format!(
            "validated via {source} tags (score {:.1}, {} matched)",
            verdict.metal_score,
            verdict.matched_tags.len()
        )
    }

    /// Tag provider first, catalog genres second; each must be non-empty.
    fn fetch_tags(
        &self,
        run: &DiscoveryRun<'_>,
        resolved: &ArtistRef,
        resolved_by: ProviderKind,
    ) -> Option<(&'static str, ArtistTags)> {
        let limit = self.settings.tag_limit;
        // Provider ids only mean something to the provider that issued them
        let reference_for = |kind: ProviderKind| {
            if kind == resolved_by {
                resolved.clone()
            } else {
                ArtistRef::named(resolved.name.clone())
            }
        };
        let from_tags = |_: &ArtistRef| {
            run.tags
                .top_tags(&reference_for(ProviderKind::Tags), limit)
                .filter(|found| !found.tags.is_empty())
        };
        let from_catalog = |_: &ArtistRef| {
            run.catalog
                .top_tags(&reference_for(ProviderKind::Catalog), limit)
                .filter(|found| !found.tags.is_empty())
        };
        let strategies: [Strategy<'_, ArtistRef, ArtistTags>; 2] = [
            (TAG_PROVIDER_STRATEGY, &from_tags),
            (CATALOG_STRATEGY, &from_catalog),
        ];
        fallback::first_success("Artist tags", resolved, &strategies)
    }

    /// Looks the album up by title on the tag provider; a differently
    /// credited artist is accepted when its own tags classify as metal.
    fn correct_artist(
        &self,
        run: &DiscoveryRun<'_>,
        resolved_name: &str,
        album: AlbumSummary,
    ) -> Option<Accepted> {
        let threshold = self.settings.same_entity_threshold;
        let hit = run
            .tags
            .search_albums(&album.title, Some(resolved_name), self.settings.album_search_limit)
            .into_iter()
            .find(|hit| {
                !hit.artist.trim().is_empty()
                    && similarity::match_score(&hit.title, &album.title) >= threshold
                    && !similarity::are_similar(&hit.artist, resolved_name, threshold)
            })?;

        let corrected = run
            .tags
            .top_tags(&ArtistRef::named(hit.artist.clone()), self.settings.tag_limit)
            .filter(|found| !found.tags.is_empty())?;
        let verdict = self.classifier.classify(&corrected.tags);
        if !verdict.is_metal {
            debug!(
                "Corrected artist '{}' for '{}' is not metal either",
                hit.artist, album.title
            );
            return None;
        }

        info!(
            "Album '{}' corrected from '{resolved_name}' to '{}'",
            album.title, hit.artist
        );
        let validation_note = format!(
            "artist corrected from '{resolved_name}' to '{}'; {}",
            hit.artist,
            Self::validation_note(TAG_PROVIDER_STRATEGY, &verdict)
        );
        Some(Accepted {
            artist: hit.artist,
            album: AlbumSummary {
                url: album.url.clone().or(hit.url),
                ..album
            },
            tags: corrected.tags.into_vec(),
            matched_tags: verdict.matched_tags,
            validation_note,
        })
    }

    fn assemble(
        &self,
        seed: SeedAlbum,
        accepted: Accepted,
        attempts: usize,
        unavailable_providers: Vec<ProviderKind>,
    ) -> DiscoveryResult {
        let storefront = StorefrontAdapter::new(self.storefront)
            .with_same_entity_threshold(self.settings.same_entity_threshold);
        let alternate_link = storefront.lookup(&accepted.artist, &accepted.album.title);

        let canonical_url = accepted
            .album
            .url
            .clone()
            .unwrap_or_else(|| fallback_album_url(&accepted.artist, &accepted.album.title));
        let genres = if accepted.album.genres.is_empty() {
            accepted.tags
        } else {
            accepted.album.genres
        };
        let narrative = format!(
            "Based on '{}' by {} → related artist: {}",
            seed.album_title, seed.artist, accepted.artist
        );
        info!(
            "Discovered '{}' by {} after {attempts} attempts",
            accepted.album.title, accepted.artist
        );

        DiscoveryResult {
            seed,
            discovered: DiscoveredAlbum {
                artist: accepted.artist,
                album_title: accepted.album.title,
                cover_image_url: accepted.album.cover_url,
                canonical_url,
                release_date: accepted.album.release_date,
                track_count: accepted.album.track_count,
                genres,
                matched_tags: accepted.matched_tags,
            },
            alternate_link,
            narrative,
            validation_note: accepted.validation_note,
            attempts,
            unavailable_providers,
        }
    }
}

fn fallback_album_url(artist: &str, album: &str) -> String {
    let encode = |value: &str| urlencoding::encode(value).replace("%20", "+");
    format!(
        "https://www.last.fm/music/{}/{}",
        encode(artist),
        encode(album)
    )
}
