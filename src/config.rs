//! Persistent application configuration model and defaults.

use std::path::PathBuf;

use crate::genre::{DEFAULT_MAX_DISQUALIFYING_HITS, DEFAULT_METAL_SCORE_THRESHOLD};
use crate::similarity::{CONFUSABLE_THRESHOLD, SAME_ENTITY_THRESHOLD};

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Candidate search and acceptance rules.
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    /// Genre classifier tuning.
    pub classifier: ClassifierConfig,
    #[serde(default)]
    /// Last.fm tag provider connection.
    pub lastfm: LastFmConfig,
    #[serde(default)]
    /// Spotify catalog provider connection.
    pub spotify: SpotifyConfig,
    #[serde(default)]
    /// Bandcamp cross-reference pacing.
    pub storefront: StorefrontConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// How many candidates a run may try before giving up.
#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrictnessTier {
    Lenient,
    #[default]
    Balanced,
    Strict,
}

impl StrictnessTier {
    pub fn max_attempts(self) -> usize {
        match self {
            Self::Lenient => 15,
            Self::Balanced => 10,
            Self::Strict => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub strictness: StrictnessTier,
    /// Overrides the strictness tier's attempt count.
    #[serde(default)]
    pub max_attempts: Option<usize>,
    #[serde(default = "default_same_entity_threshold")]
    pub same_entity_threshold: u8,
    #[serde(default = "default_confusable_threshold")]
    pub confusable_threshold: u8,
    #[serde(default = "default_related_artist_limit")]
    pub related_artist_limit: usize,
    #[serde(default = "default_album_search_limit")]
    pub album_search_limit: usize,
    /// Fixed seed for reproducible runs.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_metal_score_threshold")]
    pub metal_score_threshold: f32,
    #[serde(default = "default_max_disqualifying_hits")]
    pub max_disqualifying_hits: usize,
    /// Number of top tags requested per artist.
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct LastFmConfig {
    /// Empty means "look in the system keyring".
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_provider_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct SpotifyConfig {
    #[serde(default)]
    pub client_id: String,
    /// Empty means "look in the system keyring".
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_provider_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub market: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct StorefrontConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_storefront_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_storefront_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_storefront_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_storefront_mobile_timeout_secs")]
    pub mobile_retry_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct DatabaseConfig {
    /// Defaults to `<data_dir>/metalwall/metal_music.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path.clone().or_else(|| {
            dirs::data_dir().map(|dir| dir.join("metalwall").join("metal_music.db"))
        })
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            strictness: StrictnessTier::default(),
            max_attempts: None,
            same_entity_threshold: default_same_entity_threshold(),
            confusable_threshold: default_confusable_threshold(),
            related_artist_limit: default_related_artist_limit(),
            album_search_limit: default_album_search_limit(),
            rng_seed: None,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            metal_score_threshold: default_metal_score_threshold(),
            max_disqualifying_hits: default_max_disqualifying_hits(),
            max_tags: default_max_tags(),
        }
    }
}

impl Default for LastFmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            request_timeout_secs: default_provider_timeout_secs(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            request_timeout_secs: default_provider_timeout_secs(),
            market: String::new(),
        }
    }
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay_ms: default_storefront_min_delay_ms(),
            max_delay_ms: default_storefront_max_delay_ms(),
            request_timeout_secs: default_storefront_timeout_secs(),
            mobile_retry_timeout_secs: default_storefront_mobile_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_same_entity_threshold() -> u8 {
    SAME_ENTITY_THRESHOLD
}

fn default_confusable_threshold() -> u8 {
    CONFUSABLE_THRESHOLD
}

fn default_related_artist_limit() -> usize {
    15
}

fn default_album_search_limit() -> usize {
    20
}

fn default_metal_score_threshold() -> f32 {
    DEFAULT_METAL_SCORE_THRESHOLD
}

fn default_max_disqualifying_hits() -> usize {
    DEFAULT_MAX_DISQUALIFYING_HITS
}

fn default_max_tags() -> usize {
    10
}

fn default_provider_timeout_secs() -> u64 {
    10
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_storefront_min_delay_ms() -> u64 {
    500
}

fn default_storefront_max_delay_ms() -> u64 {
    3000
}

fn default_storefront_timeout_secs() -> u64 {
    20
}

fn default_storefront_mobile_timeout_secs() -> u64 {
    30
}

/// Clamps values that would make discovery misbehave.
pub fn sanitize_config(config: Config) -> Config {
    let min_delay_ms = config.storefront.min_delay_ms.min(30_000);
    let max_delay_ms = config.storefront.max_delay_ms.clamp(min_delay_ms, 60_000);
    let request_timeout_secs = config.storefront.request_timeout_secs.clamp(1, 120);

    Config {
        discovery: DiscoveryConfig {
            max_attempts: config.discovery.max_attempts.map(|attempts| attempts.max(1)),
            same_entity_threshold: config.discovery.same_entity_threshold.min(100),
            confusable_threshold: config.discovery.confusable_threshold.min(100),
            related_artist_limit: config.discovery.related_artist_limit.clamp(1, 100),
            album_search_limit: config.discovery.album_search_limit.clamp(1, 50),
            ..config.discovery
        },
        classifier: ClassifierConfig {
            metal_score_threshold: config.classifier.metal_score_threshold.max(0.0),
            max_tags: config.classifier.max_tags.clamp(1, 100),
            ..config.classifier
        },
        lastfm: LastFmConfig {
            request_timeout_secs: config.lastfm.request_timeout_secs.clamp(1, 120),
            requests_per_second: config.lastfm.requests_per_second.clamp(1, 50),
            ..config.lastfm
        },
        spotify: SpotifyConfig {
            request_timeout_secs: config.spotify.request_timeout_secs.clamp(1, 120),
            ..config.spotify
        },
        storefront: StorefrontConfig {
            min_delay_ms,
            max_delay_ms,
            request_timeout_secs,
            mobile_retry_timeout_secs: config
                .storefront
                .mobile_retry_timeout_secs
                .clamp(request_timeout_secs, 180),
            ..config.storefront
        },
        database: config.database,
    }
}

#[cfg(test)]
mod tests {
    use super::{sanitize_config, Config, StorefrontConfig, StrictnessTier};

    #[test]
    fn test_default_config_has_expected_values() {
        let config = Config::default();

        assert_eq!(config.discovery.strictness, StrictnessTier::Balanced);
        assert_eq!(config.discovery.max_attempts, None);
        assert_eq!(config.discovery.same_entity_threshold, 85);
        assert_eq!(config.discovery.confusable_threshold, 90);
        assert_eq!(config.classifier.metal_score_threshold, 1.5);
        assert_eq!(config.classifier.max_disqualifying_hits, 2);
        assert_eq!(config.lastfm.requests_per_second, 5);
        assert!(config.storefront.enabled);
        assert_eq!(config.storefront.mobile_retry_timeout_secs, 30);
    }

    #[test]
    fn test_strictness_tiers_map_to_attempt_counts() {
        assert_eq!(StrictnessTier::Lenient.max_attempts(), 15);
        assert_eq!(StrictnessTier::Balanced.max_attempts(), 10);
        assert_eq!(StrictnessTier::Strict.max_attempts(), 8);
    }

    #[test]
    fn test_partial_config_fills_missing_keys_with_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [discovery]
            strictness = "strict"

            [lastfm]
            api_key = "abc"
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(parsed.discovery.strictness, StrictnessTier::Strict);
        assert_eq!(parsed.discovery.related_artist_limit, 15);
        assert_eq!(parsed.lastfm.api_key, "abc");
        assert_eq!(parsed.lastfm.request_timeout_secs, 10);
        assert_eq!(parsed.spotify, Config::default().spotify);
    }

    #[test]
    fn test_system_config_template_matches_default_values() {
        let parsed: Config = toml::from_str(include_str!("../config/config.system.toml"))
            .expect("system config template should parse");
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_sanitize_config_orders_storefront_delays() {
        let input = Config {
            storefront: StorefrontConfig {
                min_delay_ms: 4_000,
                max_delay_ms: 100,
                request_timeout_secs: 25,
                mobile_retry_timeout_secs: 5,
                ..StorefrontConfig::default()
            },
            ..Config::default()
        };

        let sanitized = sanitize_config(input);
        assert_eq!(sanitized.storefront.min_delay_ms, 4_000);
        assert_eq!(sanitized.storefront.max_delay_ms, 4_000);
        assert_eq!(sanitized.storefront.mobile_retry_timeout_secs, 25);
    }

    #[test]
    fn test_sanitize_config_keeps_at_least_one_attempt() {
        let mut input = Config::default();
        input.discovery.max_attempts = Some(0);
        assert_eq!(sanitize_config(input).discovery.max_attempts, Some(1));
    }
}
