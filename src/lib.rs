//! Random album discovery for a community metal wall.
//!
//! Starting from an album already on the wall, the engine walks the
//! related-artist graph of external music providers, picks a random album
//! from a candidate artist and only accepts it when the artist's tags
//! classify as metal.

pub mod config;
pub mod config_persistence;
pub mod credential_store;
pub mod db_manager;
pub mod discovery;
pub mod fallback;
pub mod genre;
pub mod link_metadata;
pub mod model;
pub mod providers;
pub mod similarity;
pub mod text;

pub use discovery::{DiscoveryEngine, DiscoveryError, DiscoverySettings};
pub use genre::{GenreClassifier, GenreVerdict};
pub use model::{
    AlternateLink, DiscoveredAlbum, DiscoveryRecord, DiscoveryResult, ProviderKind, SeedAlbum,
    TagSet,
};
