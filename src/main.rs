use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{info, warn};

use metalwall::config::Config;
use metalwall::config_persistence::{default_config_path, ensure_config_file, load_config_file};
use metalwall::credential_store::{resolve_secret, set_credential, CredentialKind};
use metalwall::db_manager::{DbManager, WallAlbum};
use metalwall::link_metadata::LinkMetadataFetcher;
use metalwall::providers::bandcamp::{BandcampStorefront, StorefrontSettings};
use metalwall::providers::lastfm::{LastFmClient, LastFmSettings};
use metalwall::providers::spotify::{SpotifyClient, SpotifySettings};
use metalwall::{DiscoveryEngine, DiscoveryResult, DiscoverySettings, SeedAlbum};

#[derive(Parser)]
#[command(name = "metalwall")]
#[command(about = "Discover metal albums related to the ones on your wall")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Find a random related metal album
    Discover {
        /// Seed artist; requires --album
        #[arg(long, requires = "album")]
        artist: Option<String>,
        /// Seed album; requires --artist
        #[arg(long, requires = "artist")]
        album: Option<String>,
        #[arg(long)]
        max_attempts: Option<usize>,
        /// Record the result in this user's discovery history
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Add an album link to the wall
    Post {
        url: String,
        #[arg(long)]
        user: String,
        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// List past discoveries
    History {
        #[arg(long)]
        user: Option<String>,
    },
    /// Save a provider secret in the system keyring
    SetCredential {
        kind: CredentialKind,
        secret: String,
    },
}

fn open_database(config: &Config) -> Result<DbManager, Box<dyn std::error::Error>> {
    let db_path = config
        .database
        .resolved_path()
        .ok_or("Could not find a data directory for the database")?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    info!("Opening database at {}", db_path.display());
    Ok(DbManager::open(&db_path)?)
}

fn keyring_secret(configured: &str, kind: CredentialKind) -> String {
    match resolve_secret(configured, kind) {
        Ok(secret) => secret.unwrap_or_default(),
        Err(err) => {
            warn!("{err}");
            String::new()
        }
    }
}

fn build_lastfm(config: &Config) -> LastFmClient {
    LastFmClient::new(LastFmSettings {
        api_key: keyring_secret(&config.lastfm.api_key, CredentialKind::LastFm),
        request_timeout: Duration::from_secs(config.lastfm.request_timeout_secs),
        requests_per_second: config.lastfm.requests_per_second,
    })
}

fn build_spotify(config: &Config) -> SpotifyClient {
    let client_secret = if config.spotify.client_id.trim().is_empty() {
        String::new()
    } else {
        keyring_secret(&config.spotify.client_secret, CredentialKind::Spotify)
    };
    SpotifyClient::new(SpotifySettings {
        client_id: config.spotify.client_id.clone(),
        client_secret,
        request_timeout: Duration::from_secs(config.spotify.request_timeout_secs),
        market: config.spotify.market.clone(),
    })
}

fn build_storefront(config: &Config) -> Option<BandcampStorefront> {
    if !config.storefront.enabled {
        return None;
    }
    Some(BandcampStorefront::new(StorefrontSettings {
        min_delay: Duration::from_millis(config.storefront.min_delay_ms),
        max_delay: Duration::from_millis(config.storefront.max_delay_ms),
        request_timeout: Duration::from_secs(config.storefront.request_timeout_secs),
        mobile_retry_timeout: Duration::from_secs(config.storefront.mobile_retry_timeout_secs),
    }))
}

fn print_result(result: &DiscoveryResult) {
    println!("{}", result.narrative);
    println!(
        "{} - {}",
        result.discovered.artist, result.discovered.album_title
    );
    println!("  {}", result.discovered.canonical_url);
    if let Some(release_date) = &result.discovered.release_date {
        println!("  released: {release_date}");
    }
    if let Some(track_count) = result.discovered.track_count {
        println!("  tracks: {track_count}");
    }
    if !result.discovered.genres.is_empty() {
        println!("  genres: {}", result.discovered.genres.join(", "));
    }
    if let Some(link) = &result.alternate_link {
        println!("  also on Bandcamp: {}", link.url);
    }
    println!("  ({}, {} attempts)", result.validation_note, result.attempts);
}

fn run_discover(
    config: &Config,
    seed: Option<SeedAlbum>,
    max_attempts: Option<usize>,
    user: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_database(config)?;
    let lastfm = build_lastfm(config);
    let spotify = build_spotify(config);
    let storefront = build_storefront(config);

    let mut engine = DiscoveryEngine::new(&db, DiscoverySettings::from(config))
        .with_catalog(&spotify)
        .with_tags(&lastfm)
        .with_history(&db);
    if let Some(storefront) = storefront.as_ref() {
        engine = engine.with_storefront(storefront);
    }

    let result = match user {
        Some(user) => engine.discover_for_user(user, seed, max_attempts)?,
        None => engine.discover(seed, max_attempts)?,
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

fn run_post(
    config: &Config,
    url: &str,
    user: &str,
    tags: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_database(config)?;
    if db.url_exists(url)? {
        return Err(format!("{url} is already on the wall").into());
    }
    let metadata = LinkMetadataFetcher::new().fetch(url)?;
    let album = WallAlbum {
        user: user.to_string(),
        url: url.to_string(),
        artist: metadata.artist,
        album_name: metadata.album_name,
        cover_url: metadata.cover_url,
        platform: Some(metadata.platform),
        tags: tags
            .into_iter()
            .map(|tag| tag.trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect(),
    };
    db.insert_album(&album)?;
    println!(
        "Posted {} - {} ({})",
        album.artist,
        album.album_name,
        album.platform.as_deref().unwrap_or_default()
    );
    Ok(())
}

fn run_history(config: &Config, user: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_database(config)?;
    for discovery in db.load_discoveries(user)? {
        let record = discovery.record;
        println!(
            "{} [{}] {} - {} (from {} - {})",
            discovery.discovered_at,
            record.user,
            record.discovered_artist,
            record.discovered_album,
            record.seed_artist,
            record.seed_album
        );
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut clog = colog::default_builder();
    clog.filter(
        None,
        if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        },
    );
    clog.init();

    let config_path = cli.config.unwrap_or_else(default_config_path);
    ensure_config_file(&config_path)?;
    let config = load_config_file(&config_path);

    match cli.command {
        Command::Discover {
            artist,
            album,
            max_attempts,
            user,
            json,
        } => {
            let seed = match (artist, album) {
                (Some(artist), Some(album_title)) => Some(SeedAlbum {
                    artist,
                    album_title,
                    cover_url: None,
                    source_url: String::new(),
                }),
                _ => None,
            };
            run_discover(&config, seed, max_attempts, user.as_deref(), json)
        }
        Command::Post { url, user, tags } => run_post(&config, &url, &user, tags),
        Command::History { user } => run_history(&config, user.as_deref()),
        Command::SetCredential { kind, secret } => {
            set_credential(kind, &secret)?;
            println!("Saved {kind} credential to the system keyring");
            Ok(())
        }
    }
}
