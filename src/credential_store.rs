//! Credential-storage helpers for provider secrets.

use std::fmt;
use std::str::FromStr;

use keyring::Entry;

const CREDENTIAL_USER: &str = "default";

/// Provider whose secret lives in the OS keyring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// Last.fm API key.
    LastFm,
    /// Spotify client secret.
    Spotify,
}

impl CredentialKind {
    pub fn service_name(self) -> &'static str {
        match self {
            Self::LastFm => "metalwall.lastfm",
            Self::Spotify => "metalwall.spotify",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LastFm => write!(f, "lastfm"),
            Self::Spotify => write!(f, "spotify"),
        }
    }
}

impl FromStr for CredentialKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lastfm" | "last.fm" => Ok(Self::LastFm),
            "spotify" => Ok(Self::Spotify),
            other => Err(format!(
                "unknown credential '{other}', expected 'lastfm' or 'spotify'"
            )),
        }
    }
}

fn credential_entry(kind: CredentialKind) -> Result<Entry, String> {
    Entry::new(kind.service_name(), CREDENTIAL_USER)
        .map_err(|err| format!("failed to create keyring entry for {kind}: {err}"))
}

fn keyring_error_hint(error: &str) -> Option<String> {
    if error.contains("org.freedesktop.DBus.Error.ServiceUnknown") {
        return Some(
            "no Secret Service provider is available. Start GNOME Keyring or KeePassXC Secret Service, or put the secret in config.toml."
                .to_string(),
        );
    }
    None
}

fn format_keyring_error(operation: &str, kind: CredentialKind, error: &str) -> String {
    let base = format!("{operation} failed in system keyring for {kind}: {error}");
    match keyring_error_hint(error) {
        Some(hint) => format!("{base}. Hint: {hint}"),
        None => base,
    }
}

/// Saves a provider secret into the OS keyring.
pub fn set_credential(kind: CredentialKind, secret: &str) -> Result<(), String> {
    let entry = credential_entry(kind)?;
    entry.set_password(secret.trim()).map_err(|err| {
        let detail = format!("failed to set keyring password: {err}");
        format_keyring_error("save credential", kind, detail.as_str())
    })
}

/// Loads a provider secret from the OS keyring; a missing entry is `Ok(None)`.
pub fn get_credential(kind: CredentialKind) -> Result<Option<String>, String> {
    let entry = credential_entry(kind)?;
    match entry.get_password() {
        Ok(secret) => Ok(Some(secret)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => {
            let detail = format!("failed to get keyring password: {err}");
            Err(format_keyring_error(
                "load credential",
                kind,
                detail.as_str(),
            ))
        }
    }
}

/// Config value when set, otherwise the keyring secret.
pub fn resolve_secret(configured: &str, kind: CredentialKind) -> Result<Option<String>, String> {
    let configured = configured.trim();
    if !configured.is_empty() {
        return Ok(Some(configured.to_string()));
    }
    get_credential(kind)
}
