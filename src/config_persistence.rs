use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::{sanitize_config, Config};

const CONFIG_DIR_NAME: &str = "metalwall";
const CONFIG_FILE_NAME: &str = "config.toml";

pub fn system_config_template_text() -> &'static str {
    include_str!("../config/config.system.toml")
}

/// `<config_dir>/metalwall/config.toml`, falling back to the working directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// Writes the commented template when no config file exists yet.
pub fn ensure_config_file(path: &Path) -> Result<(), String> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| {
            format!(
                "Failed to create config directory {}: {}",
                parent.display(),
                err
            )
        })?;
    }
    info!(
        "Config file not found. Creating default config. path={}",
        path.display()
    );
    std::fs::write(path, system_config_template_text())
        .map_err(|err| format!("Failed to write default config {}: {}", path.display(), err))
}

/// Reads and sanitizes the config, using defaults when the file is missing or invalid.
pub fn load_config_file(path: &Path) -> Config {
    let config_content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(
                "Failed to read config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            return Config::default();
        }
    };

    match toml::from_str::<Config>(&config_content) {
        Ok(config) => sanitize_config(config),
        Err(err) => {
            warn!(
                "Failed to parse config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            Config::default()
        }
    }
}

pub fn persist_config_file(config: &Config, path: &Path) {
    let config_text = match toml::to_string(config) {
        Ok(text) => text,
        Err(err) => {
            log::error!("Failed to serialize config for {}: {}", path.display(), err);
            return;
        }
    };

    if let Err(err) = std::fs::write(path, config_text) {
        log::error!("Failed to persist config to {}: {}", path.display(), err);
    }
}
