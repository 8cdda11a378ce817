//! Configuration loader for dmrelay.
//!
//! Resolves the data directory and reads `config.toml` from it into
//! [`RelayConfig`]. Falls back to defaults when the file is missing or
//! malformed.

use std::path::{Path, PathBuf};

use dmrelay_types::config::RelayConfig;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "DMRELAY_DATA_DIR";

/// Resolve the data directory.
///
/// Priority: `DMRELAY_DATA_DIR`, then `~/.dmrelay`, then `./.dmrelay` when no
/// home directory is known.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|home| home.join(".dmrelay"))
        .unwrap_or_else(|| PathBuf::from(".dmrelay"))
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// A missing file yields [`RelayConfig::default()`]; an unreadable or
/// unparsable one logs a warning and yields the default as well.
pub async fn load_config(data_dir: &Path) -> RelayConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return RelayConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return RelayConfig::default();
        }
    };

    match toml::from_str::<RelayConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", config_path.display());
            RelayConfig::default()
        }
    }
}

/// The SQLite URL to open: the configured one, else `{data_dir}/dmrelay.db`.
pub fn database_url(config: &RelayConfig, data_dir: &Path) -> String {
    match &config.database_url {
        Some(url) => url.clone(),
        None => format!("sqlite://{}?mode=rwc", data_dir.join("dmrelay.db").display()),
    }
}
