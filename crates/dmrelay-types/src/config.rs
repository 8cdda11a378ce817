//! Configuration types for dmrelay.
//!
//! `RelayConfig` represents `config.toml` in the data directory. Every field
//! has a default so an empty or missing file yields a working setup.

use serde::{Deserialize, Serialize};

/// Top-level relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// SQLite URL. `None` resolves to `{data_dir}/dmrelay.db`.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds between heartbeats on each live viewer connection.
    #[serde(default = "default_heartbeat_seconds")]
    pub heartbeat_seconds: u64,

    /// Queue depth per live viewer before it is treated as gone.
    #[serde(default = "default_viewer_buffer")]
    pub viewer_buffer: usize,

    /// Seconds between background reloads; 0 disables the loop.
    #[serde(default)]
    pub reload_interval_seconds: u64,

    /// Run the timestamp repair pass before each reload.
    #[serde(default = "default_true")]
    pub repair_on_reload: bool,

    /// Operator password for the HTTP API. Unset leaves the API open.
    #[serde(default, skip_serializing)]
    pub admin_password: Option<String>,

    /// Target for operator-sent messages.
    #[serde(default)]
    pub outbound_webhook_url: Option<String>,

    /// Deployment label reported by the health endpoint.
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_heartbeat_seconds() -> u64 {
    30
}

fn default_viewer_buffer() -> usize {
    64
}

fn default_true() -> bool {
    true
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            host: default_host(),
            port: default_port(),
            heartbeat_seconds: default_heartbeat_seconds(),
            viewer_buffer: default_viewer_buffer(),
            reload_interval_seconds: 0,
            repair_on_reload: true,
            admin_password: None,
            outbound_webhook_url: None,
            environment: default_environment(),
        }
    }
}
