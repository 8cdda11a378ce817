//! Application state wiring the relay together.
//!
//! AppState holds the concrete controller used by both CLI and REST API.
//! `SyncController` is generic over its ports; AppState pins it to the
//! SQLite gateway and the webhook sender.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dmrelay_core::event::EventBroadcaster;
use dmrelay_core::sync::{SyncController, SyncOptions};
use dmrelay_infra::config::{database_url, load_config, resolve_data_dir};
use dmrelay_infra::outbound::WebhookOutbound;
use dmrelay_infra::sqlite::{DatabasePool, SqliteConversationGateway};
use dmrelay_types::config::RelayConfig;
use secrecy::{ExposeSecret, SecretString};

/// Controller pinned to the infra implementations.
pub type RelayController = SyncController<SqliteConversationGateway, WebhookOutbound>;

/// Operator credential for the HTTP API.
pub struct OperatorAuth {
    password: Option<SecretString>,
}

impl OperatorAuth {
    pub fn new(password: Option<String>) -> Self {
        Self {
            password: password.map(SecretString::from),
        }
    }

    /// Whether requests must present a bearer token.
    pub fn is_required(&self) -> bool {
        self.password.is_some()
    }

    /// Check a presented token. Always true when no password is configured.
    pub fn verify(&self, presented: &str) -> bool {
        match &self.password {
            Some(secret) => constant_time_eq(secret.expose_secret().as_bytes(), presented.as_bytes()),
            None => true,
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<RelayController>,
    pub config: Arc<RelayConfig>,
    pub auth: Arc<OperatorAuth>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, load config, open the database.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;
        let config = load_config(&data_dir).await;
        Self::build(config, &data_dir).await
    }

    /// Wire the controller from an explicit config.
    pub async fn build(config: RelayConfig, data_dir: &Path) -> anyhow::Result<Self> {
        let pool = DatabasePool::new(&database_url(&config, data_dir)).await?;
        let gateway = SqliteConversationGateway::new(pool);
        let outbound = WebhookOutbound::new(config.outbound_webhook_url.clone())?;
        if !outbound.is_configured() {
            tracing::warn!("no outbound_webhook_url configured; operator sends will fail");
        }

        let broadcaster = EventBroadcaster::new(
            Duration::from_secs(config.heartbeat_seconds),
            config.viewer_buffer,
        );
        let options = SyncOptions {
            repair_on_reload: config.repair_on_reload,
        };
        let sync = SyncController::new(gateway, outbound, broadcaster, options);

        Ok(Self {
            sync: Arc::new(sync),
            auth: Arc::new(OperatorAuth::new(config.admin_password.clone())),
            config: Arc::new(config),
            data_dir: data_dir.to_path_buf(),
        })
    }
}
