//! GET /health - liveness check, unauthenticated.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "dmrelay is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": state.config.environment,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
