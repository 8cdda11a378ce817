//! Axum router configuration with middleware.
//!
//! `/health` sits at the root; everything else is under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/conversations", get(handlers::conversation::list_conversations))
        .route("/conversations/{user_id}", get(handlers::conversation::get_conversation))
        .route("/messages/inbound", post(handlers::message::ingest_inbound))
        .route("/messages/send", post(handlers::message::send_message))
        .route("/reload", post(handlers::stats::reload))
        .route("/stats", get(handlers::stats::get_stats))
        .route("/events", get(handlers::events::stream_events));

    Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
