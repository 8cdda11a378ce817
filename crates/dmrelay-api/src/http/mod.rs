//! HTTP/REST API layer for dmrelay.
//!
//! Axum-based REST API at `/api/v1/` with optional operator bearer
//! authentication, envelope response format, an SSE live-update stream,
//! and CORS support.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
