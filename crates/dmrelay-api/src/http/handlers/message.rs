//! Message write endpoints.
//!
//! POST /api/v1/messages/inbound - the chat-platform gateway reports a message
//! from an end user.
//! POST /api/v1/messages/send - the operator replies to an end user.

use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use dmrelay_core::sync::RecordedMessage;
use dmrelay_types::conversation::InboundMessage;

use crate::http::error::AppError;
use crate::http::extractors::auth::Operator;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Body of an operator send. Fields are optional so a missing one maps to a
/// validation error rather than a deserialization rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub user_id: Option<String>,
    pub text: Option<String>,
}

pub async fn ingest_inbound(
    State(state): State<AppState>,
    _operator: Operator,
    body: Result<Json<InboundMessage>, JsonRejection>,
) -> Result<ApiResponse<RecordedMessage>, AppError> {
    let start = Instant::now();
    let Json(inbound) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    let recorded = state.sync.ingest_inbound(inbound).await?;
    Ok(ApiResponse::success(recorded, start))
}

pub async fn send_message(
    State(state): State<AppState>,
    _operator: Operator,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> Result<ApiResponse<RecordedMessage>, AppError> {
    let start = Instant::now();
    let Json(request) = body.map_err(|e| AppError::Validation(e.body_text()))?;

    let (Some(user_id), Some(text)) = (request.user_id, request.text) else {
        return Err(AppError::Validation("Missing required fields: userId, text".to_string()));
    };

    let recorded = state.sync.send_to_user(&user_id, &text).await?;
    tracing::info!(%user_id, "operator message sent");
    Ok(ApiResponse::success(recorded, start))
}
