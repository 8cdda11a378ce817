//! Conversation read endpoints.
//!
//! Views carry each timestamp twice: the raw millisecond value and its
//! dashboard rendering, which is "Invalid date" outside the plausible
//! window.

use std::time::Instant;

use axum::extract::{Path, State};
use serde::Serialize;

use dmrelay_types::conversation::{Conversation, MessageRecord};
use dmrelay_types::timestamp::Timestamp;

use crate::http::error::AppError;
use crate::http::extractors::auth::Operator;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub content: String,
    pub timestamp: Timestamp,
    pub timestamp_display: String,
    pub from_user: bool,
}

impl From<MessageRecord> for MessageView {
    fn from(m: MessageRecord) -> Self {
        Self {
            id: m.id,
            timestamp_display: m.timestamp.display(),
            timestamp: m.timestamp,
            content: m.content,
            from_user: m.from_user,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub user_id: String,
    pub username: String,
    pub last_activity: Timestamp,
    pub last_activity_display: String,
    pub last_message: String,
    pub messages: Vec<MessageView>,
}

impl From<Conversation> for ConversationView {
    fn from(c: Conversation) -> Self {
        Self {
            last_activity_display: c.last_activity.display(),
            user_id: c.user_id,
            username: c.username,
            last_activity: c.last_activity,
            last_message: c.last_message,
            messages: c.messages.into_iter().map(MessageView::from).collect(),
        }
    }
}

/// GET /api/v1/conversations - every conversation, most recent first.
pub async fn list_conversations(
    State(state): State<AppState>,
    _operator: Operator,
) -> ApiResponse<Vec<ConversationView>> {
    let start = Instant::now();
    let views = state
        .sync
        .store()
        .list_all()
        .into_iter()
        .map(ConversationView::from)
        .collect();
    ApiResponse::success(views, start)
}

/// GET /api/v1/conversations/{user_id}
pub async fn get_conversation(
    State(state): State<AppState>,
    _operator: Operator,
    Path(user_id): Path<String>,
) -> Result<ApiResponse<ConversationView>, AppError> {
    let start = Instant::now();
    let conversation = state
        .sync
        .store()
        .get(&user_id)
        .ok_or_else(|| AppError::NotFound(format!("No conversation for user {user_id}")))?;
    Ok(ApiResponse::success(conversation.into(), start))
}
