//! Legacy JSON conversation import.
//!
//! Older deployments kept all conversations in one JSON document keyed by
//! user id:
//!
//! ```json
//! { "42": { "username": "alice", "lastActivity": 1700000000000,
//!           "lastMessage": "hi",
//!           "messages": [{ "content": "hi", "timestamp": "1700000000000", "fromUser": true }] } }
//! ```
//!
//! Timestamps may be numbers or digit strings. Any value that fails strict
//! parsing rejects the whole document before anything is written.

use std::collections::BTreeMap;
use std::path::Path;

use dmrelay_types::conversation::{Conversation, MessageRecord, UserRecord};
use dmrelay_types::error::ImportError;
use dmrelay_types::timestamp::Timestamp;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyConversation {
    #[serde(default)]
    username: String,
    #[serde(default)]
    last_activity: Option<Timestamp>,
    #[serde(default)]
    last_message: String,
    #[serde(default)]
    messages: Vec<LegacyMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyMessage {
    content: String,
    timestamp: Timestamp,
    #[serde(default)]
    from_user: bool,
}

/// Read and parse an import file.
pub async fn read_import_file(path: &Path) -> Result<Vec<Conversation>, ImportError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_import(&content)
}

/// Parse a legacy conversation map into conversations ordered by user id.
///
/// A conversation without `lastActivity` takes it from its newest message;
/// one with neither is rejected.
pub fn parse_import(json: &str) -> Result<Vec<Conversation>, ImportError> {
    let doc: BTreeMap<String, LegacyConversation> =
        serde_json::from_str(json).map_err(|e| ImportError::Malformed(e.to_string()))?;

    doc.into_iter()
        .map(|(user_id, legacy)| {
            let messages: Vec<MessageRecord> = legacy
                .messages
                .into_iter()
                .map(|m| MessageRecord::new(user_id.clone(), m.content, m.timestamp, m.from_user))
                .collect();

            let last_activity = legacy
                .last_activity
                .or_else(|| messages.iter().map(|m| m.timestamp).max())
                .ok_or_else(|| {
                    ImportError::Malformed(format!("user {user_id} has no lastActivity and no messages"))
                })?;

            let user = UserRecord {
                user_id,
                username: legacy.username,
                last_activity,
                last_message: legacy.last_message,
            };
            Ok(Conversation::assemble(user, messages))
        })
        .collect()
}
