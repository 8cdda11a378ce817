//! Events pushed to live dashboard viewers.

use serde::{Deserialize, Serialize};

use crate::conversation::MessageRecord;
use crate::timestamp::Timestamp;

/// Payload of a `newMessage` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessagePayload {
    pub user_id: String,
    pub username: String,
    pub content: String,
    pub timestamp: Timestamp,
    pub from_user: bool,
}

impl NewMessagePayload {
    pub fn from_message(username: &str, message: &MessageRecord) -> Self {
        Self {
            user_id: message.user_id.clone(),
            username: username.to_string(),
            content: message.content.clone(),
            timestamp: message.timestamp,
            from_user: message.from_user,
        }
    }
}

/// A typed event on a viewer's push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum LiveEvent {
    /// Sent once, to the new viewer only, when it subscribes.
    Connected,
    /// Liveness heartbeat.
    Ping,
    /// A message was recorded for some conversation.
    NewMessage(NewMessagePayload),
}

impl LiveEvent {
    /// Event name on the wire (SSE `event:` field).
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::Connected => "connected",
            LiveEvent::Ping => "ping",
            LiveEvent::NewMessage(_) => "newMessage",
        }
    }

    /// JSON body for the wire (SSE `data:` field).
    pub fn data(&self) -> serde_json::Value {
        match self {
            LiveEvent::NewMessage(payload) => {
                serde_json::to_value(payload).unwrap_or(serde_json::Value::Null)
            }
            LiveEvent::Connected | LiveEvent::Ping => serde_json::json!({}),
        }
    }
}
