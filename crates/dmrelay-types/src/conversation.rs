//! User, message, and conversation records.
//!
//! A [`Conversation`] is the aggregate of one [`UserRecord`] plus its
//! messages ordered by timestamp ascending (ties in insertion order).

use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

/// Durable metadata for one end user.
///
/// `last_activity`/`last_message` are a denormalized cache of the newest
/// message for this identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: String,
    pub username: String,
    pub last_activity: Timestamp,
    pub last_message: String,
}

/// One relayed message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Storage-generated identifier; `None` until the row is inserted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub user_id: String,
    pub content: String,
    pub timestamp: Timestamp,
    /// `true` = inbound from the end user, `false` = sent by the operator.
    pub from_user: bool,
}

impl MessageRecord {
    pub fn new(
        user_id: impl Into<String>,
        content: impl Into<String>,
        timestamp: Timestamp,
        from_user: bool,
    ) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            content: content.into(),
            timestamp,
            from_user,
        }
    }
}

/// One user's metadata plus ordered message history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub user_id: String,
    pub username: String,
    pub last_activity: Timestamp,
    pub last_message: String,
    pub messages: Vec<MessageRecord>,
}

impl Conversation {
    /// An empty conversation for a user record.
    pub fn from_user(user: UserRecord) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username,
            last_activity: user.last_activity,
            last_message: user.last_message,
            messages: Vec::new(),
        }
    }

    /// Assemble an aggregate from storage rows. Messages are stably sorted
    /// by timestamp so the ordering invariant holds regardless of input order.
    pub fn assemble(user: UserRecord, mut messages: Vec<MessageRecord>) -> Self {
        messages.sort_by_key(|m| m.timestamp);
        Self {
            messages,
            ..Self::from_user(user)
        }
    }

    /// The user-level fields of this conversation.
    pub fn user_record(&self) -> UserRecord {
        UserRecord {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            last_activity: self.last_activity,
            last_message: self.last_message.clone(),
        }
    }

    /// The newest message, if any.
    pub fn latest(&self) -> Option<&MessageRecord> {
        self.messages.last()
    }
}

/// A message delivered by the chat-platform gateway.
///
/// `send_timestamp` is the platform's authoritative send time; when absent
/// the arrival time is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    #[serde(default)]
    pub send_timestamp: Option<Timestamp>,
}
