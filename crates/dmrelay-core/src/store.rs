//! In-memory conversation cache.
//!
//! `ConversationStore` maps user identity to the full conversation state and
//! is the single source of truth for readers within a process lifetime. It
//! holds nothing the durable store does not also hold, so it can be dropped
//! and rebuilt from storage at any time.
//!
//! Locks are never held across an `.await`: each public method takes the
//! lock, mutates or copies, and releases before returning. A reader therefore
//! sees a mutation either entirely or not at all.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dmrelay_types::conversation::{Conversation, MessageRecord, UserRecord};
use dmrelay_types::timestamp::Timestamp;
use thiserror::Error;
use tracing::debug;

/// Errors from cache mutations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `append_message` was called before `upsert_user` for this identity.
    #[error("no conversation for user {0}")]
    UnknownUser(String),
}

/// Process-wide conversation cache keyed by user id.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point lookup. Returns a snapshot.
    pub fn get(&self, user_id: &str) -> Option<Conversation> {
        self.read().get(user_id).cloned()
    }

    /// Every conversation, most recently active first.
    ///
    /// Ties on `last_activity` are ordered by user id so repeated calls over
    /// the same state return identical output.
    pub fn list_all(&self) -> Vec<Conversation> {
        let mut all: Vec<Conversation> = self.read().values().cloned().collect();
        all.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        all
    }

    /// Create the conversation if absent, otherwise update its user fields.
    ///
    /// `username` always takes the new value. `last_activity`/`last_message`
    /// move only forward; an equal timestamp counts as newer.
    pub fn upsert_user(
        &self,
        user_id: &str,
        username: &str,
        last_activity: Timestamp,
        last_message: &str,
    ) -> UserRecord {
        let mut map = self.write();
        let conv = map
            .entry(user_id.to_string())
            .or_insert_with(|| new_conversation(user_id, username, last_activity, last_message));
        apply_activity(conv, username, last_activity, last_message);
        conv.user_record()
    }

    /// Add a message to an existing conversation.
    ///
    /// The message lands after every message with a timestamp less than or
    /// equal to its own, so out-of-order arrivals still leave the sequence
    /// sorted and ties keep arrival order.
    pub fn append_message(&self, message: MessageRecord) -> Result<(), StoreError> {
        let mut map = self.write();
        let conv = map
            .get_mut(&message.user_id)
            .ok_or_else(|| StoreError::UnknownUser(message.user_id.clone()))?;
        insert_sorted(&mut conv.messages, message);
        Ok(())
    }

    /// Upsert the user and append the message under one write lock.
    ///
    /// Returns the resulting user-level fields.
    pub fn record_message(&self, username: &str, message: MessageRecord) -> UserRecord {
        let mut map = self.write();
        let conv = map.entry(message.user_id.clone()).or_insert_with(|| {
            new_conversation(&message.user_id, username, message.timestamp, &message.content)
        });
        apply_activity(conv, username, message.timestamp, &message.content);
        insert_sorted(&mut conv.messages, message);
        conv.user_record()
    }

    /// Discard the whole cache and substitute a freshly loaded set.
    pub fn replace_all(&self, conversations: Vec<Conversation>) {
        let fresh: HashMap<String, Conversation> = conversations
            .into_iter()
            .map(|c| (c.user_id.clone(), c))
            .collect();
        let count = fresh.len();
        *self.write() = fresh;
        debug!(count, "conversation cache replaced");
    }

    /// Cached display name for a user, if known.
    pub fn username_of(&self, user_id: &str) -> Option<String> {
        self.read().get(user_id).map(|c| c.username.clone())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Conversation>> {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Conversation>> {
        self.conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn new_conversation(
    user_id: &str,
    username: &str,
    last_activity: Timestamp,
    last_message: &str,
) -> Conversation {
    Conversation::from_user(UserRecord {
        user_id: user_id.to_string(),
        username: username.to_string(),
        last_activity,
        last_message: last_message.to_string(),
    })
}

fn apply_activity(conv: &mut Conversation, username: &str, at: Timestamp, text: &str) {
    conv.username = username.to_string();
    if at >= conv.last_activity {
        conv.last_activity = at;
        conv.last_message = text.to_string();
    }
}

fn insert_sorted(messages: &mut Vec<MessageRecord>, message: MessageRecord) {
    let idx = messages.partition_point(|m| m.timestamp <= message.timestamp);
    messages.insert(idx, message);
}
