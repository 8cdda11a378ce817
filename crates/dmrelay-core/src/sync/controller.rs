//! Orchestration of cache writes, durable writes, and live broadcast.
//!
//! `SyncController` is the entry point external collaborators call. A
//! recorded message is applied to the [`ConversationStore`] first, then
//! written through the [`PersistenceGateway`], then published to viewers.
//! The broadcast follows the durable attempt whether or not it succeeded.
//!
//! The cache is a best-effort read cache. If the durable write fails after
//! the cache was updated, the cache runs ahead of storage until the next
//! [`SyncController::reload`], which rebuilds it from storage. The failure is
//! logged and returned to the caller as [`DurableWrite::Failed`].
//!
//! Writes and reloads are mutually exclusive: every write holds the reload
//! gate shared, and a reload holds it exclusively from its first fetch
//! until the cache is replaced. A message recorded while a reload is
//! pending lands after the new snapshot, never underneath it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use dmrelay_types::conversation::{Conversation, InboundMessage, MessageRecord, UserRecord};
use dmrelay_types::error::{RepositoryError, SyncError};
use dmrelay_types::event::{LiveEvent, NewMessagePayload};
use dmrelay_types::timestamp::Timestamp;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::delivery::{DeliveryError, OutboundSender};
use crate::event::EventBroadcaster;
use crate::repository::{PersistenceGateway, RepairReport};
use crate::store::ConversationStore;

/// Username used when the operator writes to an identity the cache has not
/// seen yet.
pub const UNKNOWN_USERNAME: &str = "Unknown";

/// Number of operator-sent messages kept for the stats view.
const RECENT_OUTGOING_LIMIT: usize = 100;

/// Controller behaviour switches.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Run the timestamp repair pass before each reload.
    pub repair_on_reload: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            repair_on_reload: true,
        }
    }
}

/// Result of the durable half of a dual write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DurableWrite {
    Committed,
    /// The cache is ahead of storage until the next reload.
    Failed { reason: String },
}

/// Outcome of `record_message`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedMessage {
    /// The message as stored (carries its id when the durable insert succeeded).
    pub message: MessageRecord,
    /// User-level fields of the conversation after the write.
    pub user: UserRecord,
    pub durable: DurableWrite,
    /// Viewers the `newMessage` event reached.
    pub viewers_notified: usize,
}

/// Outcome of `reload`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadReport {
    pub conversations: usize,
    pub messages: usize,
    /// `None` when repair was disabled or failed.
    pub repair: Option<RepairReport>,
}

/// One entry of the operator's recent outgoing log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingEntry {
    pub user_id: String,
    pub username: String,
    pub content: String,
    pub timestamp: Timestamp,
}

/// Dashboard counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    pub total_users: usize,
    pub messages_total: u64,
    pub viewers: usize,
    pub recent_outgoing: Vec<OutgoingEntry>,
}

/// Orchestrates reload-from-store, dual writes, and broadcast triggering.
///
/// Generic over `PersistenceGateway` and `OutboundSender` to maintain
/// clean architecture (dmrelay-core never depends on dmrelay-infra).
pub struct SyncController<G: PersistenceGateway, O: OutboundSender> {
    store: ConversationStore,
    gateway: G,
    outbound: O,
    broadcaster: EventBroadcaster,
    options: SyncOptions,
    /// Shared by writes, exclusive for the fetch-and-replace of a reload.
    reload_gate: tokio::sync::RwLock<()>,
    /// Serializes same-user writes in arrival order. Entries live only
    /// while a write for that user is in flight.
    user_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    messages_total: AtomicU64,
    recent_outgoing: Mutex<VecDeque<OutgoingEntry>>,
}

impl<G: PersistenceGateway, O: OutboundSender> SyncController<G, O> {
    pub fn new(
        gateway: G,
        outbound: O,
        broadcaster: EventBroadcaster,
        options: SyncOptions,
    ) -> Self {
        Self {
            store: ConversationStore::new(),
            gateway,
            outbound,
            broadcaster,
            options,
            reload_gate: tokio::sync::RwLock::new(()),
            user_locks: DashMap::new(),
            messages_total: AtomicU64::new(0),
            recent_outgoing: Mutex::new(VecDeque::new()),
        }
    }

    /// Read access to the conversation cache.
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    /// Record one message for a user.
    ///
    /// `timestamp` is the authoritative send time when the source provides
    /// one; otherwise the current wall-clock time is used.
    pub async fn record_message(
        &self,
        user_id: &str,
        username: &str,
        content: &str,
        from_user: bool,
        timestamp: Option<Timestamp>,
    ) -> Result<RecordedMessage, SyncError> {
        if user_id.trim().is_empty() {
            return Err(SyncError::Validation("user id must not be empty".into()));
        }

        let _gate = self.reload_gate.read().await;
        // Declared before the lock handle so it drops after it, on every
        // exit path including cancellation.
        let _lease = UserLockLease {
            locks: &self.user_locks,
            user_id,
        };
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        Ok(self
            .write_through(user_id, username, content, from_user, timestamp)
            .await)
    }

    /// Cache write, durable write, then broadcast. Caller holds the gate
    /// and the user's lock.
    async fn write_through(
        &self,
        user_id: &str,
        username: &str,
        content: &str,
        from_user: bool,
        timestamp: Option<Timestamp>,
    ) -> RecordedMessage {
        let at = timestamp.unwrap_or_else(Timestamp::now);
        let message = MessageRecord::new(user_id, content, at, from_user);

        let user = self.store.record_message(username, message.clone());

        let (message, durable) = match self.persist(username, &message).await {
            Ok(stored) => (stored, DurableWrite::Committed),
            Err(err) => {
                warn!(
                    %user_id,
                    error = %err,
                    "durable write failed; cache is ahead of storage until next reload"
                );
                (
                    message,
                    DurableWrite::Failed {
                        reason: err.to_string(),
                    },
                )
            }
        };

        self.messages_total.fetch_add(1, Ordering::Relaxed);

        let viewers_notified = self.broadcaster.publish(LiveEvent::NewMessage(
            NewMessagePayload::from_message(username, &message),
        ));

        debug!(%user_id, from_user, timestamp = %at, viewers_notified, "message recorded");

        RecordedMessage {
            message,
            user,
            durable,
            viewers_notified,
        }
    }

    /// Record a message delivered by the chat-platform gateway.
    pub async fn ingest_inbound(
        &self,
        inbound: InboundMessage,
    ) -> Result<RecordedMessage, SyncError> {
        self.record_message(
            &inbound.sender_id,
            &inbound.sender_name,
            &inbound.text,
            true,
            inbound.send_timestamp,
        )
        .await
    }

    /// Deliver an operator reply, then record it.
    ///
    /// Nothing is recorded if delivery fails.
    pub async fn send_to_user(
        &self,
        user_id: &str,
        text: &str,
    ) -> Result<RecordedMessage, SyncError> {
        if user_id.trim().is_empty() || text.is_empty() {
            return Err(SyncError::Validation("missing required fields".into()));
        }

        self.outbound
            .send(user_id, text)
            .await
            .map_err(|err| match err {
                DeliveryError::Unreachable(id) => SyncError::Unreachable(id),
                DeliveryError::Failed(reason) => SyncError::Delivery(reason),
            })?;

        let username = self
            .store
            .username_of(user_id)
            .unwrap_or_else(|| UNKNOWN_USERNAME.to_string());

        let recorded = self
            .record_message(user_id, &username, text, false, None)
            .await?;

        let mut log = self
            .recent_outgoing
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        log.push_back(OutgoingEntry {
            user_id: user_id.to_string(),
            username,
            content: text.to_string(),
            timestamp: recorded.message.timestamp,
        });
        while log.len() > RECENT_OUTGOING_LIMIT {
            log.pop_front();
        }

        Ok(recorded)
    }

    /// Rebuild the cache from durable state.
    ///
    /// Timestamp repair runs first when enabled; its failure is logged and
    /// loading continues with whatever storage holds. A failed fetch leaves
    /// the current cache untouched.
    pub async fn reload(&self) -> Result<ReloadReport, SyncError> {
        let repair = if self.options.repair_on_reload {
            match self.gateway.run_timestamp_repair().await {
                Ok(report) => {
                    if report.users_fixed > 0 || report.messages_fixed > 0 {
                        info!(
                            users_fixed = report.users_fixed,
                            messages_fixed = report.messages_fixed,
                            default_timestamp = %report.default_timestamp,
                            "repaired stored timestamps"
                        );
                    }
                    Some(report)
                }
                Err(err) => {
                    warn!(error = %err, "timestamp repair failed; loading best-available data");
                    None
                }
            }
        } else {
            None
        };

        let _gate = self.reload_gate.write().await;
        let users = self.gateway.fetch_all_users().await?;
        let mut conversations = Vec::with_capacity(users.len());
        let mut messages = 0;
        for user in users {
            let history = self.gateway.fetch_messages(&user.user_id).await?;
            messages += history.len();
            conversations.push(Conversation::assemble(user, history));
        }

        let report = ReloadReport {
            conversations: conversations.len(),
            messages,
            repair,
        };
        self.store.replace_all(conversations);

        info!(
            conversations = report.conversations,
            messages = report.messages,
            "conversations reloaded from storage"
        );
        Ok(report)
    }

    pub fn stats(&self) -> RelayStats {
        let recent_outgoing = self
            .recent_outgoing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        RelayStats {
            total_users: self.store.len(),
            messages_total: self.messages_total.load(Ordering::Relaxed),
            viewers: self.broadcaster.viewer_count(),
            recent_outgoing,
        }
    }

    async fn persist(
        &self,
        username: &str,
        message: &MessageRecord,
    ) -> Result<MessageRecord, RepositoryError> {
        let user = UserRecord {
            user_id: message.user_id.clone(),
            username: username.to_string(),
            last_activity: message.timestamp,
            last_message: message.content.clone(),
        };
        self.gateway.upsert_user(&user).await?;
        self.gateway.insert_message(message).await
    }

    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }
}

/// Removes a user's lock entry once no other write holds or awaits it.
struct UserLockLease<'a> {
    locks: &'a DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    user_id: &'a str,
}

impl Drop for UserLockLease<'_> {
    fn drop(&mut self) {
        self.locks
            .remove_if(self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
