//! In-memory port implementations for controller tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use dmrelay_types::conversation::{Conversation, MessageRecord, UserRecord};
use dmrelay_types::error::RepositoryError;
use dmrelay_types::timestamp::Timestamp;

use crate::delivery::{DeliveryError, OutboundSender};
use crate::repository::{ImportReport, PersistenceGateway, RepairReport};

#[derive(Default)]
struct Tables {
    users: BTreeMap<String, UserRecord>,
    messages: Vec<MessageRecord>,
    next_id: i64,
}

#[derive(Default)]
pub struct FakeGateway {
    tables: Mutex<Tables>,
    pub fail_writes: AtomicBool,
    pub fail_reads: AtomicBool,
    pub fail_repair: AtomicBool,
    pub repair_calls: AtomicUsize,
}

impl FakeGateway {
    fn check(flag: &AtomicBool) -> Result<(), RepositoryError> {
        if flag.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        Ok(())
    }
}

impl PersistenceGateway for FakeGateway {
    async fn fetch_all_users(&self) -> Result<Vec<UserRecord>, RepositoryError> {
        Self::check(&self.fail_reads)?;
        let tables = self.tables.lock().unwrap();
        let mut users: Vec<UserRecord> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(users)
    }

    async fn fetch_user(&self, user_id: &str) -> Result<Option<UserRecord>, RepositoryError> {
        Self::check(&self.fail_reads)?;
        Ok(self.tables.lock().unwrap().users.get(user_id).cloned())
    }

    async fn fetch_messages(&self, user_id: &str) -> Result<Vec<MessageRecord>, RepositoryError> {
        Self::check(&self.fail_reads)?;
        let tables = self.tables.lock().unwrap();
        let mut msgs: Vec<MessageRecord> = tables
            .messages
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        msgs.sort_by_key(|m| (m.timestamp, m.id));
        Ok(msgs)
    }

    async fn fetch_conversation(
        &self,
        user_id: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let Some(user) = self.fetch_user(user_id).await? else {
            return Ok(None);
        };
        let messages = self.fetch_messages(user_id).await?;
        Ok(Some(Conversation::assemble(user, messages)))
    }

    async fn upsert_user(&self, user: &UserRecord) -> Result<UserRecord, RepositoryError> {
        Self::check(&self.fail_writes)?;
        let mut tables = self.tables.lock().unwrap();
        let stored = tables
            .users
            .entry(user.user_id.clone())
            .or_insert_with(|| user.clone());
        stored.username = user.username.clone();
        if user.last_activity >= stored.last_activity {
            stored.last_activity = user.last_activity;
            stored.last_message = user.last_message.clone();
        }
        Ok(stored.clone())
    }

    async fn insert_message(&self, message: &MessageRecord) -> Result<MessageRecord, RepositoryError> {
        Self::check(&self.fail_writes)?;
        let mut tables = self.tables.lock().unwrap();
        tables.next_id += 1;
        let stored = MessageRecord {
            id: Some(tables.next_id),
            ..message.clone()
        };
        tables.messages.push(stored.clone());
        Ok(stored)
    }

    async fn run_timestamp_repair(&self) -> Result<RepairReport, RepositoryError> {
        self.repair_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_repair)?;
        Ok(RepairReport {
            default_timestamp: Timestamp::now(),
            users_fixed: 0,
            messages_fixed: 0,
        })
    }

    async fn bulk_import(&self, conversations: &[Conversation]) -> Result<ImportReport, RepositoryError> {
        let mut report = ImportReport::default();
        for conv in conversations {
            self.upsert_user(&conv.user_record()).await?;
            report.users += 1;
            for msg in &conv.messages {
                self.insert_message(msg).await?;
                report.messages_inserted += 1;
            }
        }
        Ok(report)
    }
}

/// Gateway whose `fetch_messages` stalls after reading, so a reload holds
/// a stale snapshot for `delay` before replacing the cache.
pub struct SlowFetchGateway {
    pub inner: FakeGateway,
    pub delay: Duration,
}

impl SlowFetchGateway {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: FakeGateway::default(),
            delay,
        }
    }
}

impl PersistenceGateway for SlowFetchGateway {
    async fn fetch_all_users(&self) -> Result<Vec<UserRecord>, RepositoryError> {
        self.inner.fetch_all_users().await
    }

    async fn fetch_user(&self, user_id: &str) -> Result<Option<UserRecord>, RepositoryError> {
        self.inner.fetch_user(user_id).await
    }

    async fn fetch_messages(&self, user_id: &str) -> Result<Vec<MessageRecord>, RepositoryError> {
        let messages = self.inner.fetch_messages(user_id).await?;
        tokio::time::sleep(self.delay).await;
        Ok(messages)
    }

    async fn fetch_conversation(
        &self,
        user_id: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        self.inner.fetch_conversation(user_id).await
    }

    async fn upsert_user(&self, user: &UserRecord) -> Result<UserRecord, RepositoryError> {
        self.inner.upsert_user(user).await
    }

    async fn insert_message(&self, message: &MessageRecord) -> Result<MessageRecord, RepositoryError> {
        self.inner.insert_message(message).await
    }

    async fn run_timestamp_repair(&self) -> Result<RepairReport, RepositoryError> {
        self.inner.run_timestamp_repair().await
    }

    async fn bulk_import(&self, conversations: &[Conversation]) -> Result<ImportReport, RepositoryError> {
        self.inner.bulk_import(conversations).await
    }
}

/// Outbound sender that records deliveries, or refuses every identity.
#[derive(Default)]
pub struct FakeOutbound {
    pub sent: Mutex<Vec<(String, String)>>,
    refuse: bool,
}

impl FakeOutbound {
    pub fn unreachable() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            refuse: true,
        }
    }
}

impl OutboundSender for FakeOutbound {
    async fn send(&self, user_id: &str, text: &str) -> Result<(), DeliveryError> {
        if self.refuse {
            return Err(DeliveryError::Unreachable(user_id.to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((user_id.to_string(), text.to_string()));
        Ok(())
    }
}
