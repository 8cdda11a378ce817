//! Durable conversation storage port.
//!
//! Two relations back the relay: users (one row per identity, upserted) and
//! messages (append-only). Every method is an independently failing unit of
//! work; multi-statement methods are all-or-nothing.

use dmrelay_types::conversation::{Conversation, MessageRecord, UserRecord};
use dmrelay_types::error::RepositoryError;
use dmrelay_types::timestamp::Timestamp;
use serde::Serialize;

/// Outcome of one timestamp repair run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    /// The single default written to every repaired row in this run.
    pub default_timestamp: Timestamp,
    pub users_fixed: u64,
    pub messages_fixed: u64,
}

/// Outcome of a bulk import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub users: u64,
    pub messages_inserted: u64,
    pub messages_skipped: u64,
}

/// Repository trait for user and message persistence.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait PersistenceGateway: Send + Sync {
    /// All users, most recently active first.
    fn fetch_all_users(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<UserRecord>, RepositoryError>> + Send;

    fn fetch_user(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<UserRecord>, RepositoryError>> + Send;

    /// Messages for one user, ordered by timestamp ascending (ties by insertion).
    fn fetch_messages(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<MessageRecord>, RepositoryError>> + Send;

    /// User row plus ordered messages, or `None` if the user is unknown.
    fn fetch_conversation(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Conversation>, RepositoryError>> + Send;

    /// Insert-or-update keyed by user id. Returns the stored row.
    ///
    /// `username` is always overwritten. `last_activity`/`last_message` only
    /// move forward: an older `last_activity` leaves the stored pair intact.
    fn upsert_user(
        &self,
        user: &UserRecord,
    ) -> impl std::future::Future<Output = Result<UserRecord, RepositoryError>> + Send;

    /// Append-only insert. Returns the stored row with its generated id.
    fn insert_message(
        &self,
        message: &MessageRecord,
    ) -> impl std::future::Future<Output = Result<MessageRecord, RepositoryError>> + Send;

    /// Normalize timestamp columns and repair invalid values in one
    /// transaction. Either everything commits or nothing does.
    fn run_timestamp_repair(
        &self,
    ) -> impl std::future::Future<Output = Result<RepairReport, RepositoryError>> + Send;

    /// Transactional batch upsert of users and insert of their messages.
    /// Messages identical to an existing row are skipped, not duplicated.
    fn bulk_import(
        &self,
        conversations: &[Conversation],
    ) -> impl std::future::Future<Output = Result<ImportReport, RepositoryError>> + Send;
}
