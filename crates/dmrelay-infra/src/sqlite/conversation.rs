//! SQLite conversation gateway.
//!
//! Implements `PersistenceGateway` from `dmrelay-core` using sqlx with split
//! read/write pools. Timestamps are read back as text and go through
//! `Timestamp::parse`, so a malformed stored value is reported instead of
//! silently reinterpreted.

use dmrelay_core::repository::conversation::{ImportReport, PersistenceGateway, RepairReport};
use dmrelay_types::conversation::{Conversation, MessageRecord, UserRecord};
use dmrelay_types::error::{RepositoryError, TimestampError};
use dmrelay_types::timestamp::Timestamp;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info, warn};

use super::pool::DatabasePool;
use super::repair;

/// SQLite-backed implementation of `PersistenceGateway`.
pub struct SqliteConversationGateway {
    pool: DatabasePool,
}

impl SqliteConversationGateway {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// SQL
// ---------------------------------------------------------------------------

const SELECT_USERS: &str = "SELECT user_id, username, CAST(last_activity AS TEXT) AS last_activity_raw, last_message
     FROM users
     ORDER BY last_activity DESC, user_id";

const SELECT_USER: &str = "SELECT user_id, username, CAST(last_activity AS TEXT) AS last_activity_raw, last_message
     FROM users WHERE user_id = ?";

const SELECT_MESSAGES: &str = "SELECT id, user_id, content, CAST(timestamp AS TEXT) AS timestamp_raw, from_user
     FROM messages WHERE user_id = ?
     ORDER BY timestamp ASC, id ASC";

// The stored activity pair is replaced only when the incoming timestamp is
// at least as new, or the stored one is unusable. All CASE arms see the
// pre-update row.
const UPSERT_USER: &str = "INSERT INTO users (user_id, username, last_activity, last_message)
     VALUES (?, ?, ?, ?)
     ON CONFLICT (user_id) DO UPDATE SET
         username = excluded.username,
         last_message = CASE
             WHEN users.last_activity IS NULL
               OR typeof(users.last_activity) <> 'integer'
               OR users.last_activity <= 0
               OR excluded.last_activity >= users.last_activity
             THEN excluded.last_message ELSE users.last_message END,
         last_activity = CASE
             WHEN users.last_activity IS NULL
               OR typeof(users.last_activity) <> 'integer'
               OR users.last_activity <= 0
               OR excluded.last_activity >= users.last_activity
             THEN excluded.last_activity ELSE users.last_activity END
     RETURNING user_id, username, CAST(last_activity AS TEXT) AS last_activity_raw, last_message";

const INSERT_MESSAGE: &str = "INSERT INTO messages (user_id, content, timestamp, from_user)
     VALUES (?, ?, ?, ?)
     RETURNING id";

const INSERT_MESSAGE_IF_ABSENT: &str = "INSERT INTO messages (user_id, content, timestamp, from_user)
     SELECT ?1, ?2, ?3, ?4
     WHERE NOT EXISTS (
         SELECT 1 FROM messages
         WHERE user_id = ?1 AND content = ?2 AND timestamp = ?3 AND from_user = ?4
     )";

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct UserRow {
    user_id: String,
    username: Option<String>,
    last_activity_raw: Option<String>,
    last_message: Option<String>,
}

impl UserRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            last_activity_raw: row.try_get("last_activity_raw")?,
            last_message: row.try_get("last_message")?,
        })
    }

    fn into_record(self) -> Result<UserRecord, RepositoryError> {
        let last_activity = decode_timestamp(self.last_activity_raw).map_err(|e| {
            RepositoryError::InvalidData(format!("user {} last_activity: {e}", self.user_id))
        })?;
        Ok(UserRecord {
            user_id: self.user_id,
            username: self.username.unwrap_or_default(),
            last_activity,
            last_message: self.last_message.unwrap_or_default(),
        })
    }
}

struct MessageRow {
    id: i64,
    user_id: String,
    content: Option<String>,
    timestamp_raw: Option<String>,
    from_user: bool,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            content: row.try_get("content")?,
            timestamp_raw: row.try_get("timestamp_raw")?,
            from_user: row.try_get("from_user")?,
        })
    }

    fn into_record(self) -> Result<MessageRecord, RepositoryError> {
        let timestamp = decode_timestamp(self.timestamp_raw).map_err(|e| {
            RepositoryError::InvalidData(format!("message {} timestamp: {e}", self.id))
        })?;
        Ok(MessageRecord {
            id: Some(self.id),
            user_id: self.user_id,
            content: self.content.unwrap_or_default(),
            timestamp,
            from_user: self.from_user,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn decode_timestamp(raw: Option<String>) -> Result<Timestamp, TimestampError> {
    match raw {
        Some(raw) => Timestamp::parse(&raw),
        None => Err(TimestampError::Missing),
    }
}

pub(crate) fn db_error(e: sqlx::Error) -> RepositoryError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::Connection
        }
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(db.message().to_string())
        }
        other => RepositoryError::Query(other.to_string()),
    }
}

async fn upsert_on(
    conn: &mut SqliteConnection,
    user: &UserRecord,
) -> Result<UserRecord, RepositoryError> {
    let row = sqlx::query(UPSERT_USER)
        .bind(&user.user_id)
        .bind(&user.username)
        .bind(user.last_activity.as_millis())
        .bind(&user.last_message)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error)?;

    UserRow::from_row(&row).map_err(db_error)?.into_record()
}

async fn import_on(
    conn: &mut SqliteConnection,
    conversations: &[Conversation],
) -> Result<ImportReport, RepositoryError> {
    let mut report = ImportReport::default();

    for conv in conversations {
        upsert_on(conn, &conv.user_record()).await?;
        report.users += 1;

        for msg in &conv.messages {
            let inserted = sqlx::query(INSERT_MESSAGE_IF_ABSENT)
                .bind(&conv.user_id)
                .bind(&msg.content)
                .bind(msg.timestamp.as_millis())
                .bind(msg.from_user)
                .execute(&mut *conn)
                .await
                .map_err(db_error)?
                .rows_affected();

            if inserted > 0 {
                report.messages_inserted += 1;
            } else {
                report.messages_skipped += 1;
            }
        }
    }

    Ok(report)
}

// ---------------------------------------------------------------------------
// PersistenceGateway implementation
// ---------------------------------------------------------------------------

impl PersistenceGateway for SqliteConversationGateway {
    async fn fetch_all_users(&self) -> Result<Vec<UserRecord>, RepositoryError> {
        let rows = sqlx::query(SELECT_USERS)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(db_error)?;

        let mut users = Vec::with_capacity(rows.len());
        for row in &rows {
            match UserRow::from_row(row).map_err(db_error)?.into_record() {
                Ok(user) => users.push(user),
                Err(e) => warn!(error = %e, "skipping unreadable user row"),
            }
        }
        Ok(users)
    }

    async fn fetch_user(&self, user_id: &str) -> Result<Option<UserRecord>, RepositoryError> {
        let row = sqlx::query(SELECT_USER)
            .bind(user_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(db_error)?;

        match row {
            Some(row) => Ok(Some(UserRow::from_row(&row).map_err(db_error)?.into_record()?)),
            None => Ok(None),
        }
    }

    async fn fetch_messages(&self, user_id: &str) -> Result<Vec<MessageRecord>, RepositoryError> {
        let rows = sqlx::query(SELECT_MESSAGES)
            .bind(user_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(db_error)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            match MessageRow::from_row(row).map_err(db_error)?.into_record() {
                Ok(msg) => messages.push(msg),
                Err(e) => warn!(user_id, error = %e, "skipping unreadable message row"),
            }
        }
        Ok(messages)
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
        let mut conn = self.pool.writer.acquire().await.map_err(db_error)?;
        upsert_on(&mut conn, user).await
    }

    async fn insert_message(&self, message: &MessageRecord) -> Result<MessageRecord, RepositoryError> {
        let row = sqlx::query(INSERT_MESSAGE)
            .bind(&message.user_id)
            .bind(&message.content)
            .bind(message.timestamp.as_millis())
            .bind(message.from_user)
            .fetch_one(&self.pool.writer)
            .await
            .map_err(db_error)?;

        let id: i64 = row.try_get("id").map_err(db_error)?;
        Ok(MessageRecord {
            id: Some(id),
            ..message.clone()
        })
    }

    async fn run_timestamp_repair(&self) -> Result<RepairReport, RepositoryError> {
        let default_timestamp = Timestamp::now();
        let mut tx = self.pool.writer.begin().await.map_err(db_error)?;

        match repair::repair_timestamps(&mut tx, default_timestamp).await {
            Ok(counts) => {
                tx.commit().await.map_err(db_error)?;
                let report = RepairReport {
                    default_timestamp,
                    users_fixed: counts.users,
                    messages_fixed: counts.messages,
                };
                if report.users_fixed + report.messages_fixed > 0 {
                    info!(
                        users_fixed = report.users_fixed,
                        messages_fixed = report.messages_fixed,
                        default = %default_timestamp,
                        "timestamp repair applied"
                    );
                } else {
                    debug!("timestamp repair found nothing to fix");
                }
                Ok(report)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "timestamp repair rollback failed");
                }
                Err(db_error(e))
            }
        }
    }

    async fn bulk_import(&self, conversations: &[Conversation]) -> Result<ImportReport, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(db_error)?;

        match import_on(&mut tx, conversations).await {
            Ok(report) => {
                tx.commit().await.map_err(db_error)?;
                info!(
                    users = report.users,
                    inserted = report.messages_inserted,
                    skipped = report.messages_skipped,
                    "bulk import committed"
                );
                Ok(report)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "bulk import rollback failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_gateway() -> SqliteConversationGateway {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        SqliteConversationGateway::new(DatabasePool::new(&url).await.unwrap())
    }

    fn ts(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms).unwrap()
    }

    fn user(id: &str, name: &str, at: i64, last: &str) -> UserRecord {
        UserRecord {
            user_id: id.into(),
            username: name.into(),
            last_activity: ts(at),
            last_message: last.into(),
        }
    }

    async fn raw_exec(gw: &SqliteConversationGateway, sql: &str) {
        sqlx::query(sql).execute(&gw.pool().writer).await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_then_fetch() {
        let gw = test_gateway().await;
        let stored = gw.upsert_user(&user("42", "alice", 100, "hi")).await.unwrap();
        assert_eq!(stored, user("42", "alice", 100, "hi"));

        let fetched = gw.fetch_user("42").await.unwrap().unwrap();
        assert_eq!(fetched, stored);
        assert!(gw.fetch_user("7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_is_monotonic() {
        let gw = test_gateway().await;
        gw.upsert_user(&user("42", "alice", 200, "newer")).await.unwrap();
        let stored = gw.upsert_user(&user("42", "renamed", 100, "older")).await.unwrap();

        assert_eq!(stored.username, "renamed");
        assert_eq!(stored.last_activity, ts(200));
        assert_eq!(stored.last_message, "newer");

        let stored = gw.upsert_user(&user("42", "renamed", 200, "tie")).await.unwrap();
        assert_eq!(stored.last_message, "tie");
    }

    #[tokio::test]
    async fn test_upsert_keeps_single_row() {
        let gw = test_gateway().await;
        gw.upsert_user(&user("42", "alice", 1, "a")).await.unwrap();
        gw.upsert_user(&user("42", "alice", 2, "b")).await.unwrap();
        assert_eq!(gw.fetch_all_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_message_assigns_ids() {
        let gw = test_gateway().await;
        let a = gw
            .insert_message(&MessageRecord::new("42", "one", ts(10), true))
            .await
            .unwrap();
        let b = gw
            .insert_message(&MessageRecord::new("42", "two", ts(20), false))
            .await
            .unwrap();

        assert!(a.id.is_some());
        assert!(b.id.unwrap() > a.id.unwrap());
        assert_eq!(b.content, "two");
        assert!(!b.from_user);
    }

    #[tokio::test]
    async fn test_fetch_messages_ordered_with_ties_by_insertion() {
        let gw = test_gateway().await;
        for (text, at) in [("c", 30), ("a1", 10), ("a2", 10), ("b", 20)] {
            gw.insert_message(&MessageRecord::new("42", text, ts(at), true))
                .await
                .unwrap();
        }
        gw.insert_message(&MessageRecord::new("other", "x", ts(5), true))
            .await
            .unwrap();

        let contents: Vec<String> = gw
            .fetch_messages("42")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["a1", "a2", "b", "c"]);
    }

    #[tokio::test]
    async fn test_fetch_all_users_orders_by_activity() {
        let gw = test_gateway().await;
        gw.upsert_user(&user("a", "A", 10, "x")).await.unwrap();
        gw.upsert_user(&user("b", "B", 30, "y")).await.unwrap();
        gw.upsert_user(&user("c", "C", 20, "z")).await.unwrap();

        let ids: Vec<String> = gw
            .fetch_all_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.user_id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_fetch_conversation() {
        let gw = test_gateway().await;
        assert!(gw.fetch_conversation("42").await.unwrap().is_none());

        gw.upsert_user(&user("42", "alice", 20, "second")).await.unwrap();
        gw.insert_message(&MessageRecord::new("42", "first", ts(10), true))
            .await
            .unwrap();
        gw.insert_message(&MessageRecord::new("42", "second", ts(20), false))
            .await
            .unwrap();

        let conv = gw.fetch_conversation("42").await.unwrap().unwrap();
        assert_eq!(conv.username, "alice");
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.latest().unwrap().content, conv.last_message);
    }

    #[tokio::test]
    async fn test_invalid_rows_skipped_on_list_and_rejected_on_get() {
        let gw = test_gateway().await;
        gw.upsert_user(&user("good", "G", 10, "ok")).await.unwrap();
        raw_exec(&gw, "INSERT INTO users (user_id, username, last_activity) VALUES ('bad', 'B', -5)").await;

        let users = gw.fetch_all_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, "good");

        let err = gw.fetch_user("bad").await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_repair_fixes_invalid_rows_with_one_default() {
        let gw = test_gateway().await;
        raw_exec(&gw, "INSERT INTO users (user_id, username, last_activity) VALUES ('a', 'A', 'not-a-number')").await;
        raw_exec(&gw, "INSERT INTO users (user_id, username, last_activity) VALUES ('b', 'B', -5)").await;
        raw_exec(&gw, "INSERT INTO users (user_id, username, last_activity) VALUES ('c', 'C', NULL)").await;
        raw_exec(&gw, "INSERT INTO users (user_id, username, last_activity) VALUES ('d', 'D', 1700000000000)").await;
        raw_exec(&gw, "INSERT INTO messages (user_id, content, timestamp) VALUES ('a', 'x', 'later')").await;
        raw_exec(&gw, "INSERT INTO messages (user_id, content, timestamp) VALUES ('d', 'y', 1700000000000)").await;

        let before = Timestamp::now();
        let report = gw.run_timestamp_repair().await.unwrap();
        assert_eq!(report.users_fixed, 3);
        assert_eq!(report.messages_fixed, 1);
        assert!(report.default_timestamp >= before);

        let users = gw.fetch_all_users().await.unwrap();
        assert_eq!(users.len(), 4);
        for id in ["a", "b", "c"] {
            let u = users.iter().find(|u| u.user_id == id).unwrap();
            assert_eq!(u.last_activity, report.default_timestamp);
        }
        let d = users.iter().find(|u| u.user_id == "d").unwrap();
        assert_eq!(d.last_activity, ts(1_700_000_000_000));

        let msgs = gw.fetch_messages("a").await.unwrap();
        assert_eq!(msgs[0].timestamp, report.default_timestamp);
    }

    #[tokio::test]
    async fn test_repair_is_idempotent() {
        let gw = test_gateway().await;
        raw_exec(&gw, "INSERT INTO users (user_id, username, last_activity) VALUES ('a', 'A', 'bad')").await;

        assert_eq!(gw.run_timestamp_repair().await.unwrap().users_fixed, 1);
        let second = gw.run_timestamp_repair().await.unwrap();
        assert_eq!(second.users_fixed, 0);
        assert_eq!(second.messages_fixed, 0);
    }

    #[tokio::test]
    async fn test_repair_rebuilds_text_columns() {
        let gw = test_gateway().await;
        raw_exec(&gw, "DROP TABLE users").await;
        raw_exec(
            &gw,
            "CREATE TABLE users (user_id TEXT PRIMARY KEY, username TEXT, last_activity TEXT, last_message TEXT)",
        )
        .await;
        raw_exec(&gw, "INSERT INTO users VALUES ('a', 'A', '1700000000000', 'hi')").await;
        raw_exec(&gw, "INSERT INTO users VALUES ('b', NULL, 'garbage', NULL)").await;

        let report = gw.run_timestamp_repair().await.unwrap();
        assert_eq!(report.users_fixed, 1);

        let (declared,): (String,) =
            sqlx::query_as("SELECT type FROM pragma_table_info('users') WHERE name = 'last_activity'")
                .fetch_one(&gw.pool().reader)
                .await
                .unwrap();
        assert_eq!(declared, "BIGINT");

        let (kind,): (String,) =
            sqlx::query_as("SELECT typeof(last_activity) FROM users WHERE user_id = 'a'")
                .fetch_one(&gw.pool().reader)
                .await
                .unwrap();
        assert_eq!(kind, "integer");

        let b = gw.fetch_user("b").await.unwrap().unwrap();
        assert_eq!(b.username, "");
        assert_eq!(b.last_activity, report.default_timestamp);
    }

    #[tokio::test]
    async fn test_bulk_import_skips_duplicates() {
        let gw = test_gateway().await;
        let conv = Conversation::assemble(
            user("42", "alice", 20, "second"),
            vec![
                MessageRecord::new("42", "first", ts(10), true),
                MessageRecord::new("42", "second", ts(20), false),
            ],
        );

        let first = gw.bulk_import(std::slice::from_ref(&conv)).await.unwrap();
        assert_eq!(first.users, 1);
        assert_eq!(first.messages_inserted, 2);
        assert_eq!(first.messages_skipped, 0);

        let second = gw.bulk_import(&[conv]).await.unwrap();
        assert_eq!(second.messages_inserted, 0);
        assert_eq!(second.messages_skipped, 2);
        assert_eq!(gw.fetch_messages("42").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_bulk_import_rolls_back_on_failure() {
        let gw = test_gateway().await;
        raw_exec(
            &gw,
            "CREATE TRIGGER reject_boom BEFORE INSERT ON messages WHEN NEW.content = 'boom'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .await;

        let ok = Conversation::assemble(
            user("1", "one", 10, "fine"),
            vec![MessageRecord::new("1", "fine", ts(10), true)],
        );
        let bad = Conversation::assemble(
            user("2", "two", 10, "boom"),
            vec![MessageRecord::new("2", "boom", ts(10), true)],
        );

        assert!(gw.bulk_import(&[ok, bad]).await.is_err());
        assert!(gw.fetch_all_users().await.unwrap().is_empty());
        assert!(gw.fetch_messages("1").await.unwrap().is_empty());
    }
}
