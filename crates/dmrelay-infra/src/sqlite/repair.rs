//! Timestamp normalization for legacy databases.
//!
//! Older deployments stored timestamps as TEXT, and some rows carry null,
//! non-positive, or non-numeric values. The repair pass runs on a single
//! writer connection inside the caller's transaction:
//!
//! 1. Rebuild any table whose timestamp column is not declared as an integer
//!    type, copying rows into the canonical schema.
//! 2. Convert digit-only text and integral reals to integers.
//! 3. Overwrite everything still invalid with one run-wide default.

use dmrelay_types::timestamp::Timestamp;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};

/// A table that carries a millisecond timestamp column.
struct TimestampColumn {
    table: &'static str,
    column: &'static str,
    /// Statements that rebuild the table into the canonical schema.
    rebuild: &'static [&'static str],
}

const USERS: TimestampColumn = TimestampColumn {
    table: "users",
    column: "last_activity",
    rebuild: &[
        "CREATE TABLE users_normalized (
            user_id       TEXT PRIMARY KEY NOT NULL,
            username      TEXT NOT NULL,
            last_activity BIGINT,
            last_message  TEXT
        )",
        "INSERT INTO users_normalized (user_id, username, last_activity, last_message)
         SELECT user_id, COALESCE(username, ''), last_activity, last_message
         FROM users WHERE user_id IS NOT NULL",
        "DROP TABLE users",
        "ALTER TABLE users_normalized RENAME TO users",
        "CREATE INDEX IF NOT EXISTS idx_users_last_activity ON users (last_activity DESC)",
    ],
};

const MESSAGES: TimestampColumn = TimestampColumn {
    table: "messages",
    column: "timestamp",
    rebuild: &[
        "CREATE TABLE messages_normalized (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id   TEXT NOT NULL,
            content   TEXT NOT NULL,
            timestamp BIGINT,
            from_user BOOLEAN NOT NULL DEFAULT 0
        )",
        "INSERT INTO messages_normalized (id, user_id, content, timestamp, from_user)
         SELECT id, user_id, COALESCE(content, ''), timestamp, COALESCE(from_user, 0)
         FROM messages WHERE user_id IS NOT NULL",
        "DROP TABLE messages",
        "ALTER TABLE messages_normalized RENAME TO messages",
        "CREATE INDEX IF NOT EXISTS idx_messages_user_timestamp ON messages (user_id, timestamp, id)",
    ],
};

/// Rows overwritten with the default, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RepairCounts {
    pub users: u64,
    pub messages: u64,
}

/// Normalize and repair both timestamp columns.
///
/// Must run inside a transaction; any error leaves the caller to roll back.
pub(crate) async fn repair_timestamps(
    conn: &mut SqliteConnection,
    default: Timestamp,
) -> Result<RepairCounts, sqlx::Error> {
    let users = repair_column(conn, &USERS, default).await?;
    let messages = repair_column(conn, &MESSAGES, default).await?;
    Ok(RepairCounts { users, messages })
}

async fn repair_column(
    conn: &mut SqliteConnection,
    target: &TimestampColumn,
    default: Timestamp,
) -> Result<u64, sqlx::Error> {
    let (table, column) = (target.table, target.column);

    let declared = declared_type(conn, table, column).await?;
    if !is_integer_type(&declared) {
        info!(table, column, declared = %declared, "rebuilding table with integer timestamp column");
        for stmt in target.rebuild {
            sqlx::query(*stmt).execute(&mut *conn).await?;
        }
    }

    let coerced_text = sqlx::query(&format!(
        "UPDATE {table} SET {column} = CAST({column} AS INTEGER)
         WHERE typeof({column}) = 'text' AND {column} <> '' AND {column} NOT GLOB '*[^0-9]*'"
    ))
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let coerced_real = sqlx::query(&format!(
        "UPDATE {table} SET {column} = CAST({column} AS INTEGER)
         WHERE typeof({column}) = 'real' AND {column} = CAST({column} AS INTEGER)"
    ))
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let fixed = sqlx::query(&format!(
        "UPDATE {table} SET {column} = ?
         WHERE {column} IS NULL OR typeof({column}) <> 'integer' OR {column} <= 0"
    ))
    .bind(default.as_millis())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    debug!(table, coerced = coerced_text + coerced_real, fixed, "timestamp column repaired");
    Ok(fixed)
}

async fn declared_type(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
) -> Result<String, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT type FROM pragma_table_info('{table}') WHERE name = ?"
    ))
    .bind(column)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => row.try_get::<String, _>("type"),
        None => Ok(String::new()),
    }
}

fn is_integer_type(declared: &str) -> bool {
    matches!(
        declared.to_ascii_uppercase().as_str(),
        "INTEGER" | "INT" | "BIGINT"
    )
}
