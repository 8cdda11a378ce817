//! SQLite storage layer.
//!
//! The persistence gateway backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod conversation;
pub mod pool;
pub mod repair;

pub use conversation::SqliteConversationGateway;
pub use pool::DatabasePool;
