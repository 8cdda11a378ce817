//! Infrastructure layer for dmrelay.
//!
//! Contains implementations of the ports defined in `dmrelay-core`: the
//! SQLite persistence gateway (with timestamp repair and bulk import), the
//! legacy JSON import reader, the config file loader, and the webhook
//! outbound sender.

pub mod config;
pub mod import;
pub mod outbound;
pub mod sqlite;
