//! REST API handler modules.

pub mod conversation;
pub mod events;
pub mod health;
pub mod message;
pub mod stats;
