//! Shared domain types for dmrelay.
//!
//! This crate contains the domain types used across the relay: the strict
//! millisecond `Timestamp`, user/message records, the `Conversation`
//! aggregate, live viewer events, configuration, and their error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod conversation;
pub mod error;
pub mod event;
pub mod timestamp;
