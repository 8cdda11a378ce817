//! Live update fan-out to dashboard viewers.
//!
//! Provides an `EventBroadcaster` that delivers `LiveEvent`s to every
//! subscribed viewer through per-viewer `mpsc` mailboxes.

pub mod broadcaster;

pub use broadcaster::{EventBroadcaster, Subscription, ViewerId};
