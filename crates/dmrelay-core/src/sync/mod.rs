//! Synchronization between the conversation cache, durable storage, and
//! live viewers.

pub mod controller;
pub mod reloader;

#[cfg(test)]
pub(crate) mod fakes;

pub use controller::{
    DurableWrite, OutgoingEntry, RecordedMessage, RelayStats, ReloadReport, SyncController,
    SyncOptions,
};
pub use reloader::spawn_periodic_reload;
