//! Conversation synchronization engine for dmrelay.
//!
//! This crate keeps the in-memory conversation cache consistent with the
//! durable store and fans out live updates. It defines the "ports"
//! (`PersistenceGateway`, `OutboundSender`) that the infrastructure layer
//! implements and depends only on `dmrelay-types` -- never on `dmrelay-infra`
//! or any database/IO crate.

pub mod delivery;
pub mod event;
pub mod repository;
pub mod store;
pub mod sync;
