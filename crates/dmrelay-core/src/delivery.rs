//! Outbound send capability (port).
//!
//! The chat-platform gateway lives outside the core. The operator's replies
//! leave through an `OutboundSender`; the infrastructure layer provides the
//! concrete transport.

use thiserror::Error;

/// Why an outbound message could not be delivered.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The identity could not be resolved to a deliverable channel.
    #[error("no deliverable channel for user {0}")]
    Unreachable(String),

    /// The transport accepted the request but delivery failed.
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Delivers operator-authored text to an end user.
pub trait OutboundSender: Send + Sync {
    fn send(
        &self,
        user_id: &str,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), DeliveryError>> + Send;
}
