//! Webhook-backed outbound sender.
//!
//! Operator replies are POSTed as `{"userId": ..., "text": ...}` to the
//! configured chat-platform gateway. Without a URL every send is reported as
//! unreachable.

use std::time::Duration;

use dmrelay_core::delivery::{DeliveryError, OutboundSender};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundPayload<'a> {
    user_id: &'a str,
    text: &'a str,
}

/// [`OutboundSender`] that forwards to an HTTP webhook.
pub struct WebhookOutbound {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookOutbound {
    pub fn new(url: Option<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, url })
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

impl OutboundSender for WebhookOutbound {
    async fn send(&self, user_id: &str, text: &str) -> Result<(), DeliveryError> {
        let Some(url) = &self.url else {
            return Err(DeliveryError::Unreachable(user_id.to_string()));
        };

        let response = self
            .client
            .post(url)
            .json(&OutboundPayload { user_id, text })
            .send()
            .await
            .map_err(|e| DeliveryError::Failed(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DeliveryError::Unreachable(user_id.to_string()));
        }
        if !status.is_success() {
            return Err(DeliveryError::Failed(format!("gateway returned {status}")));
        }

        tracing::debug!(user_id, "outbound message delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_sender_is_unreachable() {
        let sender = WebhookOutbound::new(None).unwrap();
        assert!(!sender.is_configured());
        let err = sender.send("42", "hi").await.unwrap_err();
        assert!(matches!(err, DeliveryError::Unreachable(id) if id == "42"));
    }

    #[tokio::test]
    async fn connection_refused_is_failure() {
        let sender = WebhookOutbound::new(Some("http://127.0.0.1:9/send".into())).unwrap();
        let err = sender.send("42", "hi").await.unwrap_err();
        assert!(matches!(err, DeliveryError::Failed(_)));
    }

    #[test]
    fn payload_is_camel_case() {
        let json = serde_json::to_value(OutboundPayload { user_id: "42", text: "hi" }).unwrap();
        assert_eq!(json, serde_json::json!({"userId": "42", "text": "hi"}));
    }
}
