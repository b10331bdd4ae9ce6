//! Best-effort operator notifications.
//!
//! Delivery failures are logged and never escalated; the caller is never
//! blocked on the external channel.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("operator api returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Transport that can deliver a text message to one recipient identity.
/// Delivery guarantees are whatever the transport provides; callers treat it
/// as at-most-once.
#[async_trait]
pub trait OperatorChannel: Send + Sync {
    async fn send(&self, recipient: i64, text: &str) -> Result<(), NotifyError>;
}

/// Telegram bot `sendMessage` transport.
pub struct TelegramChannel {
    http: reqwest::Client,
    url: String,
}

impl TelegramChannel {
    pub fn new(bot_token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: format!("https://api.telegram.org/bot{bot_token}/sendMessage"),
        }
    }
}

#[async_trait]
impl OperatorChannel for TelegramChannel {
    async fn send(&self, recipient: i64, text: &str) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "chat_id": recipient, "text": text }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status()));
        }
        Ok(())
    }
}

/// Fire-and-forget notifier bound to one recipient.
///
/// Each message is sent from a detached task so a slow or failing external
/// channel can never delay the caller, shutdown included.
#[derive(Clone)]
pub struct Notifier {
    channel: Arc<dyn OperatorChannel>,
    recipient: i64,
}

impl Notifier {
    pub fn new(channel: Arc<dyn OperatorChannel>, recipient: i64) -> Self {
        Self { channel, recipient }
    }

    pub fn telegram(bot_token: &str, recipient: i64) -> Self {
        Self::new(Arc::new(TelegramChannel::new(bot_token)), recipient)
    }

    /// Send `text` to the operator from a detached background task.
    pub fn notify(&self, text: String) {
        let channel = Arc::clone(&self.channel);
        let recipient = self.recipient;
        tokio::spawn(async move {
            if let Err(e) = channel.send(recipient, &text).await {
                warn!(error = %e, "operator notification failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Channel double that records messages and optionally fails.
    pub(crate) struct RecordingChannel {
        pub messages: Mutex<Vec<(i64, String)>>,
        pub fail: bool,
    }

    impl RecordingChannel {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                messages: Mutex::new(Vec::new()),
                fail: false,
            })
        }
    }

    #[async_trait]
    impl OperatorChannel for RecordingChannel {
        async fn send(&self, recipient: i64, text: &str) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Status(reqwest::StatusCode::BAD_GATEWAY));
            }
            self.messages
                .lock()
                .unwrap()
                .push((recipient, text.to_string()));
            Ok(())
        }
    }

    async fn settle() {
        // Give the detached task a chance to run.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn notify_delivers_to_recipient() {
        let channel = RecordingChannel::new();
        let notifier = Notifier::new(channel.clone(), 42);
        notifier.notify("listening on 127.0.0.1:8080".into());
        settle().await;

        let messages = channel.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, 42);
        assert!(messages[0].1.contains("127.0.0.1:8080"));
    }

    #[tokio::test]
    async fn notify_failure_does_not_propagate() {
        let channel = Arc::new(RecordingChannel {
            messages: Mutex::new(Vec::new()),
            fail: true,
        });
        let notifier = Notifier::new(channel.clone(), 7);
        // Must not panic or block.
        notifier.notify("service closed".into());
        settle().await;
        assert!(channel.messages.lock().unwrap().is_empty());
    }
}
