//! Notification Gateway
//!
//! Email and SMS delivery behind a port. The `Notifier` front is
//! fire-and-forget: delivery failures are logged and never reach the caller.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Delivery to {recipient} failed: {reason}")]
    Delivery { recipient: String, reason: String },
}

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;

    async fn send_sms(&self, to: &str, text: &str) -> Result<(), NotifyError>;
}

/// Gateway that only emits a tracing event; used by the daemon
#[derive(Debug, Default, Clone)]
pub struct TracingGateway;

#[async_trait]
impl NotificationGateway for TracingGateway {
    async fn send_email(&self, to: &str, subject: &str, _body: &str) -> Result<(), NotifyError> {
        tracing::info!(to = %to, subject = %subject, "Email dispatched");
        Ok(())
    }

    async fn send_sms(&self, to: &str, _text: &str) -> Result<(), NotifyError> {
        tracing::info!(to = %to, "SMS dispatched");
        Ok(())
    }
}

/// A delivered (or attempted) message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Email { to: String, subject: String, body: String },
    Sms { to: String, text: String },
}

impl Message {
    pub fn recipient(&self) -> &str {
        match self {
            Message::Email { to, .. } | Message::Sms { to, .. } => to,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Message::Email { body, .. } => body,
            Message::Sms { text, .. } => text,
        }
    }
}

/// Keeps every message; can be told to fail
#[derive(Debug, Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<Message>>,
    failing: bool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records messages but reports every delivery as failed
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<Message> {
        self.sent()
            .into_iter()
            .filter(|m| m.recipient() == recipient)
            .collect()
    }

    fn push(&self, message: Message) -> Result<(), NotifyError> {
        let recipient = message.recipient().to_string();
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message);
        if self.failing {
            return Err(NotifyError::Delivery {
                recipient,
                reason: "gateway unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.push(Message::Email {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        })
    }

    async fn send_sms(&self, to: &str, text: &str) -> Result<(), NotifyError> {
        self.push(Message::Sms {
            to: to.to_string(),
            text: text.to_string(),
        })
    }
}

/// Best-effort dispatcher used by handlers
#[derive(Clone)]
pub struct Notifier {
    gateway: Arc<dyn NotificationGateway>,
}

impl Notifier {
    pub fn new(gateway: Arc<dyn NotificationGateway>) -> Self {
        Self { gateway }
    }

    pub async fn email(&self, to: &str, subject: &str, body: &str) {
        if to.trim().is_empty() {
            return;
        }
        if let Err(e) = self.gateway.send_email(to, subject, body).await {
            tracing::warn!(subject = %subject, error = %e, "Email notification failed");
        }
    }

    pub async fn sms(&self, to: &str, text: &str) {
        if to.trim().is_empty() {
            return;
        }
        if let Err(e) = self.gateway.send_sms(to, text).await {
            tracing::warn!(error = %e, "SMS notification failed");
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let gateway = Arc::new(RecordingGateway::failing());
        let notifier = Notifier::new(gateway.clone());

        notifier.email("asha@example.com", "Deposit", "Credited 100.00").await;
        notifier.sms("9876543210", "Credited 100.00").await;

        assert_eq!(gateway.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_blank_recipient_skipped() {
        let gateway = Arc::new(RecordingGateway::new());
        let notifier = Notifier::new(gateway.clone());
        notifier.email("  ", "Deposit", "x").await;
        assert!(gateway.sent().is_empty());
    }
}
