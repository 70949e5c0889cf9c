//! Outgoing mail hand-off
//!
//! Delivery itself lives outside this service. Handlers pass the message to a
//! [`Mailer`] on a tracked background task and only log failures.

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver the activation token for a freshly registered account
    async fn send_activation(&self, email: &str, user_id: i64, token: &str)
    -> Result<(), MailError>;
}

/// Records the hand-off in the log and drops the message
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_activation(
        &self,
        email: &str,
        user_id: i64,
        _token: &str,
    ) -> Result<(), MailError> {
        info!(user_id, email, "Activation mail handed off");
        Ok(())
    }
}

/// A message captured by [`MemoryMailer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub email: String,
    pub user_id: i64,
    pub token: String,
}

/// Keeps every message in memory
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().clone()
    }

    /// Most recent message addressed to `email`
    pub fn last_to(&self, email: &str) -> Option<SentMail> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|m| m.email == email)
            .cloned()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send_activation(
        &self,
        email: &str,
        user_id: i64,
        token: &str,
    ) -> Result<(), MailError> {
        self.sent.lock().push(SentMail {
            email: email.to_string(),
            user_id,
            token: token.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_mailer_keeps_latest() {
        let mailer = MemoryMailer::new();
        mailer.send_activation("a@example.com", 1, "first").await.unwrap();
        mailer.send_activation("b@example.com", 2, "other").await.unwrap();
        mailer.send_activation("a@example.com", 1, "second").await.unwrap();

        assert_eq!(mailer.sent().len(), 3);
        assert_eq!(mailer.last_to("a@example.com").unwrap().token, "second");
        assert!(mailer.last_to("c@example.com").is_none());
    }
}
