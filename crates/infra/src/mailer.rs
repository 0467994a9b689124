//! Outgoing e-mail.
//!
//! Only a logging transport exists; messages are kept in an outbox so jobs
//! and receipts can be asserted on in tests.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MailerError {
    #[error("mail transport failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sender address stamped on outgoing messages.
    fn from_address(&self) -> &str;

    async fn send(&self, message: MailMessage) -> Result<(), MailerError>;
}

#[derive(Debug)]
pub struct LogMailer {
    from: String,
    outbox: Mutex<Vec<MailMessage>>,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            outbox: Mutex::new(Vec::new()),
        }
    }

    /// Everything sent so far, oldest first.
    pub fn sent(&self) -> Vec<MailMessage> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    fn from_address(&self) -> &str {
        &self.from
    }

    async fn send(&self, message: MailMessage) -> Result<(), MailerError> {
        info!(to = %message.to, subject = %message.subject, "mail sent");
        self.outbox
            .lock()
            .map_err(|_| MailerError::Transport("outbox lock poisoned".to_string()))?
            .push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sent_messages_land_in_the_outbox() {
        let mailer = LogMailer::new("no-reply@spa.test");
        mailer
            .send(MailMessage {
                from: mailer.from_address().to_string(),
                to: "guest@spa.test".to_string(),
                subject: "Happy birthday".to_string(),
                body: "See you soon".to_string(),
            })
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, "no-reply@spa.test");
    }
}
