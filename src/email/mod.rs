//! Outbound email: invitation links, reset links and account notices.
//!
//! Delivery is best effort. The originating request has already committed by
//! the time a message is handed to [`EmailDispatcher`], so failures and
//! timeouts are logged and never bubble up.

mod smtp;
pub mod templates;

pub use smtp::{SmtpMailer, SmtpSettings};

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid address: {0}")]
    Address(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to send email: {0}")]
    Transport(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

// Bodies carry single-use links, keep them out of logs.
impl std::fmt::Debug for EmailMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailMessage")
            .field("to", &self.to)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, message: &EmailMessage) -> Result<(), DeliveryError>;
}

/// Development sink: records that a message would have been sent.
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn deliver(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        info!(to = %message.to, subject = %message.subject, "Email delivery stub");
        Ok(())
    }
}

#[derive(Clone)]
pub struct EmailDispatcher {
    mailer: Arc<dyn Mailer>,
    timeout: Duration,
}

impl EmailDispatcher {
    #[must_use]
    pub fn new(mailer: Arc<dyn Mailer>, timeout: Duration) -> Self {
        Self { mailer, timeout }
    }

    /// Send in the background, bounded by the configured timeout.
    pub fn dispatch(&self, message: EmailMessage) -> JoinHandle<()> {
        let mailer = Arc::clone(&self.mailer);
        let limit = self.timeout;
        let span = tracing::info_span!("email.dispatch", email.subject = %message.subject);
        tokio::spawn(
            async move {
                match tokio::time::timeout(limit, mailer.deliver(&message)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => error!(to = %message.to, "Email delivery failed: {err}"),
                    Err(_) => error!(to = %message.to, "Email delivery timed out after {limit:?}"),
                }
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{DeliveryError, EmailMessage, Mailer};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// Forwards every delivered message to a channel.
    pub(crate) struct RecordingMailer {
        sender: mpsc::UnboundedSender<EmailMessage>,
    }

    impl RecordingMailer {
        pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<EmailMessage>) {
            let (sender, receiver) = mpsc::unbounded_channel();
            (Self { sender }, receiver)
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn deliver(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
            self.sender
                .send(message.clone())
                .map_err(|err| DeliveryError::Transport(err.to_string()))
        }
    }
}
