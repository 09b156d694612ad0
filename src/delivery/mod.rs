//! Message delivery with a short, in-process retry.
//!
//! This retry only smooths over transport hiccups. A message that still cannot
//! be sent surfaces as a [`DeliveryError`] and the job it came from is retried
//! later through the queue.

mod smtp;

pub use lettre::message::Mailbox;
pub use smtp::SmtpTransport;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Fully rendered message.
#[derive(Debug, Clone)]
pub struct Message {
    pub from: Mailbox,
    pub to: Vec<Mailbox>,
    pub subject: String,
    /// `None` for text-only messages.
    pub html: Option<String>,
    pub text: String,
}

/// What the transport reported back for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub message_id: String,
    pub accepted: Vec<String>,
    /// Server reply, e.g. `250 2.0.0 Ok: queued`.
    pub response: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Anything the next hop reported or that went wrong on the way there:
    /// timeouts, refused connections, 4xx and 5xx replies.
    Transient,
    /// The message could not be handed over at all, e.g. it failed to build.
    /// Sending it again would fail the same way.
    Permanent,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn transient<M: fmt::Display>(message: M) -> Self {
        Self {
            kind: TransportErrorKind::Transient,
            message: message.to_string(),
        }
    }

    pub fn permanent<M: fmt::Display>(message: M) -> Self {
        Self {
            kind: TransportErrorKind::Permanent,
            message: message.to_string(),
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == TransportErrorKind::Permanent
    }
}

/// A single attempt at handing a message over to the next hop.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, message: &Message) -> Result<Receipt, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, message: &Message) -> Result<Receipt, TransportError> {
        (**self).send(message).await
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DeliveryError {
    /// Every attempt failed with a transient error.
    #[error("gave up after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// The message cannot be sent as built.
    #[error("message rejected: {source}")]
    Rejected {
        #[source]
        source: TransportError,
    },
}

impl DeliveryError {
    /// Whether redoing the whole job later has a chance to succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// How many times to try a send and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub backoff_cap: Duration,
}

impl Default for SendPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(200),
            backoff_cap: Duration::from_millis(5000),
        }
    }
}

impl SendPolicy {
    /// Pause after the 1-based `attempt` failed: `min(attempt * backoff, backoff_cap)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff
            .checked_mul(attempt)
            .map_or(self.backoff_cap, |d| d.min(self.backoff_cap))
    }
}

/// Sends messages through a [`Transport`] according to a [`SendPolicy`].
#[derive(Clone)]
pub struct DeliveryClient {
    transport: Arc<dyn Transport>,
    policy: SendPolicy,
}

impl fmt::Debug for DeliveryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl DeliveryClient {
    pub fn new<T: Transport>(transport: T, policy: SendPolicy) -> Self {
        Self {
            transport: Arc::new(transport),
            policy,
        }
    }

    pub fn policy(&self) -> &SendPolicy {
        &self.policy
    }

    /// Send `message`, retrying transient failures.
    ///
    /// There is no pause after the final attempt.
    pub async fn send(&self, message: &Message) -> Result<Receipt, DeliveryError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.transport.send(message).await {
                Ok(receipt) => {
                    tracing::debug!(message_id = %receipt.message_id, attempt, "message accepted");
                    return Ok(receipt);
                }
                Err(source) if source.is_permanent() => {
                    tracing::warn!(attempt, error = %source, "message rejected");
                    return Err(DeliveryError::Rejected { source });
                }
                Err(source) if attempt >= max_attempts => {
                    tracing::warn!(attempts = attempt, error = %source, "giving up on message");
                    return Err(DeliveryError::Exhausted {
                        attempts: attempt,
                        source,
                    });
                }
                Err(error) => {
                    let delay = self.policy.delay_after(attempt);
                    tracing::debug!(attempt, ?delay, error = %error, "send failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
