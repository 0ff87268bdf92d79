//! # Notification channel collaborator.
//!
//! Each outbound channel (console, email, chat, webhook) implements
//! [`NotifyChannel`]. The notification agent wraps every channel in its own
//! circuit breaker, so one dead transport never blocks the rest.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// A rendered, ready-to-send message.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Short subject line.
    pub subject: String,
    /// Rendered body.
    pub body: String,
}

/// Proof of acceptance by a channel.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    /// Channel-scoped receipt id.
    pub receipt: String,
}

/// Failure sending through a channel.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Transport rejected or timed out.
    #[error("send failed: {detail}")]
    SendFailed {
        /// Failure description.
        detail: String,
    },
}

/// One outbound notification transport.
#[async_trait]
pub trait NotifyChannel: Send + Sync + 'static {
    /// Stable channel name (used in delivery records and breaker logs).
    fn name(&self) -> &str;

    /// Sends one rendered message.
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, ChannelError>;
}

/// Channel that writes notifications to the process log.
pub struct ConsoleChannel;

#[async_trait]
impl NotifyChannel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, ChannelError> {
        info!(subject = %message.subject, body = %message.body, "maintenance notification");
        Ok(DeliveryReceipt {
            receipt: format!("console:{}", Uuid::new_v4()),
        })
    }
}

/// In-memory channel that records sends; failure is switchable.
///
/// Test/demo double for asserting fan-out and breaker behavior.
pub struct RecordingChannel {
    name: String,
    sent: Mutex<Vec<OutboundMessage>>,
    failing: AtomicBool,
}

impl RecordingChannel {
    /// Creates a healthy recording channel.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Switches the channel between healthy and failing.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Messages accepted so far, oldest first.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NotifyChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, ChannelError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChannelError::SendFailed {
                detail: "simulated outage".to_string(),
            });
        }
        self.sent.lock().push(message.clone());
        Ok(DeliveryReceipt {
            receipt: format!("{}:{}", self.name, self.sent.lock().len()),
        })
    }
}
