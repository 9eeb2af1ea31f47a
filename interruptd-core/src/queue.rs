//! Interruption queue collaborator

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from the queue transport
#[derive(Debug, Error)]
pub enum QueueError {
    /// Receiving a batch failed
    #[error("receiving messages from queue {queue}: {reason}")]
    Receive { queue: String, reason: String },

    /// Deleting a message failed
    #[error("deleting message {id} from queue {queue}: {reason}")]
    Delete {
        queue: String,
        id: String,
        reason: String,
    },
}

/// A message as delivered by the queue
#[derive(Debug, Clone, PartialEq)]
pub struct RawQueueMessage {
    /// Message identifier assigned by the queue
    pub id: String,
    /// Handle used to acknowledge (delete) this delivery
    pub receipt_handle: String,
    /// Raw payload, absent for empty deliveries
    pub body: Option<String>,
    /// When the queue handed the message to us
    pub received_at: DateTime<Utc>,
}

impl RawQueueMessage {
    /// A message whose receipt handle is its id
    pub fn new(id: impl Into<String>, body: Option<String>) -> Self {
        let id = id.into();
        Self {
            receipt_handle: id.clone(),
            id,
            body,
            received_at: Utc::now(),
        }
    }
}

/// Queue transport used by the controller
#[async_trait]
pub trait QueueProvider: Send + Sync {
    /// Queue name, for logging
    fn name(&self) -> &str;

    /// Fetch a batch of messages. Bounded poll, may return an empty batch.
    async fn receive(&self) -> Result<Vec<RawQueueMessage>, QueueError>;

    /// Acknowledge a delivery so it is not redelivered
    async fn delete(&self, message: &RawQueueMessage) -> Result<(), QueueError>;
}
