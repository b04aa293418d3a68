//! Message broker seam (queue send/receive with peek-lock settlement).
//!
//! Delivery is at-least-once. A received message stays locked until the
//! consumer settles it: `complete` removes it, `abandon` makes it deliverable
//! again. Redelivery limits and dead-lettering are the adapter's job; callers
//! hold no retry logic.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod in_memory;
pub mod redis_streams;

pub use in_memory::InMemoryQueue;
pub use redis_streams::RedisStreamsQueue;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A message as handed to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub message_id: String,
    /// Routing tag; for integration events, the event type name.
    pub subject: String,
    pub content_type: String,
    pub correlation_id: Option<String>,
    pub application_properties: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl BrokerMessage {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.application_properties.get(key).map(String::as_str)
    }
}

/// A locked message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message: BrokerMessage,
    /// Opaque handle used to settle this delivery.
    pub lock_token: String,
    /// 1 on first delivery.
    pub delivery_count: u32,
}

/// Dead-lettered message plus the reason it was parked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub message: BrokerMessage,
    pub delivery_count: u32,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection error: {0}")]
    Connection(String),

    #[error("broker command error: {0}")]
    Command(String),

    #[error("malformed broker entry {id}: {reason}")]
    Malformed { id: String, reason: String },

    #[error("unknown lock token {0}")]
    LockLost(String),
}

impl From<redis::RedisError> for BrokerError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
            BrokerError::Connection(err.to_string())
        } else {
            BrokerError::Command(err.to_string())
        }
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: BrokerMessage) -> BrokerResult<()>;
}

#[async_trait]
pub trait MessageReceiver: Send + Sync {
    /// Waits up to `wait` for at least one message, returning at most `max`.
    /// An empty batch means the wait elapsed.
    async fn receive(&self, max: usize, wait: Duration) -> BrokerResult<Vec<ReceivedMessage>>;

    async fn complete(&self, message: &ReceivedMessage) -> BrokerResult<()>;

    async fn abandon(&self, message: &ReceivedMessage) -> BrokerResult<()>;
}
