//! Broker transport abstractions.
//!
//! The bridge only needs a narrow slice of a broker client: open a producer
//! and a consumer, send payloads to a topic, subscribe to topics, pull the
//! next message, and disconnect.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     BrokerClient                            │
//! │  connect_producer(client) / connect_consumer(client, group) │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                   │
//!            ▼                                   ▼
//! ┌─────────────────────┐          ┌──────────────────────────────┐
//! │ Producer            │          │ Consumer                     │
//! │  send(topic, [..])  │          │  subscribe(topic, beginning) │
//! │  disconnect()       │          │  next_message() / disconnect │
//! └─────────────────────┘          └──────────────────────────────┘
//!            │                                   │
//!            ▼                                   ▼
//!  ┌────────────────┐               ┌─────────────────────────┐
//!  │ InMemoryBroker │               │ KafkaClient             │
//!  │  (included)    │               │  (feature = "kafka")    │
//!  └────────────────┘               └─────────────────────────┘
//! ```

mod in_memory;
#[cfg(feature = "kafka")]
mod kafka;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{ClientConfig, ConsumerConfig};

pub use in_memory::{InMemoryBroker, InMemoryConsumer, InMemoryProducer, Side};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaClient, KafkaConsumer, KafkaProducer};

/// A message as delivered by the broker: a topic and an opaque payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Error reported by a broker transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Could not reach the broker
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// The broker refused the request
    #[error("rejected by broker: {0}")]
    Rejected(String),
    /// The handle has been disconnected
    #[error("handle is closed")]
    Closed,
    /// A configured timeout elapsed
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Other(String),
}

/// Factory for producer and consumer handles against one broker cluster.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    type Producer: Producer + 'static;
    type Consumer: Consumer + 'static;

    async fn connect_producer(&self, client: &ClientConfig) -> Result<Self::Producer, TransportError>;

    async fn connect_consumer(
        &self,
        client: &ClientConfig,
        consumer: &ConsumerConfig,
    ) -> Result<Self::Consumer, TransportError>;
}

/// Sending half of a broker connection.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Send payloads to a topic, one broker message per payload.
    async fn send(&self, topic: &str, payloads: Vec<Vec<u8>>) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Receiving half of a broker connection.
///
/// Messages are pulled one at a time; a consumer never hands out a second
/// message before the first has been returned from `next_message`, which is
/// what keeps delivery order intact for each topic.
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn subscribe(&self, topic: &str, from_beginning: bool) -> Result<(), TransportError>;

    /// Wait for the next message.
    ///
    /// Returns `None` once the consumer is disconnected. Implementations
    /// must wake a pending call when `disconnect` runs.
    async fn next_message(&self) -> Option<Result<RawMessage, TransportError>>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Run a transport call, bounded by `limit` when one is configured.
pub(crate) async fn within<T, F>(limit: Option<Duration>, call: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(TransportError::Timeout(limit))),
        None => call.await,
    }
}
