//! Error taxonomy for the bridge.
//!
//! Startup failures ([`ConnectionError`], [`SubscriptionError`]) surface to
//! the caller of `on_start` as a [`BridgeError`]. Steady-state failures
//! ([`DispatchError`], [`PublishError`]) are logged and absorbed by the
//! bridge; they are public so the lower-level components can be driven
//! directly.

use thiserror::Error;

use crate::event::{DecodeError, FieldError};
use crate::transport::TransportError;

/// Producer or consumer failed to connect.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("producer failed to connect: {0}")]
    Producer(#[source] TransportError),

    #[error("consumer failed to connect: {0}")]
    Consumer(#[source] TransportError),

    #[error("connection closed while starting")]
    Closed,
}

/// A topic subscribe request failed. Partial subscription is never kept.
#[derive(Debug, Error)]
#[error("failed to subscribe to topic `{topic}`: {source}")]
pub struct SubscriptionError {
    pub topic: String,
    #[source]
    pub source: TransportError,
}

/// Failure while turning one inbound message into a domain event.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The payload is not a UTF-8 JSON object.
    #[error("malformed payload on topic `{topic}`: {source}")]
    Decode {
        topic: String,
        #[source]
        source: DecodeError,
    },

    /// No binding is registered for the topic.
    #[error("event of type {topic} not handled")]
    Unrouted { topic: String },

    /// The bound factory could not build the event.
    #[error("failed to construct `{topic}` event: {source}")]
    Construct {
        topic: String,
        #[source]
        source: FieldError,
    },
}

impl DispatchError {
    pub fn topic(&self) -> &str {
        match self {
            DispatchError::Decode { topic, .. }
            | DispatchError::Unrouted { topic }
            | DispatchError::Construct { topic, .. } => topic,
        }
    }
}

/// Failure publishing an event to the broker.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize `{topic}` event: {source}")]
    Serialize {
        topic: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot publish `{topic}`: producer is not connected")]
    NotConnected { topic: &'static str },

    #[error("failed to send `{topic}` event: {source}")]
    Send {
        topic: &'static str,
        #[source]
        source: TransportError,
    },
}

/// Invalid bridge configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid bridge options: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Startup failure returned by `EventBridge::on_start`.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrouted_message_matches_log_line() {
        let err = DispatchError::Unrouted {
            topic: "OrderShipped".into(),
        };
        assert_eq!(err.to_string(), "event of type OrderShipped not handled");
        assert_eq!(err.topic(), "OrderShipped");
    }

    #[test]
    fn bridge_error_is_transparent() {
        let err: BridgeError = SubscriptionError {
            topic: "Foo".into(),
            source: TransportError::Rejected("unknown topic".into()),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "failed to subscribe to topic `Foo`: rejected by broker: unknown topic"
        );
    }
}
