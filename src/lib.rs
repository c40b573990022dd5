//! Bridge between an in-process event stream and a topic-based broker.
//!
//! Events raised locally are published to a topic named after their type;
//! events arriving on bound topics are rebuilt as typed values and injected
//! into the local stream in broker delivery order.

extern crate self as event_bridge;

mod bridge;
mod config;
mod connection;
mod dispatch;
mod error;
mod event;
mod publisher;
mod registry;
mod stream;
pub mod transport;

pub use bridge::{EventBridge, EventBridgeBuilder};
pub use config::{
    BridgeOptions, ClientConfig, ClientOptions, ConsumerConfig, ConsumerOptions, DispatchConfig,
    DispatchOptions, OnMessageError, DEFAULT_BROKER, DEFAULT_CLIENT_ID, DEFAULT_GROUP_ID,
};
pub use connection::{ConnectionManager, ConnectionState};
pub use dispatch::{dispatch_message, DispatchExit, DispatchHandle, DispatchStats, InboundDispatcher};
pub use error::{
    BridgeError, ConfigError, ConnectionError, DispatchError, PublishError, SubscriptionError,
};
pub use event::{
    encode_payload, DecodeError, DomainEvent, EventType, FieldError, Record, SharedEvent,
};
pub use publisher::{EventPublisher, OutboundPublisher};
pub use registry::{TopicBinding, TopicRegistry};
pub use stream::{EventSink, LocalEventBus, SinkHandle, DEFAULT_CHANNEL_CAPACITY};

// Derive macro for DomainEvent + EventType
pub use event_bridge_macros::DomainEvent;

#[doc(hidden)]
pub use serde_json;
