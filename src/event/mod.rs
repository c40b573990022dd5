//! Domain events as they travel through the bridge.
//!
//! Two traits split the concerns:
//!
//! - [`DomainEvent`] is object safe. Everything downstream of the broker
//!   (the local event stream, handlers, the outbound publisher) works with
//!   `Arc<dyn DomainEvent>` and recovers the concrete type with
//!   [`downcast_ref`](trait.DomainEvent.html#method.downcast_ref).
//! - [`EventType`] is the typed side: the topic name, the declared field
//!   order, and the constructor used to rebuild the event from a decoded
//!   payload. The topic registry captures it once per event type, so no
//!   runtime reflection is needed.
//!
//! Both are normally derived:
//!
//! ```
//! use event_bridge::{DomainEvent, EventType};
//! use serde::Serialize;
//!
//! #[derive(Debug, Serialize, DomainEvent)]
//! struct OrderPlaced {
//!     id: String,
//!     amount: String,
//! }
//!
//! assert_eq!(OrderPlaced::TYPE_NAME, "OrderPlaced");
//! assert_eq!(OrderPlaced::FIELDS, &["id", "amount"]);
//! ```

mod record;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

pub use record::{DecodeError, FieldError, Record};

/// A domain event shared between the bridge and in-process handlers.
pub type SharedEvent = Arc<dyn DomainEvent>;

/// Something that happened, identified by a stable type name.
///
/// The type name doubles as the broker topic, so it must be identical on
/// every service that produces or consumes the event (case-sensitive).
pub trait DomainEvent: Any + fmt::Debug + Send + Sync {
    /// Stable type name; used verbatim as the topic.
    fn type_name(&self) -> &'static str;

    /// Serialize every field into a JSON object, keys in declaration order.
    fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error>;

    fn as_any(&self) -> &dyn Any;
}

impl dyn DomainEvent {
    /// Returns `true` if the event is of concrete type `T`.
    pub fn is<T: DomainEvent>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Borrow the event as its concrete type.
    pub fn downcast_ref<T: DomainEvent>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// A domain event type that can be rebuilt from a decoded payload.
pub trait EventType: DomainEvent + Sized {
    /// Topic / type name. Matches [`DomainEvent::type_name`].
    const TYPE_NAME: &'static str;

    /// Field names in declaration order.
    const FIELDS: &'static [&'static str];

    /// Rebuild the event, pulling fields out of `record` in `FIELDS` order.
    fn from_record(record: &mut Record) -> Result<Self, FieldError>;
}

/// Encode an event as its JSON payload.
///
/// Used by the derived `to_payload`; a named struct serializes as an object
/// whose keys follow field declaration order.
pub fn encode_payload<T: Serialize + ?Sized>(event: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(event)
}
