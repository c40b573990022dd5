//! Topic registry: topic name → factory that rebuilds the typed event.
//!
//! Bindings are collected before the bridge starts, from as many sources
//! as the caller likes (static configuration, explicit lists, other
//! registries). A later binding for the same topic replaces the earlier one.
//!
//! ## Example
//!
//! ```
//! use event_bridge::{DomainEvent, TopicRegistry};
//! use serde::Serialize;
//!
//! #[derive(Debug, Serialize, DomainEvent)]
//! struct OrderPlaced { id: String }
//!
//! #[derive(Debug, Serialize, DomainEvent)]
//! struct OrderCancelled { id: String }
//!
//! let registry = TopicRegistry::new()
//!     .event::<OrderPlaced>()
//!     .event::<OrderCancelled>();
//!
//! assert_eq!(registry.topics(), vec!["OrderCancelled", "OrderPlaced"]);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::DispatchError;
use crate::event::{EventType, FieldError, Record, SharedEvent};

type Factory = dyn Fn(&mut Record) -> Result<SharedEvent, FieldError> + Send + Sync;

/// A topic paired with the factory that reconstructs its event.
#[derive(Clone)]
pub struct TopicBinding {
    topic: String,
    fields: Vec<String>,
    factory: Arc<Factory>,
}

impl TopicBinding {
    /// Binding for a typed event: its type name, field order and constructor.
    pub fn of<E: EventType>() -> Self {
        Self {
            topic: E::TYPE_NAME.to_string(),
            fields: E::FIELDS.iter().map(|field| field.to_string()).collect(),
            factory: Arc::new(|record: &mut Record| {
                E::from_record(record).map(|event| Arc::new(event) as SharedEvent)
            }),
        }
    }

    /// Binding with a hand-written factory.
    pub fn new<F>(topic: impl Into<String>, fields: &[&str], factory: F) -> Self
    where
        F: Fn(&mut Record) -> Result<SharedEvent, FieldError> + Send + Sync + 'static,
    {
        Self {
            topic: topic.into(),
            fields: fields.iter().map(|field| field.to_string()).collect(),
            factory: Arc::new(factory),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Declared field order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Run the factory over a decoded payload.
    pub fn construct(&self, record: &mut Record) -> Result<SharedEvent, FieldError> {
        (self.factory)(record)
    }
}

impl fmt::Debug for TopicBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicBinding")
            .field("topic", &self.topic)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// Mapping from topic name to [`TopicBinding`], unique per topic.
#[derive(Clone, Debug, Default)]
pub struct TopicRegistry {
    bindings: HashMap<String, TopicBinding>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed event.
    ///
    /// Uses builder pattern — returns `self` for chaining.
    pub fn event<E: EventType>(mut self) -> Self {
        self.register::<E>();
        self
    }

    /// Register a typed event in place.
    pub fn register<E: EventType>(&mut self) -> &mut Self {
        self.insert(TopicBinding::of::<E>())
    }

    /// Register a hand-written factory for `topic`.
    pub fn register_factory<F>(&mut self, topic: &str, fields: &[&str], factory: F) -> &mut Self
    where
        F: Fn(&mut Record) -> Result<SharedEvent, FieldError> + Send + Sync + 'static,
    {
        self.insert(TopicBinding::new(topic, fields, factory))
    }

    /// Add a binding, replacing any existing binding for the same topic.
    pub fn insert(&mut self, binding: TopicBinding) -> &mut Self {
        self.bindings.insert(binding.topic.clone(), binding);
        self
    }

    /// Merge another registry into this one; its bindings win on conflict.
    pub fn register_all(&mut self, other: TopicRegistry) -> &mut Self {
        self.bindings.extend(other.bindings);
        self
    }

    /// Look up the binding for a topic.
    pub fn resolve(&self, topic: &str) -> Result<&TopicBinding, DispatchError> {
        self.bindings.get(topic).ok_or_else(|| DispatchError::Unrouted {
            topic: topic.to_string(),
        })
    }

    /// Registered topic names, sorted.
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.bindings.contains_key(topic)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Extend<TopicBinding> for TopicRegistry {
    fn extend<I: IntoIterator<Item = TopicBinding>>(&mut self, iter: I) {
        for binding in iter {
            self.insert(binding);
        }
    }
}

impl FromIterator<TopicBinding> for TopicRegistry {
    fn from_iter<I: IntoIterator<Item = TopicBinding>>(iter: I) -> Self {
        let mut registry = Self::new();
        registry.extend(iter);
        registry
    }
}
