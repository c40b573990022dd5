//! The local event stream the bridge feeds.
//!
//! [`EventSink`] is the single ordered injection point inbound events are
//! pushed into. [`LocalEventBus`] is the in-process implementation: an
//! ordered broadcast to handlers, plus one optional outbound publisher slot
//! that lets events raised anywhere in the application flow out through
//! the bridge.
//!
//! ```text
//!  application ── publish() ──► LocalEventBus ── publisher slot ──► EventBridge ──► broker
//!                                    │
//!                                    ├──► subscribe() receivers (handlers)
//!                                    ▲
//!  broker ──► InboundDispatcher ── next()
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::event::SharedEvent;
use crate::publisher::EventPublisher;

/// Events buffered per handler before a slow handler starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Ordered injection point for reconstructed events.
pub trait EventSink: Send + Sync {
    fn next(&self, event: SharedEvent);
}

impl EventSink for mpsc::UnboundedSender<SharedEvent> {
    fn next(&self, event: SharedEvent) {
        if let Err(err) = self.send(event) {
            warn!(event_type = err.0.type_name(), "event sink closed, event dropped");
        }
    }
}

/// In-process event stream with an optional outbound publisher.
pub struct LocalEventBus {
    sender: broadcast::Sender<SharedEvent>,
    publisher: RwLock<Option<Arc<dyn EventPublisher>>>,
    injected: AtomicU64,
}

impl LocalEventBus {
    /// Create a new bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            publisher: RwLock::new(None),
            injected: AtomicU64::new(0),
        }
    }

    /// Receive every event injected from now on, in injection order.
    pub fn subscribe(&self) -> broadcast::Receiver<SharedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total events injected into the stream.
    pub fn events_injected(&self) -> u64 {
        self.injected.load(Ordering::Relaxed)
    }

    /// Install the outbound publisher, replacing any previous one.
    pub fn set_publisher(&self, publisher: Arc<dyn EventPublisher>) {
        *self.publisher.write().unwrap_or_else(PoisonError::into_inner) = Some(publisher);
    }

    /// Remove the outbound publisher; `publish` goes back to local delivery.
    pub fn clear_publisher(&self) -> Option<Arc<dyn EventPublisher>> {
        self.publisher
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn has_publisher(&self) -> bool {
        self.publisher
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Raise an event from application code.
    ///
    /// Goes through the installed publisher when there is one; otherwise
    /// the event is delivered to local handlers directly.
    pub async fn publish(&self, event: SharedEvent) {
        let publisher = self
            .publisher
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match publisher {
            Some(publisher) => publisher.publish(event).await,
            None => self.next(event),
        }
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LocalEventBus {
    fn next(&self, event: SharedEvent) {
        self.injected.fetch_add(1, Ordering::Relaxed);
        let event_type = event.type_name();
        match self.sender.send(event) {
            Ok(receivers) => debug!(event_type, receivers, "event injected"),
            Err(_) => debug!(event_type, "event injected with no local handlers"),
        }
    }
}

/// Swappable handle onto the sink the dispatcher writes into.
///
/// The dispatcher only ever writes through the current sink; rebinding
/// swaps the reference without touching the sink's contents.
#[derive(Clone)]
pub struct SinkHandle {
    current: Arc<RwLock<Arc<dyn EventSink>>>,
}

impl SinkHandle {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            current: Arc::new(RwLock::new(sink)),
        }
    }

    pub fn current(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn replace(&self, sink: Arc<dyn EventSink>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = sink;
    }
}
