//! Test domain: order events and a bridge wired to an in-memory broker.

use std::sync::{Arc, Once};
use std::time::Duration;

use event_bridge::transport::InMemoryBroker;
use event_bridge::{
    BridgeOptions, DomainEvent, EventBridge, LocalEventBus, SharedEvent, TopicRegistry,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Serialize, DomainEvent)]
pub struct OrderPlaced {
    pub order_id: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, DomainEvent)]
pub struct OrderCancelled {
    pub order_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, DomainEvent)]
pub struct Foo {
    pub id: String,
    pub amount: String,
}

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub struct Harness {
    pub broker: InMemoryBroker,
    pub bus: Arc<LocalEventBus>,
    pub bridge: Arc<EventBridge<InMemoryBroker>>,
    pub events: broadcast::Receiver<SharedEvent>,
}

pub fn harness(registry: TopicRegistry) -> Harness {
    harness_with(registry, BridgeOptions::default())
}

pub fn harness_with(registry: TopicRegistry, options: BridgeOptions) -> Harness {
    init_tracing();
    let broker = InMemoryBroker::new();
    let bus = Arc::new(LocalEventBus::new());
    let events = bus.subscribe();
    let bridge = EventBridge::builder(broker.clone(), bus.clone())
        .options(options)
        .events(registry)
        .build();
    Harness {
        broker,
        bus,
        bridge,
        events,
    }
}

pub fn orders() -> TopicRegistry {
    TopicRegistry::new()
        .event::<OrderPlaced>()
        .event::<OrderCancelled>()
}

/// Next event on the local stream, failing the test after one second.
pub async fn next_event(events: &mut broadcast::Receiver<SharedEvent>) -> SharedEvent {
    tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("no event within a second")
        .expect("event stream closed")
}

/// Assert nothing reaches the local stream for a short while.
pub async fn assert_quiet(events: &mut broadcast::Receiver<SharedEvent>) {
    let received = tokio::time::timeout(Duration::from_millis(50), events.recv()).await;
    assert!(received.is_err(), "unexpected event: {:?}", received);
}
