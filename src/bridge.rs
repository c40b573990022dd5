//! The bridge facade.
//!
//! [`EventBridge`] ties the connection manager, the inbound dispatcher and
//! the outbound publisher to one [`LocalEventBus`]. Application code only
//! sees the lifecycle hooks, `publish`, and `redirect_events_to`.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use event_bridge::{DomainEvent, EventBridge, LocalEventBus};
//! use event_bridge::transport::InMemoryBroker;
//! use serde::Serialize;
//!
//! #[derive(Debug, Serialize, DomainEvent)]
//! struct OrderPlaced { id: String }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let broker = InMemoryBroker::new();
//! let bus = Arc::new(LocalEventBus::new());
//! let bridge = EventBridge::builder(broker.clone(), bus.clone())
//!     .event::<OrderPlaced>()
//!     .build();
//!
//! bridge.on_start().await.unwrap();
//! bus.publish(Arc::new(OrderPlaced { id: "o-1".into() })).await;
//! assert_eq!(broker.messages_for("OrderPlaced").len(), 1);
//! bridge.on_stop().await;
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::BridgeOptions;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::dispatch::{DispatchHandle, DispatchStats, InboundDispatcher};
use crate::error::{BridgeError, ConnectionError, PublishError};
use crate::event::{DomainEvent, EventType, SharedEvent};
use crate::publisher::{EventPublisher, OutboundPublisher};
use crate::registry::TopicRegistry;
use crate::stream::{EventSink, LocalEventBus, SinkHandle};
use crate::transport::BrokerClient;

/// Builder for [`EventBridge`].
pub struct EventBridgeBuilder<C> {
    client: C,
    bus: Arc<LocalEventBus>,
    options: BridgeOptions,
    registry: TopicRegistry,
}

impl<C: BrokerClient + 'static> EventBridgeBuilder<C> {
    pub fn options(mut self, options: BridgeOptions) -> Self {
        self.options = options;
        self
    }

    /// Bind an event type to its topic.
    pub fn event<E: EventType>(mut self) -> Self {
        self.registry.register::<E>();
        self
    }

    /// Fold in a prepared set of bindings. Later bindings win per topic.
    pub fn events(mut self, registry: TopicRegistry) -> Self {
        self.registry.register_all(registry);
        self
    }

    pub fn build(self) -> Arc<EventBridge<C>> {
        let connection = ConnectionManager::new(
            self.client,
            self.options.client.resolve(),
            self.options.consumer.resolve(),
        );
        let sink = SinkHandle::new(self.bus.clone() as Arc<dyn EventSink>);
        let dispatcher = InboundDispatcher::new(
            Arc::new(self.registry),
            sink,
            self.options.dispatch.resolve(),
        )
        .with_connection_state(connection.state_cell());
        let publisher = OutboundPublisher::new(connection.client_config().send_timeout);

        Arc::new(EventBridge {
            connection,
            dispatcher,
            publisher,
            bus: self.bus,
            lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
        })
    }
}

#[derive(Default)]
struct Lifecycle {
    started: bool,
    consuming: Option<DispatchHandle>,
}

/// Bridge between a [`LocalEventBus`] and a topic-based broker.
pub struct EventBridge<C: BrokerClient> {
    connection: ConnectionManager<C>,
    dispatcher: InboundDispatcher,
    publisher: OutboundPublisher,
    bus: Arc<LocalEventBus>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
}

impl<C: BrokerClient + 'static> EventBridge<C> {
    pub fn builder(client: C, bus: Arc<LocalEventBus>) -> EventBridgeBuilder<C> {
        EventBridgeBuilder {
            client,
            bus,
            options: BridgeOptions::default(),
            registry: TopicRegistry::new(),
        }
    }

    /// Connect, subscribe to every bound topic, and install the bridge as
    /// the bus publisher.
    ///
    /// Does nothing if already started and connected. A bridge whose
    /// consumption loop lost the transport is started afresh: the old loop
    /// is reaped and the connection rebuilt. A subscription failure closes
    /// the connection again before the error is returned.
    pub async fn on_start(self: &Arc<Self>) -> Result<(), BridgeError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.started {
            if self.connection.state() == ConnectionState::Connected {
                debug!("event bridge already started");
                return Ok(());
            }
            warn!("broker connection lost, restarting event bridge");
            self.bus.clear_publisher();
            if let Some(handle) = lifecycle.consuming.take() {
                let (exit, _) = handle.join().await;
                debug!(?exit, "previous consumption loop finished");
            }
            lifecycle.started = false;
        }

        self.connection.start().await?;
        let consumer = self.connection.consumer().ok_or(ConnectionError::Closed)?;
        let from_beginning = self.connection.consumer_config().from_beginning;

        match self.dispatcher.start_consuming(consumer, from_beginning).await {
            Ok(handle) => lifecycle.consuming = handle,
            Err(e) => {
                self.connection.stop().await;
                return Err(e.into());
            }
        }

        self.bus.set_publisher(Arc::clone(self) as Arc<dyn EventPublisher>);
        lifecycle.started = true;
        info!(topics = ?self.topics(), "event bridge started");
        Ok(())
    }

    /// Uninstall the publisher, close the connection and wait for the
    /// consumption loop to finish. Safe before `on_start` and safe to repeat.
    pub async fn on_stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if !lifecycle.started {
            self.connection.stop().await;
            debug!("event bridge not started");
            return;
        }

        self.bus.clear_publisher();
        self.connection.stop().await;
        if let Some(handle) = lifecycle.consuming.take() {
            let (exit, stats) = handle.join().await;
            debug!(?exit, "consumption loop finished");
            info!(
                total_dispatched = stats.dispatched,
                total_unhandled = stats.unhandled,
                total_failed = stats.failed,
                "event bridge stopped, cumulative dispatch totals"
            );
        } else {
            info!("event bridge stopped");
        }
        lifecycle.started = false;
    }

    /// Publish an event to the broker. An absent event is ignored; send
    /// failures are logged and swallowed.
    pub async fn publish(&self, event: Option<&dyn DomainEvent>) {
        if let Err(e) = self.try_publish(event).await {
            warn!(error = %e, "failed to publish event");
        }
    }

    /// Like [`publish`](Self::publish), but hands the failure back.
    pub async fn try_publish(
        &self,
        event: Option<&dyn DomainEvent>,
    ) -> Result<Option<&'static str>, PublishError> {
        let producer = self.connection.producer();
        self.publisher.publish(producer.as_deref(), event).await
    }

    /// Send inbound events to `sink` from now on. Takes effect on the next
    /// message; consumption is not restarted.
    pub fn redirect_events_to(&self, sink: Arc<dyn EventSink>) {
        self.dispatcher.sink().replace(sink);
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Totals since the bridge was built. Restarting does not reset them.
    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Bound topics, sorted.
    pub fn topics(&self) -> Vec<&str> {
        self.dispatcher.registry().topics()
    }

    pub fn bus(&self) -> &Arc<LocalEventBus> {
        &self.bus
    }
}

#[async_trait]
impl<C: BrokerClient + 'static> EventPublisher for EventBridge<C> {
    async fn publish(&self, event: SharedEvent) {
        EventBridge::publish(self, Some(event.as_ref())).await;
    }
}
