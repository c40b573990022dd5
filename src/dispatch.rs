//! Inbound dispatcher: broker messages → typed events → local event stream.
//!
//! One consumption task per started bridge pulls messages one at a time,
//! so events reach the sink in broker delivery order for every topic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::try_join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{DispatchConfig, OnMessageError};
use crate::connection::{ConnectionState, StateCell};
use crate::error::{DispatchError, SubscriptionError};
use crate::event::{Record, SharedEvent};
use crate::registry::TopicRegistry;
use crate::stream::SinkHandle;
use crate::transport::{Consumer, RawMessage, TransportError};

/// Counters from the consumption loop, summed over every loop a
/// dispatcher has run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events reconstructed and pushed into the sink.
    pub dispatched: u64,
    /// Messages dropped because no binding matched their topic.
    pub unhandled: u64,
    /// Messages that failed to decode or construct.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    unhandled: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            unhandled: self.unhandled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Why a consumption loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchExit {
    /// The consumer was disconnected.
    Closed,
    /// A message failed under [`OnMessageError::Halt`].
    Halted { topic: String },
    /// The transport failed; the connection is marked disconnected.
    TransportFailed(TransportError),
    /// The task panicked or was cancelled.
    Aborted,
}

/// Rebuild the event carried by one message.
///
/// The topic is resolved before the payload is decoded, so a message on an
/// unrouted topic is reported as such whatever its payload holds.
pub fn dispatch_message(
    registry: &TopicRegistry,
    message: &RawMessage,
) -> Result<SharedEvent, DispatchError> {
    let binding = registry.resolve(&message.topic)?;
    let mut record = Record::from_slice(&message.payload).map_err(|source| DispatchError::Decode {
        topic: message.topic.clone(),
        source,
    })?;
    binding
        .construct(&mut record)
        .map_err(|source| DispatchError::Construct {
            topic: message.topic.clone(),
            source,
        })
}

/// Subscribes a consumer to every registered topic and feeds the sink.
#[derive(Clone)]
pub struct InboundDispatcher {
    registry: Arc<TopicRegistry>,
    sink: SinkHandle,
    config: DispatchConfig,
    counters: Arc<Counters>,
    connection: Option<StateCell>,
}

impl InboundDispatcher {
    pub fn new(registry: Arc<TopicRegistry>, sink: SinkHandle, config: DispatchConfig) -> Self {
        Self {
            registry,
            sink,
            config,
            counters: Arc::new(Counters::default()),
            connection: None,
        }
    }

    /// Mark `connection` disconnected when the transport fails mid-loop.
    pub(crate) fn with_connection_state(mut self, connection: StateCell) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    pub fn sink(&self) -> &SinkHandle {
        &self.sink
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Dispatch one message into the current sink, updating the counters.
    pub fn dispatch(&self, message: &RawMessage) -> Result<(), DispatchError> {
        match dispatch_message(&self.registry, message) {
            Ok(event) => {
                debug!(topic = %message.topic, "dispatching event");
                // Counted first so a handler that sees the event sees the count
                self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                self.sink.current().next(event);
                Ok(())
            }
            Err(e) => {
                let counter = match e {
                    DispatchError::Unrouted { .. } => &self.counters.unhandled,
                    _ => &self.counters.failed,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Subscribe to every registered topic, then spawn the consumption loop.
    ///
    /// With an empty registry nothing is subscribed and no loop is started.
    /// All subscribe requests run concurrently; if any fails, startup is
    /// aborted and the loop is never entered.
    pub async fn start_consuming<K>(
        &self,
        consumer: Arc<K>,
        from_beginning: bool,
    ) -> Result<Option<DispatchHandle>, SubscriptionError>
    where
        K: Consumer + 'static,
    {
        let topics = self.registry.topics();
        if topics.is_empty() {
            info!("no event handlers registered, not consuming");
            return Ok(None);
        }

        let subscriber = consumer.as_ref();
        try_join_all(topics.iter().copied().map(|topic| async move {
            subscriber
                .subscribe(topic, from_beginning)
                .await
                .map_err(|source| SubscriptionError {
                    topic: topic.to_string(),
                    source,
                })
        }))
        .await
        .map_err(|e| {
            error!(topic = %e.topic, error = %e.source, "subscription failed");
            e
        })?;
        info!(topics = ?topics, "subscribed to event topics");

        let dispatcher = self.clone();
        let task = tokio::spawn(async move { dispatcher.consume(consumer.as_ref()).await });
        Ok(Some(DispatchHandle {
            task,
            counters: Arc::clone(&self.counters),
        }))
    }

    async fn consume<K: Consumer>(&self, consumer: &K) -> DispatchExit {
        loop {
            let message = match consumer.next_message().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    error!(error = %e, "consumer failed, consumption stopped");
                    if let Some(connection) = &self.connection {
                        connection.set(ConnectionState::Disconnected);
                    }
                    return DispatchExit::TransportFailed(e);
                }
                None => {
                    debug!("consumer closed, consumption stopped");
                    return DispatchExit::Closed;
                }
            };

            match self.dispatch(&message) {
                Ok(()) => {}
                Err(e @ DispatchError::Unrouted { .. }) => {
                    warn!(topic = %message.topic, "{}", e);
                }
                Err(e) => {
                    error!(topic = %message.topic, error = %e, "failed to dispatch message");
                    if self.config.on_error == OnMessageError::Halt {
                        warn!(topic = %message.topic, "halting consumption after failed message");
                        return DispatchExit::Halted {
                            topic: message.topic,
                        };
                    }
                }
            }
        }
    }
}

/// Handle to a running consumption loop.
pub struct DispatchHandle {
    task: JoinHandle<DispatchExit>,
    counters: Arc<Counters>,
}

impl DispatchHandle {
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to end. Disconnect the consumer first or this
    /// waits for the next transport failure.
    pub async fn join(self) -> (DispatchExit, DispatchStats) {
        let exit = match self.task.await {
            Ok(exit) => exit,
            Err(e) => {
                error!(error = %e, "consumption task aborted");
                DispatchExit::Aborted
            }
        };
        (exit, self.counters.snapshot())
    }
}
