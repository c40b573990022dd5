//! In-memory broker for testing and single-process scenarios.
//!
//! This module provides a broker that lives inside the process and
//! implements the full transport contract, useful for:
//! - Unit and integration testing without a running cluster
//! - Single-process applications and demos
//! - Exercising failure paths through fault injection

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{BrokerClient, Consumer, Producer, RawMessage, TransportError};
use crate::config::{ClientConfig, ConsumerConfig};

/// Which half of a connection a fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Producer,
    Consumer,
}

/// In-memory broker.
///
/// Features:
/// - Cheap to clone; clones share one broker
/// - Every sent message is kept in an append-only log for inspection
/// - Each connected consumer receives new messages on the topics it is
///   subscribed to, in send order
/// - Faults can be armed to make connects, subscribes, sends or
///   disconnects fail
/// - Live consumer streams can be severed to simulate a lost cluster
///
/// Consumer groups are not modelled: every connected consumer sees every
/// message on its topics.
///
/// ## Example
///
/// ```
/// use event_bridge::transport::{BrokerClient, Consumer, InMemoryBroker, Producer};
/// use event_bridge::{ClientConfig, ConsumerConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let broker = InMemoryBroker::new();
/// let consumer = broker
///     .connect_consumer(&ClientConfig::default(), &ConsumerConfig::default())
///     .await
///     .unwrap();
/// consumer.subscribe("OrderPlaced", false).await.unwrap();
///
/// let producer = broker.connect_producer(&ClientConfig::default()).await.unwrap();
/// producer.send("OrderPlaced", vec![br#"{"id":"1"}"#.to_vec()]).await.unwrap();
///
/// let message = consumer.next_message().await.unwrap().unwrap();
/// assert_eq!(message.topic, "OrderPlaced");
/// assert_eq!(broker.messages_for("OrderPlaced").len(), 1);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerState>,
}

#[derive(Default)]
struct BrokerState {
    /// Every message ever sent
    log: RwLock<Vec<RawMessage>>,
    /// Connected consumers
    consumers: Mutex<Vec<ConsumerSlot>>,
    /// Every subscribe request with its `from_beginning` flag, in order
    subscriptions: Mutex<Vec<(String, bool)>>,
    faults: Mutex<Faults>,
    next_consumer_id: AtomicU64,
    open_producers: AtomicU64,
}

type Delivery = Result<RawMessage, TransportError>;

struct ConsumerSlot {
    id: u64,
    topics: HashSet<String>,
    sender: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct Faults {
    connect: HashSet<Side>,
    disconnect: HashSet<Side>,
    subscribe: HashSet<String>,
    send: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryBroker {
    /// Create a new in-memory broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all messages in the log.
    pub fn messages(&self) -> Vec<RawMessage> {
        self.inner
            .log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Find all messages sent to a topic.
    pub fn messages_for(&self, topic: &str) -> Vec<RawMessage> {
        self.inner
            .log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|message| message.topic == topic)
            .cloned()
            .collect()
    }

    /// Every subscribe request received so far, in call order.
    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.inner.subscriptions)
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    /// Every subscribe request as `(topic, from_beginning)`, in call order.
    pub fn subscription_requests(&self) -> Vec<(String, bool)> {
        lock(&self.inner.subscriptions).clone()
    }

    pub fn connected_consumers(&self) -> usize {
        lock(&self.inner.consumers).len()
    }

    pub fn connected_producers(&self) -> u64 {
        self.inner.open_producers.load(Ordering::SeqCst)
    }

    /// Deliver a message as if another service had produced it.
    pub fn deliver(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        self.append(RawMessage::new(topic, payload));
    }

    /// Make the next connects on `side` fail until cleared.
    pub fn fail_connect(&self, side: Side) {
        lock(&self.inner.faults).connect.insert(side);
    }

    /// Make disconnects on `side` fail until cleared.
    pub fn fail_disconnect(&self, side: Side) {
        lock(&self.inner.faults).disconnect.insert(side);
    }

    /// Make subscribe requests for `topic` fail until cleared.
    pub fn fail_subscribe(&self, topic: &str) {
        lock(&self.inner.faults).subscribe.insert(topic.to_string());
    }

    /// Make every send fail until cleared.
    pub fn fail_send(&self) {
        lock(&self.inner.faults).send = true;
    }

    /// Break the stream of every connected consumer: its next receive
    /// fails as if the cluster had gone away. The handles stay open.
    pub fn sever_consumers(&self) {
        for slot in lock(&self.inner.consumers).iter() {
            let _ = slot.sender.send(Err(TransportError::ConnectionFailed(
                "connection to broker lost".to_string(),
            )));
        }
    }

    /// Clear all armed faults.
    pub fn clear_faults(&self) {
        *lock(&self.inner.faults) = Faults::default();
    }

    /// Clear the log and subscription history (useful for test cleanup).
    pub fn clear(&self) {
        self.inner
            .log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        lock(&self.inner.subscriptions).clear();
    }

    fn append(&self, message: RawMessage) {
        self.inner
            .log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());

        let consumers = lock(&self.inner.consumers);
        for slot in consumers.iter().filter(|slot| slot.topics.contains(&message.topic)) {
            // A closed receiver means the consumer is mid-disconnect
            let _ = slot.sender.send(Ok(message.clone()));
        }
    }

    fn connect_fault(&self, side: Side) -> bool {
        lock(&self.inner.faults).connect.contains(&side)
    }

    fn disconnect_fault(&self, side: Side) -> bool {
        lock(&self.inner.faults).disconnect.contains(&side)
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    type Producer = InMemoryProducer;
    type Consumer = InMemoryConsumer;

    async fn connect_producer(&self, _client: &ClientConfig) -> Result<InMemoryProducer, TransportError> {
        if self.connect_fault(Side::Producer) {
            return Err(TransportError::ConnectionFailed(
                "producer connect refused".to_string(),
            ));
        }
        self.inner.open_producers.fetch_add(1, Ordering::SeqCst);
        Ok(InMemoryProducer {
            broker: self.clone(),
            open: AtomicBool::new(true),
        })
    }

    async fn connect_consumer(
        &self,
        _client: &ClientConfig,
        _consumer: &ConsumerConfig,
    ) -> Result<InMemoryConsumer, TransportError> {
        if self.connect_fault(Side::Consumer) {
            return Err(TransportError::ConnectionFailed(
                "consumer connect refused".to_string(),
            ));
        }

        let id = self.inner.next_consumer_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.inner.consumers).push(ConsumerSlot {
            id,
            topics: HashSet::new(),
            sender,
        });

        Ok(InMemoryConsumer {
            broker: self.clone(),
            id,
            receiver: tokio::sync::Mutex::new(receiver),
            open: AtomicBool::new(true),
        })
    }
}

/// Producer handle onto an [`InMemoryBroker`].
pub struct InMemoryProducer {
    broker: InMemoryBroker,
    open: AtomicBool,
}

#[async_trait]
impl Producer for InMemoryProducer {
    async fn send(&self, topic: &str, payloads: Vec<Vec<u8>>) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if lock(&self.broker.inner.faults).send {
            return Err(TransportError::Rejected(format!("send to {} refused", topic)));
        }
        for payload in payloads {
            self.broker.append(RawMessage::new(topic, payload));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if self.broker.disconnect_fault(Side::Producer) {
            return Err(TransportError::Other("producer disconnect failed".to_string()));
        }
        if self.open.swap(false, Ordering::SeqCst) {
            self.broker.inner.open_producers.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Consumer handle onto an [`InMemoryBroker`].
pub struct InMemoryConsumer {
    broker: InMemoryBroker,
    id: u64,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>,
    open: AtomicBool,
}

#[async_trait]
impl Consumer for InMemoryConsumer {
    async fn subscribe(&self, topic: &str, from_beginning: bool) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        lock(&self.broker.inner.subscriptions).push((topic.to_string(), from_beginning));
        if lock(&self.broker.inner.faults).subscribe.contains(topic) {
            return Err(TransportError::Rejected(format!("subscribe to {} refused", topic)));
        }

        let mut consumers = lock(&self.broker.inner.consumers);
        let Some(slot) = consumers.iter_mut().find(|slot| slot.id == self.id) else {
            return Err(TransportError::Closed);
        };
        if slot.topics.insert(topic.to_string()) && from_beginning {
            for message in self.broker.messages_for(topic) {
                let _ = slot.sender.send(Ok(message));
            }
        }
        Ok(())
    }

    async fn next_message(&self) -> Option<Result<RawMessage, TransportError>> {
        if !self.open.load(Ordering::SeqCst) {
            return None;
        }
        let delivery = self.receiver.lock().await.recv().await?;
        // Messages buffered before a disconnect are not handed out after it
        if !self.open.load(Ordering::SeqCst) {
            return None;
        }
        Some(delivery)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if self.broker.disconnect_fault(Side::Consumer) {
            return Err(TransportError::Other("consumer disconnect failed".to_string()));
        }
        self.open.store(false, Ordering::SeqCst);
        // Dropping the sender wakes a pending next_message with None
        lock(&self.broker.inner.consumers).retain(|slot| slot.id != self.id);
        Ok(())
    }
}
