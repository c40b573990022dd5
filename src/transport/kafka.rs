//! Apache Kafka transport built on `rdkafka` (requires librdkafka).

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig as KafkaConfig;
use rdkafka::consumer::{Consumer as _, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message as _;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::util::Timeout;
use tokio::sync::watch;
use tracing::debug;

use super::{BrokerClient, Consumer, Producer, RawMessage, TransportError};
use crate::config::{ClientConfig, ConsumerConfig};

/// Upper bound on flushing queued messages when the producer disconnects.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Metadata round-trip used to confirm a connection when no connect
/// timeout is configured.
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Kafka client; creates rdkafka producers and stream consumers.
#[derive(Debug, Clone, Copy, Default)]
pub struct KafkaClient;

impl KafkaClient {
    pub fn new() -> Self {
        Self
    }
}

fn base_config(client: &ClientConfig) -> KafkaConfig {
    let mut config = KafkaConfig::new();
    config
        .set("bootstrap.servers", client.brokers.join(","))
        .set("client.id", &client.client_id);
    config
}

fn connection_error(err: KafkaError) -> TransportError {
    TransportError::ConnectionFailed(err.to_string())
}

/// rdkafka clients connect lazily; a blocking metadata request is the
/// first point the cluster has to answer.
async fn confirm_reachable<F>(fetch: F) -> Result<(), TransportError>
where
    F: FnOnce() -> Result<(), KafkaError> + Send + 'static,
{
    tokio::task::spawn_blocking(fetch)
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?
        .map_err(connection_error)
}

#[async_trait]
impl BrokerClient for KafkaClient {
    type Producer = KafkaProducer;
    type Consumer = KafkaConsumer;

    async fn connect_producer(&self, client: &ClientConfig) -> Result<KafkaProducer, TransportError> {
        let producer: FutureProducer = base_config(client).create().map_err(connection_error)?;
        let timeout = client.connect_timeout.unwrap_or(METADATA_TIMEOUT);
        let handle = producer.clone();
        confirm_reachable(move || {
            handle.client().fetch_metadata(None, timeout).map(|_| ())
        })
        .await?;
        debug!(brokers = ?client.brokers, "kafka producer connected");
        Ok(KafkaProducer {
            producer,
            send_timeout: client.send_timeout,
        })
    }

    async fn connect_consumer(
        &self,
        client: &ClientConfig,
        consumer: &ConsumerConfig,
    ) -> Result<KafkaConsumer, TransportError> {
        let offset_reset = if consumer.from_beginning {
            "earliest"
        } else {
            "latest"
        };
        let stream: StreamConsumer = base_config(client)
            .set("group.id", &consumer.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", offset_reset)
            .create()
            .map_err(connection_error)?;
        let stream = Arc::new(stream);
        let timeout = client.connect_timeout.unwrap_or(METADATA_TIMEOUT);
        let handle = Arc::clone(&stream);
        confirm_reachable(move || handle.fetch_metadata(None, timeout).map(|_| ())).await?;
        debug!(group_id = %consumer.group_id, "kafka consumer connected");

        let (closed, _) = watch::channel(false);
        Ok(KafkaConsumer {
            consumer: stream,
            topics: Mutex::new(Vec::new()),
            closed,
        })
    }
}

pub struct KafkaProducer {
    producer: FutureProducer,
    send_timeout: Option<Duration>,
}

#[async_trait]
impl Producer for KafkaProducer {
    async fn send(&self, topic: &str, payloads: Vec<Vec<u8>>) -> Result<(), TransportError> {
        let timeout = match self.send_timeout {
            Some(limit) => Timeout::After(limit),
            None => Timeout::Never,
        };
        for payload in &payloads {
            let record: FutureRecord<'_, (), Vec<u8>> = FutureRecord::to(topic).payload(payload);
            self.producer
                .send(record, timeout)
                .await
                .map_err(|(err, _)| TransportError::Rejected(err.to_string()))?;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.producer
            .flush(Timeout::After(FLUSH_TIMEOUT))
            .map_err(|err| TransportError::Other(err.to_string()))
    }
}

pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
    /// rdkafka replaces the subscription set on every call, so the full
    /// list is re-sent each time a topic is added.
    topics: Mutex<Vec<String>>,
    closed: watch::Sender<bool>,
}

#[async_trait]
impl Consumer for KafkaConsumer {
    async fn subscribe(&self, topic: &str, _from_beginning: bool) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed);
        }
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        if !topics.iter().any(|known| known == topic) {
            topics.push(topic.to_string());
        }
        let names: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer
            .subscribe(&names)
            .map_err(|err| TransportError::Rejected(err.to_string()))
    }

    async fn next_message(&self) -> Option<Result<RawMessage, TransportError>> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return None;
        }
        tokio::select! {
            _ = closed.changed() => None,
            received = self.consumer.recv() => Some(
                received
                    .map(|message| {
                        RawMessage::new(message.topic(), message.payload().unwrap_or_default())
                    })
                    .map_err(|err| TransportError::Other(err.to_string())),
            ),
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.closed.send_replace(true);
        self.consumer.unsubscribe();
        Ok(())
    }
}
