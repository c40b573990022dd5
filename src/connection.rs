//! Broker connection manager.
//!
//! Owns one producer handle and one consumer handle against a broker
//! cluster. `start` and `stop` are serialized against each other; `stop`
//! is safe before `start` and safe to repeat.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::config::{ClientConfig, ConsumerConfig};
use crate::error::ConnectionError;
use crate::transport::{within, BrokerClient, Consumer, Producer};

/// Lifecycle state of a broker connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connection state shared with the consumption loop, which marks the
/// connection lost when the transport fails underneath it.
#[derive(Debug, Clone, Default)]
pub(crate) struct StateCell(Arc<Mutex<ConnectionState>>);

impl StateCell {
    pub(crate) fn get(&self) -> ConnectionState {
        *lock(&self.0)
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        *lock(&self.0) = state;
    }
}

struct Handles<C: BrokerClient> {
    producer: Option<Arc<C::Producer>>,
    consumer: Option<Arc<C::Consumer>>,
}

/// Producer and consumer lifecycle for one broker cluster.
pub struct ConnectionManager<C: BrokerClient> {
    client: C,
    client_config: ClientConfig,
    consumer_config: ConsumerConfig,
    lifecycle: tokio::sync::Mutex<()>,
    handles: Mutex<Handles<C>>,
    state: StateCell,
}

impl<C: BrokerClient> ConnectionManager<C> {
    pub fn new(client: C, client_config: ClientConfig, consumer_config: ConsumerConfig) -> Self {
        Self {
            client,
            client_config,
            consumer_config,
            lifecycle: tokio::sync::Mutex::new(()),
            handles: Mutex::new(Handles {
                producer: None,
                consumer: None,
            }),
            state: StateCell::default(),
        }
    }

    /// Open the producer, then the consumer.
    ///
    /// Does nothing while connected. Handles still held after the
    /// connection was marked lost are closed and replaced. If the consumer
    /// fails to connect the producer is closed again, so a failed start
    /// never leaves a half-open connection behind.
    pub async fn start(&self) -> Result<(), ConnectionError> {
        let _lifecycle = self.lifecycle.lock().await;
        let (stale_producer, stale_consumer) = {
            let mut handles = lock(&self.handles);
            if handles.producer.is_some() && self.state.get() == ConnectionState::Connected {
                debug!("broker connection already open");
                return Ok(());
            }
            (handles.producer.take(), handles.consumer.take())
        };
        if stale_producer.is_some() || stale_consumer.is_some() {
            warn!("broker connection was lost, reconnecting");
            Self::close(stale_producer, stale_consumer).await;
        }

        self.state.set(ConnectionState::Connecting);
        info!(
            brokers = ?self.client_config.brokers,
            client_id = %self.client_config.client_id,
            "connecting to broker"
        );

        let limit = self.client_config.connect_timeout;
        let producer = match within(limit, self.client.connect_producer(&self.client_config)).await {
            Ok(producer) => Arc::new(producer),
            Err(e) => {
                self.state.set(ConnectionState::Disconnected);
                error!(error = %e, "producer failed to connect");
                return Err(ConnectionError::Producer(e));
            }
        };

        let consumer = match within(
            limit,
            self.client
                .connect_consumer(&self.client_config, &self.consumer_config),
        )
        .await
        {
            Ok(consumer) => Arc::new(consumer),
            Err(e) => {
                error!(error = %e, group_id = %self.consumer_config.group_id, "consumer failed to connect");
                if let Err(close) = producer.disconnect().await {
                    warn!(error = %close, "producer failed to disconnect after aborted start");
                }
                self.state.set(ConnectionState::Disconnected);
                return Err(ConnectionError::Consumer(e));
            }
        };

        {
            let mut handles = lock(&self.handles);
            handles.producer = Some(producer);
            handles.consumer = Some(consumer);
        }
        self.state.set(ConnectionState::Connected);
        info!(group_id = %self.consumer_config.group_id, "connected to broker");
        Ok(())
    }

    /// Close both handles.
    ///
    /// Each handle is closed independently: a failure on one is logged and
    /// the other is still closed. Never fails.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let (producer, consumer) = {
            let mut handles = lock(&self.handles);
            (handles.producer.take(), handles.consumer.take())
        };

        if producer.is_none() && consumer.is_none() {
            debug!("broker connection not open, nothing to stop");
            self.state.set(ConnectionState::Disconnected);
            return;
        }

        Self::close(producer, consumer).await;
        self.state.set(ConnectionState::Disconnected);
        info!("disconnected from broker");
    }

    async fn close(producer: Option<Arc<C::Producer>>, consumer: Option<Arc<C::Consumer>>) {
        if let Some(producer) = producer {
            if let Err(e) = producer.disconnect().await {
                warn!(error = %e, "producer failed to disconnect");
            }
        }
        if let Some(consumer) = consumer {
            if let Err(e) = consumer.disconnect().await {
                warn!(error = %e, "consumer failed to disconnect");
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn producer(&self) -> Option<Arc<C::Producer>> {
        lock(&self.handles).producer.clone()
    }

    pub fn consumer(&self) -> Option<Arc<C::Consumer>> {
        lock(&self.handles).consumer.clone()
    }

    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    pub fn consumer_config(&self) -> &ConsumerConfig {
        &self.consumer_config
    }

    pub(crate) fn state_cell(&self) -> StateCell {
        self.state.clone()
    }
}
