//! Outbound publisher: domain event → one broker message on its own topic.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::PublishError;
use crate::event::{DomainEvent, SharedEvent};
use crate::transport::{within, Producer};

/// Capability to publish events raised by the application.
///
/// Installed into [`LocalEventBus`](crate::LocalEventBus)'s publisher slot
/// so that events raised anywhere in the process flow out through it.
/// Delivery is fire-and-forget: failures are reported by the implementor,
/// never returned.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: SharedEvent);
}

/// Serializes an event and sends it to the topic named after its type.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutboundPublisher {
    send_timeout: Option<Duration>,
}

impl OutboundPublisher {
    pub fn new(send_timeout: Option<Duration>) -> Self {
        Self { send_timeout }
    }

    /// Publish `event` through `producer`.
    ///
    /// An absent event is ignored: nothing is sent and `Ok(None)` is
    /// returned. Otherwise exactly one message is sent and the topic it
    /// went to is returned.
    pub async fn publish<P>(
        &self,
        producer: Option<&P>,
        event: Option<&dyn DomainEvent>,
    ) -> Result<Option<&'static str>, PublishError>
    where
        P: Producer + ?Sized,
    {
        let Some(event) = event else {
            debug!("no event to publish");
            return Ok(None);
        };

        let topic = event.type_name();
        let payload = event
            .to_payload()
            .map_err(|source| PublishError::Serialize { topic, source })?;
        let producer = producer.ok_or(PublishError::NotConnected { topic })?;

        within(self.send_timeout, producer.send(topic, vec![payload]))
            .await
            .map_err(|source| PublishError::Send { topic, source })?;
        debug!(topic, "event published");
        Ok(Some(topic))
    }
}
