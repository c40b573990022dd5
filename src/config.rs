//! Bridge configuration.
//!
//! Callers supply partial overrides ([`ClientOptions`], [`ConsumerOptions`],
//! [`DispatchOptions`]); every field left out falls back to the defaults
//! below and every field that is set wins. The merge is shallow: a
//! `brokers` override replaces the whole default list.

use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Broker endpoint used when none is configured.
pub const DEFAULT_BROKER: &str = "localhost:9092";

/// Client id reported to the broker.
pub const DEFAULT_CLIENT_ID: &str = "event-bridge";

/// Consumer group shared by every bridge instance of a service.
pub const DEFAULT_GROUP_ID: &str = "event-bridge-consumer";

/// Resolved broker client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub client_id: String,
    pub brokers: Vec<String>,
    /// `None` waits for the transport indefinitely.
    pub connect_timeout: Option<Duration>,
    pub send_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            brokers: vec![DEFAULT_BROKER.to_string()],
            connect_timeout: None,
            send_timeout: None,
        }
    }
}

/// Resolved consumer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    pub group_id: String,
    /// Replay retained messages on subscribe. The bridge only cares about
    /// events raised after it starts, so this stays `false` by default.
    pub from_beginning: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group_id: DEFAULT_GROUP_ID.to_string(),
            from_beginning: false,
        }
    }
}

/// What the consumption loop does after a message fails to decode or
/// construct. Unrouted topics are never fatal under either policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnMessageError {
    /// Log, drop the message, keep consuming.
    #[default]
    Continue,
    /// Log and end the consumption loop.
    Halt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchConfig {
    pub on_error: OnMessageError,
}

/// Partial broker client settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    pub client_id: Option<String>,
    pub brokers: Option<Vec<String>>,
    pub connect_timeout_ms: Option<u64>,
    pub send_timeout_ms: Option<u64>,
}

impl ClientOptions {
    pub fn resolve(&self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            client_id: self.client_id.clone().unwrap_or(defaults.client_id),
            brokers: self.brokers.clone().unwrap_or(defaults.brokers),
            connect_timeout: self
                .connect_timeout_ms
                .map(Duration::from_millis)
                .or(defaults.connect_timeout),
            send_timeout: self
                .send_timeout_ms
                .map(Duration::from_millis)
                .or(defaults.send_timeout),
        }
    }
}

/// Partial consumer settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConsumerOptions {
    pub group_id: Option<String>,
    pub from_beginning: Option<bool>,
}

impl ConsumerOptions {
    pub fn resolve(&self) -> ConsumerConfig {
        let defaults = ConsumerConfig::default();
        ConsumerConfig {
            group_id: self.group_id.clone().unwrap_or(defaults.group_id),
            from_beginning: self.from_beginning.unwrap_or(defaults.from_beginning),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchOptions {
    pub on_error: Option<OnMessageError>,
}

impl DispatchOptions {
    pub fn resolve(&self) -> DispatchConfig {
        DispatchConfig {
            on_error: self.on_error.unwrap_or_default(),
        }
    }
}

/// Everything a bridge can be configured with, apart from its bindings.
///
/// ```
/// use event_bridge::BridgeOptions;
///
/// let options = BridgeOptions::from_json(r#"{
///     "client": { "brokers": ["kafka-1:9092", "kafka-2:9092"] },
///     "consumer": { "group_id": "billing" }
/// }"#).unwrap();
///
/// assert_eq!(options.client.resolve().brokers.len(), 2);
/// assert_eq!(options.client.resolve().client_id, "event-bridge");
/// assert_eq!(options.consumer.resolve().group_id, "billing");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    pub client: ClientOptions,
    pub consumer: ConsumerOptions,
    pub dispatch: DispatchOptions,
}

impl BridgeOptions {
    /// Parse options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Create options from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `EVENT_BRIDGE_BROKERS`: comma separated endpoints (default: localhost:9092)
    /// - `EVENT_BRIDGE_CLIENT_ID`: client id (default: event-bridge)
    /// - `EVENT_BRIDGE_GROUP_ID`: consumer group (default: event-bridge-consumer)
    /// - `EVENT_BRIDGE_CONNECT_TIMEOUT_MS`: connect timeout (default: none)
    /// - `EVENT_BRIDGE_SEND_TIMEOUT_MS`: send timeout (default: none)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let brokers = lookup("EVENT_BRIDGE_BROKERS").map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|endpoint| !endpoint.is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        });
        if matches!(&brokers, Some(list) if list.is_empty()) {
            return Err(ConfigError::Invalid {
                key: "EVENT_BRIDGE_BROKERS",
                reason: "no broker endpoints listed".to_string(),
            });
        }

        Ok(Self {
            client: ClientOptions {
                client_id: lookup("EVENT_BRIDGE_CLIENT_ID"),
                brokers,
                connect_timeout_ms: parse_millis(&lookup, "EVENT_BRIDGE_CONNECT_TIMEOUT_MS")?,
                send_timeout_ms: parse_millis(&lookup, "EVENT_BRIDGE_SEND_TIMEOUT_MS")?,
            },
            consumer: ConsumerOptions {
                group_id: lookup("EVENT_BRIDGE_GROUP_ID"),
                from_beginning: None,
            },
            dispatch: DispatchOptions::default(),
        })
    }
}

fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u64>, ConfigError> {
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            })
        })
        .transpose()
}
