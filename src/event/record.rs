use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Error decoding a raw payload into a [`Record`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("payload is a JSON {found}, expected an object")]
    NotAnObject { found: &'static str },
}

/// Error pulling a declared field out of a [`Record`].
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("field `{field}` (position {index}) is missing from the payload")]
    Missing { field: String, index: usize },

    #[error("field `{field}` has an unexpected shape: {source}")]
    Invalid {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Rejected(String),
}

/// A decoded message payload: a JSON object with its keys in wire order.
///
/// Factories pull values out with [`take`](Record::take) by declared
/// position: the field declared at index *i* receives the *i*-th value in
/// wire order, whatever key it was sent under. Keys are kept for
/// inspection only.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Vec<(String, Option<Value>)>,
}

impl Record {
    /// Decode a UTF-8 JSON object.
    pub fn from_slice(payload: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(payload)?;
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Wrap an already-parsed JSON value. Must be an object.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Object(map) => Ok(Self {
                fields: map.into_iter().map(|(key, value)| (key, Some(value))).collect(),
            }),
            other => Err(DecodeError::NotAnObject {
                found: json_kind(&other),
            }),
        }
    }

    /// Take the value at wire position `index` for the field declared
    /// there as `name`. The name only labels errors.
    pub fn take<T: DeserializeOwned>(&mut self, index: usize, name: &str) -> Result<T, FieldError> {
        let value = self
            .fields
            .get_mut(index)
            .and_then(|(_, value)| value.take())
            .ok_or_else(|| missing(name, index))?;

        serde_json::from_value(value).map_err(|source| FieldError::Invalid {
            field: name.to_string(),
            source,
        })
    }

    /// Peek at a value by key without consuming it.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.as_ref())
    }

    /// Keys in wire order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    /// Values still present, in wire order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().filter_map(|(_, value)| value.as_ref())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn missing(name: &str, index: usize) -> FieldError {
    FieldError::Missing {
        field: name.to_string(),
        index,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
