//! Public value type and the record codec.
//!
//! Values cross the API as a tagged union; bucket files store the JSON
//! payload plus the inferred [`ValueType`]. Binary payloads are base64 text
//! on disk so bucket files stay valid JSON.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use super::record::ValueType;

/// A value accepted by and returned from the store.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Number(f64),
    Bytes(Vec<u8>),
    Array(Vec<serde_json::Value>),
    /// Catch-all for any other JSON shape, per the "otherwise object"
    /// inference rule. Usually a map.
    Object(serde_json::Value),
}

impl Value {
    /// Type inference on write: null maps to string, like the original
    /// wire format.
    pub fn infer_type(&self) -> ValueType {
        match self {
            Value::Null | Value::Text(_) => ValueType::String,
            Value::Number(_) => ValueType::Number,
            Value::Bytes(_) => ValueType::Binary,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Object,
        }
    }

    /// Payload as stored in the bucket file.
    pub fn encode(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bytes(b) => serde_json::Value::String(BASE64.encode(b)),
            Value::Array(items) => serde_json::Value::Array(items.clone()),
            Value::Object(v) => v.clone(),
        }
    }

    /// Decode a stored payload back into the public union. Binary is the
    /// only type with a real transform; everything else passes through.
    pub fn decode(value_type: ValueType, stored: &serde_json::Value) -> Value {
        match value_type {
            ValueType::Binary => match stored {
                serde_json::Value::String(s) => BASE64
                    .decode(s)
                    .map(Value::Bytes)
                    .unwrap_or_else(|_| Value::Text(s.clone())),
                other => Value::Object(other.clone()),
            },
            ValueType::String => match stored {
                serde_json::Value::Null => Value::Null,
                serde_json::Value::String(s) => Value::Text(s.clone()),
                other => Value::Object(other.clone()),
            },
            ValueType::Number => match stored.as_f64() {
                Some(n) => Value::Number(n),
                None => Value::Object(stored.clone()),
            },
            ValueType::Array => match stored {
                serde_json::Value::Array(items) => Value::Array(items.clone()),
                other => Value::Object(other.clone()),
            },
            ValueType::Object | ValueType::List => Value::Object(stored.clone()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<serde_json::Value> for Value {
    /// Inference by JSON shape; non-string, non-number, non-array shapes
    /// land in `Object`.
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::Array(items) => Value::Array(items),
            other => Value::Object(other),
        }
    }
}
