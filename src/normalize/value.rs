//! Raw payload tree produced by platform clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Marker key the platform gateway uses to encode opaque value wrappers
pub const OPAQUE_MARKER: &str = "$opaque";

/// Companion key holding the textual form of an opaque value
pub const OPAQUE_REPR: &str = "repr";

/// A platform payload node
///
/// Objects keep their fields in the order the platform sent them. Scalars that
/// are not plain JSON primitives (timestamps, byte blobs, client-specific
/// wrappers) have their own variants so the normalizer can coerce them.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(DateTime<Utc>),
    Bytes(Vec<u8>),
    Opaque { kind: String, repr: String },
    Array(Vec<RawValue>),
    Object(Vec<(String, RawValue)>),
}

impl RawValue {
    /// Builds an object node from key/value pairs
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, RawValue)>) -> Self {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns true for `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Looks up a field of an object node
    pub fn get(&self, key: &str) -> Option<&RawValue> {
        match self {
            Self::Object(fields) => fields.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::Str(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                if let Some(Value::String(kind)) = map.get(OPAQUE_MARKER) {
                    let repr = match map.get(OPAQUE_REPR) {
                        Some(Value::String(s)) => s.clone(),
                        Some(other) => other.to_string(),
                        None => String::new(),
                    };
                    return Self::Opaque {
                        kind: kind.clone(),
                        repr,
                    };
                }
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl<'de> Deserialize<'de> for RawValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from)
    }
}
