//! Payload normalization
//!
//! Converts arbitrarily nested platform payloads into store-safe JSON:
//! - field names rewritten to camel case (`_` discriminators become `type`)
//! - nested objects and arrays normalized with the same rules
//! - non-primitive scalars coerced to their string form
//!
//! The walk keeps an explicit stack, so deeply nested payloads cannot exhaust
//! the call stack.

mod key;
mod value;

pub use key::{canonical_key, DISCRIMINATOR_KEY, TYPE_KEY};
pub use value::{RawValue, OPAQUE_MARKER, OPAQUE_REPR};

use serde_json::{Map, Number, Value};
use std::slice;

/// Normalizes a raw payload into a store-safe JSON value
///
/// This function is total: any value that cannot be represented as a JSON
/// primitive degrades to its string representation instead of failing.
///
/// # Example
///
/// ```
/// use social_harvest::normalize::{normalize, RawValue};
/// use serde_json::json;
///
/// let raw = RawValue::object([
///     ("_", RawValue::Str("PeerUser".into())),
///     ("user_id", RawValue::Int(42)),
/// ]);
/// assert_eq!(normalize(&raw), json!({"type": "PeerUser", "userId": 42}));
/// ```
pub fn normalize(root: &RawValue) -> Value {
    let mut stack = match Opened::open(root, None) {
        Opened::Leaf(_, value) => return value,
        Opened::Nested(frame) => vec![frame],
    };

    loop {
        let step = match stack.last_mut() {
            Some(frame) => frame.next_child(),
            None => return Value::Null,
        };

        match step {
            Some((key, child)) => match Opened::open(child, key) {
                Opened::Leaf(key, value) => {
                    if let Some(frame) = stack.last_mut() {
                        frame.insert(key, value);
                    }
                }
                Opened::Nested(frame) => stack.push(frame),
            },
            None => {
                let Some(done) = stack.pop() else {
                    return Value::Null;
                };
                let (key, value) = done.finish();
                match stack.last_mut() {
                    Some(parent) => parent.insert(key, value),
                    None => return value,
                }
            }
        }
    }
}

/// Normalizes a payload and returns it as an object
///
/// Payloads whose root is not an object are wrapped under `raw`.
pub fn normalize_object(root: &RawValue) -> Map<String, Value> {
    match normalize(root) {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("raw".to_string(), other);
            map
        }
    }
}

/// Converts a scalar node, coercing non-primitives to strings
fn scalar(value: &RawValue) -> Value {
    match value {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Bool(*b),
        RawValue::Int(i) => Value::Number((*i).into()),
        RawValue::Float(f) => match Number::from_f64(*f) {
            Some(n) => Value::Number(n),
            None => coerced("float", f.to_string()),
        },
        RawValue::Str(s) => Value::String(s.clone()),
        RawValue::Timestamp(ts) => {
            coerced("timestamp", ts.format("%Y-%m-%d %H:%M:%S%:z").to_string())
        }
        RawValue::Bytes(bytes) => coerced("bytes", hex::encode(bytes)),
        RawValue::Opaque { kind, repr } => coerced(kind, repr.clone()),
        RawValue::Array(_) | RawValue::Object(_) => coerced("container", String::new()),
    }
}

fn coerced(kind: &str, repr: String) -> Value {
    tracing::debug!(kind, "Coercing non-primitive value to string");
    Value::String(repr)
}

/// An object or array whose children are still being normalized
enum Frame<'a> {
    Object {
        key: Option<String>,
        fields: slice::Iter<'a, (String, RawValue)>,
        out: Map<String, Value>,
    },
    Array {
        key: Option<String>,
        items: slice::Iter<'a, RawValue>,
        out: Vec<Value>,
    },
}

/// Result of opening a node: either finished immediately or pushed as a frame
enum Opened<'a> {
    Leaf(Option<String>, Value),
    Nested(Frame<'a>),
}

impl<'a> Opened<'a> {
    fn open(node: &'a RawValue, key: Option<String>) -> Self {
        match node {
            RawValue::Object(fields) => Self::Nested(Frame::Object {
                key,
                fields: fields.iter(),
                out: Map::new(),
            }),
            RawValue::Array(items) => Self::Nested(Frame::Array {
                key,
                items: items.iter(),
                out: Vec::with_capacity(items.len()),
            }),
            other => Self::Leaf(key, scalar(other)),
        }
    }
}

impl<'a> Frame<'a> {
    /// Next unvisited child with the key it will be stored under
    fn next_child(&mut self) -> Option<(Option<String>, &'a RawValue)> {
        match self {
            Self::Object { fields, .. } => fields
                .next()
                .map(|(name, child)| (Some(canonical_key(name)), child)),
            Self::Array { items, .. } => items.next().map(|child| (None, child)),
        }
    }

    fn insert(&mut self, key: Option<String>, value: Value) {
        match self {
            Self::Object { out, .. } => {
                if let Some(key) = key {
                    out.insert(key, value);
                }
            }
            Self::Array { out, .. } => out.push(value),
        }
    }

    fn finish(self) -> (Option<String>, Value) {
        match self {
            Self::Object { key, out, .. } => (key, Value::Object(out)),
            Self::Array { key, out, .. } => (key, Value::Array(out)),
        }
    }
}
