//! Performance oriented JSON manipulation.

use std::fmt;
use std::io::Write;

use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// Extension trait for [`serde_json_bytes::Value`].
pub trait ValueExt {
    /// Returns `true` if the value is truthy in the sense used by abstract type checks: present,
    /// not null and not `false`.
    fn is_truthy(&self) -> bool;

    /// Serializes the value with object keys sorted, so that structurally equal values always
    /// produce the same string.
    fn to_stable_string(&self) -> String;

    /// Feeds the value to `hasher` with object keys sorted, so that structurally equal values
    /// always produce the same hash.
    fn hash_stable(&self, hasher: &mut blake3::Hasher);
}

impl ValueExt for Value {
    fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    fn to_stable_string(&self) -> String {
        let mut out = String::new();
        write_stable(self, &mut out);
        out
    }

    fn hash_stable(&self, hasher: &mut blake3::Hasher) {
        match self {
            Value::Null => {
                hasher.update(b"n");
            }
            Value::Bool(value) => {
                hasher.update(if *value { b"t" } else { b"f" });
            }
            Value::Number(number) => {
                // writing to a hasher never fails
                let _ = write!(hasher, "#{number};");
            }
            Value::String(string) => {
                hasher.update(b"s");
                hash_str(string.as_str(), hasher);
            }
            Value::Array(items) => {
                hasher.update(b"[");
                hasher.update(&items.len().to_le_bytes());
                for item in items {
                    item.hash_stable(hasher);
                }
            }
            Value::Object(object) => hash_object(object, hasher),
        }
    }
}

/// Hashes the fields of an object in key order.
pub(crate) fn hash_object(object: &Object, hasher: &mut blake3::Hasher) {
    hasher.update(b"{");
    hasher.update(&object.len().to_le_bytes());
    for (key, value) in object
        .iter()
        .sorted_by(|a, b| a.0.as_str().cmp(b.0.as_str()))
    {
        hash_str(key.as_str(), hasher);
        value.hash_stable(hasher);
    }
}

fn hash_str(string: &str, hasher: &mut blake3::Hasher) {
    hasher.update(&string.len().to_le_bytes());
    hasher.update(string.as_bytes());
}

fn write_stable(value: &Value, out: &mut String) {
    match value {
        Value::Object(object) => {
            let mut entries: Vec<_> = object.iter().collect();
            entries.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
            out.push('{');
            for (index, (key, value)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key.as_str()).unwrap_or_default());
                out.push(':');
                write_stable(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_stable(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&serde_json::to_string(other).unwrap_or_default()),
    }
}

/// A path element in a [`Path`].
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// An index path element.
    Index(usize),

    /// A key path element.
    Key(String),
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Index(index) => write!(f, "{index}"),
            PathElement::Key(key) => write!(f, "{key}"),
        }
    }
}

/// A path into the result of a read, as it is being assembled.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn from_slice<T: AsRef<str>>(s: &[T]) -> Self {
        Self(
            s.iter()
                .map(|x| x.as_ref())
                .map(|s| {
                    if let Ok(index) = s.parse::<usize>() {
                        PathElement::Index(index)
                    } else {
                        PathElement::Key(s.to_string())
                    }
                })
                .collect(),
        )
    }

    pub fn push(&mut self, element: PathElement) {
        self.0.push(element)
    }

    pub fn pop(&mut self) -> Option<PathElement> {
        self.0.pop()
    }

    pub fn last(&self) -> Option<&PathElement> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in self.iter() {
            write!(f, "/{element}")?;
        }
        Ok(())
    }
}
