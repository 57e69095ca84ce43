use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json_bytes::ByteString;

use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::store::DataId;
use crate::store::Record;
use crate::store::ID_KEY;
use crate::store::TYPENAME_KEY;

/// Number of hex digits of the structural hash used in derived record ids.
const ID_HASH_LEN: usize = 16;

/// A resolver output wrapped into a derived record, so that further selections can be read from
/// it.
///
/// Wrapping structurally equal values yields the same record, with the same identity.
#[derive(Clone, Debug)]
pub struct WrappedObject {
    hash: blake3::Hash,
    key: Arc<str>,
    record: Arc<Record>,
}

impl WrappedObject {
    /// The derived record: `{ "__id", "__typename", <key>: value }`.
    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn data_id(&self) -> &str {
        self.record.data_id().unwrap_or_default()
    }

    /// The wrapped resolver output.
    pub fn value(&self) -> &Value {
        static NULL: Value = Value::Null;
        self.record.read_field(&self.key).unwrap_or(&NULL)
    }

    /// Returns `true` if both handles point to the same arena slot.
    pub fn ptr_eq(&self, other: &WrappedObject) -> bool {
        Arc::ptr_eq(&self.record, &other.record)
    }
}

impl PartialEq for WrappedObject {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Serialize for WrappedObject {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.record.serialize(serializer)
    }
}

/// The normalized output of a resolver.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResolverValue {
    /// A plain value, returned as is. Also holds the `null` output of wrapping resolvers.
    Value(Value),
    /// A wrapped object.
    Object(WrappedObject),
    /// A list of wrapped objects, `null` items kept in place.
    List(Vec<Option<WrappedObject>>),
}

impl ResolverValue {
    /// The resolver output, unwrapped.
    pub fn to_value(&self) -> Value {
        match self {
            ResolverValue::Value(value) => value.clone(),
            ResolverValue::Object(object) => object.value().clone(),
            ResolverValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.as_ref().map(|object| object.value().clone()).unwrap_or_default())
                    .collect(),
            ),
        }
    }

    fn wrapped(&self) -> impl Iterator<Item = &WrappedObject> {
        let (object, list) = match self {
            ResolverValue::Value(_) => (None, None),
            ResolverValue::Object(object) => (Some(object), None),
            ResolverValue::List(items) => (None, Some(items)),
        };
        object
            .into_iter()
            .chain(list.into_iter().flatten().flatten())
    }
}

struct Slot {
    record: Arc<Record>,
    owners: usize,
}

/// Derived records created from wrapped resolver outputs.
///
/// Records are keyed by the structural hash of (type, key, value) and counted by the cache
/// entries holding them. A record leaves the arena when its last owning entry is overwritten,
/// evicted or invalidated.
#[derive(Default)]
pub(crate) struct WrapperArena {
    slots: HashMap<blake3::Hash, Slot>,
}

impl WrapperArena {
    /// Wraps `value` into a derived record of type `typename`, holding the value under `key`.
    ///
    /// The returned handle counts as one owner until it is [released](Self::release).
    pub(crate) fn wrap(&mut self, typename: &str, key: &str, value: Value) -> WrappedObject {
        let hash = structural_hash(typename, key, &value);
        let slot = self.slots.entry(hash).or_insert_with(|| {
            let hex = hash.to_hex();
            let mut fields = Object::new();
            fields.insert(
                ID_KEY,
                Value::String(ByteString::from(format!(
                    "client:{typename}:{}",
                    &hex.as_str()[..ID_HASH_LEN]
                ))),
            );
            fields.insert(TYPENAME_KEY, Value::String(ByteString::from(typename)));
            fields.insert(ByteString::from(key), value);
            Slot {
                record: Arc::new(Record::from_object(fields)),
                owners: 0,
            }
        });
        slot.owners += 1;
        WrappedObject {
            hash,
            key: Arc::from(key),
            record: slot.record.clone(),
        }
    }

    /// Drops the ownership held by a cached value.
    ///
    /// Returns the ids of the derived records that left the arena.
    pub(crate) fn release(&mut self, value: &ResolverValue) -> Vec<DataId> {
        let mut released = Vec::new();
        for object in value.wrapped() {
            let remove = match self.slots.get_mut(&object.hash) {
                Some(slot) => {
                    slot.owners = slot.owners.saturating_sub(1);
                    slot.owners == 0
                }
                None => false,
            };
            if remove {
                tracing::trace!(data_id = %object.data_id(), "released derived record");
                self.slots.remove(&object.hash);
                released.push(object.data_id().to_string());
            }
        }
        released
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
    }
}

fn structural_hash(typename: &str, key: &str, value: &Value) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(typename.as_bytes());
    hasher.update(&[0]);
    hasher.update(key.as_bytes());
    hasher.update(&[0]);
    value.hash_stable(&mut hasher);
    hasher.finalize()
}
