use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;

use crate::json_ext::Object;
use crate::json_ext::Value;

pub(crate) const ID_KEY: &str = "__id";
pub(crate) const TYPENAME_KEY: &str = "__typename";
pub(crate) const REF_KEY: &str = "__ref";
pub(crate) const REFS_KEY: &str = "__refs";

/// The identifier of a record in the store.
pub type DataId = String;

/// The value of a link field, as stored in a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link<T> {
    /// The record does not hold the field at all.
    Missing,
    /// The field is known to be null.
    Null,
    /// The field points to one or more records.
    Present(T),
}

/// The stored value of a link field could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MalformedLink {
    pub(crate) reason: String,
}

/// A normalized entity: a map from storage key to value.
///
/// Singular links are stored as `{"__ref": id}` and plural links as `{"__refs": [id, ...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Object);

impl Record {
    /// Creates an empty record.
    pub fn new(id: impl Into<DataId>, typename: impl Into<String>) -> Self {
        let mut fields = Object::new();
        fields.insert(ID_KEY, Value::String(ByteString::from(id.into())));
        fields.insert(TYPENAME_KEY, Value::String(ByteString::from(typename.into())));
        Self(fields)
    }

    pub(crate) fn from_object(fields: Object) -> Self {
        Self(fields)
    }

    /// The record identifier, from its `__id` field.
    pub fn data_id(&self) -> Option<&str> {
        self.0.get(ID_KEY).and_then(|id| id.as_str())
    }

    /// The concrete type of the record, from its `__typename` field.
    pub fn typename(&self) -> Option<&str> {
        self.0.get(TYPENAME_KEY).and_then(|typename| typename.as_str())
    }

    /// Sets a field to a scalar value.
    pub fn set_value(&mut self, storage_key: impl Into<String>, value: impl Into<Value>) {
        self.0
            .insert(ByteString::from(storage_key.into()), value.into());
    }

    /// Sets a singular link, `None` storing a null link.
    pub fn set_linked_record(&mut self, storage_key: impl Into<String>, id: Option<&str>) {
        let value = match id {
            Some(id) => {
                let mut link = Object::new();
                link.insert(REF_KEY, Value::String(ByteString::from(id)));
                Value::Object(link)
            }
            None => Value::Null,
        };
        self.set_value(storage_key, value);
    }

    /// Sets a plural link.
    pub fn set_linked_records(&mut self, storage_key: impl Into<String>, ids: &[Option<&str>]) {
        let refs = ids
            .iter()
            .map(|id| match id {
                Some(id) => Value::String(ByteString::from(*id)),
                None => Value::Null,
            })
            .collect::<Vec<_>>();
        let mut link = Object::new();
        link.insert(REFS_KEY, Value::Array(refs));
        self.set_value(storage_key, Value::Object(link));
    }

    /// Reads a scalar field. `None` means the field is missing from the record.
    pub fn read_field(&self, storage_key: &str) -> Option<&Value> {
        self.0.get(storage_key)
    }

    /// Reads a singular link.
    pub fn read_linked_record(&self, storage_key: &str) -> Link<&str> {
        self.try_read_linked_record(storage_key)
            .unwrap_or_else(|error| {
                failfast_debug!("{}", error.reason);
                Link::Null
            })
    }

    pub(crate) fn try_read_linked_record(
        &self,
        storage_key: &str,
    ) -> Result<Link<&str>, MalformedLink> {
        match self.0.get(storage_key) {
            None => Ok(Link::Missing),
            Some(Value::Null) => Ok(Link::Null),
            Some(value) => value
                .as_object()
                .and_then(|link| link.get(REF_KEY))
                .and_then(|id| id.as_str())
                .map(Link::Present)
                .ok_or_else(|| MalformedLink {
                    reason: format!(
                        "expected field '{storage_key}' of record '{}' to be a singular link",
                        self.data_id().unwrap_or_default()
                    ),
                }),
        }
    }

    /// Reads a plural link. Null entries of the list are kept, in order.
    pub fn read_linked_records(&self, storage_key: &str) -> Link<Vec<Option<&str>>> {
        self.try_read_linked_records(storage_key)
            .unwrap_or_else(|error| {
                failfast_debug!("{}", error.reason);
                Link::Null
            })
    }

    pub(crate) fn try_read_linked_records(
        &self,
        storage_key: &str,
    ) -> Result<Link<Vec<Option<&str>>>, MalformedLink> {
        let refs = match self.0.get(storage_key) {
            None => return Ok(Link::Missing),
            Some(Value::Null) => return Ok(Link::Null),
            Some(value) => value
                .as_object()
                .and_then(|link| link.get(REFS_KEY))
                .and_then(|refs| refs.as_array())
                .ok_or_else(|| MalformedLink {
                    reason: format!(
                        "expected field '{storage_key}' of record '{}' to be a plural link",
                        self.data_id().unwrap_or_default()
                    ),
                })?,
        };
        refs.iter()
            .enumerate()
            .map(|(index, id)| match id {
                Value::Null => Ok(None),
                Value::String(id) => Ok(Some(id.as_str())),
                _ => Err(MalformedLink {
                    reason: format!(
                        "expected entry {index} of field '{storage_key}' of record '{}' to be a record id",
                        self.data_id().unwrap_or_default()
                    ),
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Link::Present)
    }
}
