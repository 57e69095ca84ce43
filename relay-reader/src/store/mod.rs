//! The normalized record store consumed by the reader.
//!
//! The reader only ever reads records; the store is owned and mutated by its embedder between
//! reads.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

mod record;

pub use record::DataId;
pub use record::Link;
pub use record::Record;
pub(crate) use record::ID_KEY;
pub(crate) use record::TYPENAME_KEY;

/// The state of a record in a [`RecordSource`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordState<'a> {
    /// The record is present.
    Existent(&'a Record),
    /// The record is known not to exist.
    Nonexistent,
    /// Nothing is known about the record.
    Unknown,
}

/// Read access to normalized records.
pub trait RecordSource {
    /// Looks up a record by id.
    fn get(&self, data_id: &str) -> RecordState<'_>;
}

/// A [`RecordSource`] backed by a hash map.
///
/// Deserializes from the usual normalized store dump: an object mapping ids to records, where a
/// `null` record is known to be deleted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InMemoryRecordSource {
    records: HashMap<DataId, Option<Record>>,
}

impl InMemoryRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record, keyed by its `__id`.
    pub fn insert(&mut self, record: Record) {
        let Some(data_id) = record.data_id().map(str::to_string) else {
            failfast_error!("cannot insert a record without an '{}' field", ID_KEY);
            return;
        };
        self.records.insert(data_id, Some(record));
    }

    /// Marks a record as deleted.
    pub fn remove(&mut self, data_id: &str) {
        self.records.insert(data_id.to_string(), None);
    }

    /// Mutable access to an existing record.
    pub fn get_mut(&mut self, data_id: &str) -> Option<&mut Record> {
        self.records.get_mut(data_id).and_then(Option::as_mut)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for InMemoryRecordSource {
    fn get(&self, data_id: &str) -> RecordState<'_> {
        match self.records.get(data_id) {
            Some(Some(record)) => RecordState::Existent(record),
            Some(None) => RecordState::Nonexistent,
            None => RecordState::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn record_states() {
        let mut source: InMemoryRecordSource = serde_json_bytes::from_value(json!({
            "1": { "__id": "1", "__typename": "TodoModel", "id": "1" },
            "2": null
        }))
        .unwrap();

        assert!(matches!(source.get("1"), RecordState::Existent(record) if record.typename() == Some("TodoModel")));
        assert_eq!(source.get("2"), RecordState::Nonexistent);
        assert_eq!(source.get("3"), RecordState::Unknown);

        source.remove("1");
        assert_eq!(source.get("1"), RecordState::Nonexistent);

        source.insert(Record::new("3", "TodoModel"));
        assert!(matches!(source.get("3"), RecordState::Existent(_)));
        assert_eq!(source.len(), 3);
    }

    #[test]
    fn mutate_in_place() {
        let mut source = InMemoryRecordSource::new();
        source.insert(Record::new("1", "TodoModel"));
        source
            .get_mut("1")
            .expect("record exists")
            .set_value("text", "Buy milk");

        let RecordState::Existent(record) = source.get("1") else {
            panic!("record should exist");
        };
        assert_eq!(record.read_field("text"), Some(&json!("Buy milk")));
    }
}
