//! Keyed record store.
//!
//! Single-writer usage: only the lifecycle engine and the window evictor
//! mutate; external consumers read through `get`/`get_field`/`iter`.
//! Contract violations (update of an absent key, double delete) are logged
//! no-ops, never fatal — a malformed line must never stop the stream.

use std::collections::HashMap;

use tracing::debug;

use super::model::{FieldValue, Record, RecordUpdate};

#[derive(Debug, Default)]
pub struct RecordStore {
    records: HashMap<String, Record>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record under `key`, returning the displaced record if the
    /// key was already present.
    pub fn insert(&mut self, key: String, record: Record) -> Option<Record> {
        self.records.insert(key, record)
    }

    /// Applies a partial update to the record at `key`. Returns false (and
    /// logs) when the key is absent.
    pub fn update(&mut self, key: &str, update: RecordUpdate) -> bool {
        match self.records.get_mut(key) {
            Some(record) => {
                record.apply(update);
                true
            }
            None => {
                debug!(key, "update for absent key ignored");
                false
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    /// By-name field read; `None` when the key or the field is absent.
    pub fn get_field(&self, key: &str, field: &str) -> Option<FieldValue<'_>> {
        self.records.get(key)?.field(field)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Removes the record at `key`. Deleting an absent key is a tolerated
    /// no-op (the history queue can hold duplicate entries).
    pub fn delete(&mut self, key: &str) -> bool {
        self.records.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over all retained records, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Record)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }
}
