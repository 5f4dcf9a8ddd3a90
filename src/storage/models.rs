//! Record model and the in-memory log table shared by the store backends.

use crate::domain::error::Result;
use glob::Pattern;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Bound;

/// One stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Key whose log holds this record.
    pub key: String,

    /// Opaque record data.
    pub data: Value,

    /// Unix timestamp (milliseconds) at which the record was written.
    pub written_at: i64,
}

impl Record {
    /// Creates a record stamped with the current time.
    ///
    /// # Examples
    ///
    /// ```
    /// use threadlet::storage::Record;
    ///
    /// let record = Record::new("greeting", serde_json::json!("hello"));
    /// assert_eq!(record.key, "greeting");
    /// assert!(record.written_at > 0);
    /// ```
    pub fn new(key: impl Into<String>, data: Value) -> Self {
        Self {
            key: key.into(),
            data,
            written_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Decodes the record data.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the data does not match `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.data)?)
    }
}

/// Position of a `find` scan: the current key and the next record index in it.
#[derive(Debug, Default)]
pub(crate) struct FindCursor {
    key: Option<String>,
    index: usize,
}

/// Per-key record logs, keys kept in lexical order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct LogTable {
    logs: BTreeMap<String, Vec<Record>>,
}

impl LogTable {
    /// Replaces the key's log with a single record.
    pub(crate) fn write(&mut self, key: &str, data: Value) {
        self.logs.insert(key.to_string(), vec![Record::new(key, data)]);
    }

    pub(crate) fn append(&mut self, key: &str, data: Value) {
        self.logs
            .entry(key.to_string())
            .or_default()
            .push(Record::new(key, data));
    }

    pub(crate) fn has(&self, key: &str) -> bool {
        self.logs.contains_key(key)
    }

    pub(crate) fn clear(&mut self) {
        self.logs.clear();
    }

    pub(crate) fn key_count(&self) -> usize {
        self.logs.len()
    }

    /// The record at `index` in the key's log, if it exists yet.
    pub(crate) fn record_at(&self, key: &str, index: usize) -> Option<Record> {
        self.logs.get(key).and_then(|log| log.get(index)).cloned()
    }

    /// Advances `cursor` to the next record under a key matching `pattern`.
    pub(crate) fn next_found(&self, pattern: &Pattern, cursor: &mut FindCursor) -> Option<Record> {
        loop {
            if let Some(key) = &cursor.key {
                if let Some(record) = self.record_at(key, cursor.index) {
                    cursor.index += 1;
                    return Some(record);
                }
            }

            let next = self.next_key_matching(pattern, cursor.key.as_deref())?;
            cursor.key = Some(next);
            cursor.index = 0;
        }
    }

    fn next_key_matching(&self, pattern: &Pattern, after: Option<&str>) -> Option<String> {
        let candidates = match after {
            Some(after) => self.logs.range::<str, _>((Bound::Excluded(after), Bound::Unbounded)),
            None => self.logs.range::<str, _>(..),
        };
        candidates
            .map(|(key, _)| key)
            .find(|key| pattern.matches(key))
            .cloned()
    }
}

/// Compiles a `find` glob.
pub(crate) fn compile_pattern(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).map_err(|e| {
        crate::domain::ThreadletError::Storage(format!("invalid glob pattern '{pattern}': {e}"))
    })
}
