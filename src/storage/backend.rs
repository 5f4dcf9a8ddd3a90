//! Key/value log store abstraction.
//!
//! This module defines the [`Store`] trait that worker task bodies use for
//! persistence. Every key holds an append-only log of [`Record`]s; `write`
//! replaces the log with a single record. Reads are lazy: `read` and `find`
//! return streams that pull one record at a time and end once they have caught
//! up with what is stored when each item is pulled.
//!
//! The trait is dyn-compatible so a worker can hold an `Arc<dyn Store>` and
//! share it between concurrently served requests.

use crate::domain::error::Result;
use crate::storage::models::{compile_pattern, FindCursor, LogTable, Record};
use futures_util::future::{self, BoxFuture};
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Abstraction over key/value log stores.
///
/// # Implementations
///
/// - [`MemoryStore`](crate::storage::MemoryStore): in-process, lost on drop
/// - [`JsonStore`](crate::storage::JsonStore): JSON file with atomic writes
///
/// # Examples
///
/// ```
/// use futures_util::TryStreamExt;
/// use threadlet::storage::{MemoryStore, Store};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> threadlet::Result<()> {
/// let store = MemoryStore::new();
/// store.append("events", serde_json::json!("started")).await?;
/// store.append("events", serde_json::json!("stopped")).await?;
///
/// let records: Vec<_> = store.read("events").try_collect().await?;
/// assert_eq!(records.len(), 2);
/// # Ok(())
/// # }
/// ```
pub trait Store: Send + Sync {
    /// Stores `data` as the key's only record.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    fn write<'a>(&'a self, key: &'a str, data: Value) -> BoxFuture<'a, Result<()>>;

    /// Appends `data` to the key's log.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    fn append<'a>(&'a self, key: &'a str, data: Value) -> BoxFuture<'a, Result<()>>;

    /// Streams the key's records in insertion order. Unknown keys yield nothing.
    fn read<'a>(&'a self, key: &'a str) -> BoxStream<'a, Result<Record>>;

    /// Returns `true` if the key has a log.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    fn has<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Streams the records of every key matching the glob `pattern`, keys in
    /// lexical order. An invalid pattern yields a single error.
    fn find<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, Result<Record>>;

    /// Erases all stored state.
    ///
    /// # Errors
    ///
    /// Returns an error if the change cannot be persisted.
    fn clear(&self) -> BoxFuture<'_, Result<()>>;
}

/// Typed helpers over any [`Store`].
pub trait StoreExt: Store {
    /// Like [`Store::read`], decoding each record's data as `T`.
    fn read_as<'a, T>(&'a self, key: &'a str) -> BoxStream<'a, Result<T>>
    where
        T: DeserializeOwned + Send + 'a,
    {
        self.read(key).map(|record| record.and_then(Record::decode)).boxed()
    }

    /// Like [`Store::find`], decoding each record's data as `T`.
    fn find_as<'a, T>(&'a self, pattern: &'a str) -> BoxStream<'a, Result<T>>
    where
        T: DeserializeOwned + Send + 'a,
    {
        self.find(pattern).map(|record| record.and_then(Record::decode)).boxed()
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

pub(crate) fn lock(table: &Mutex<LogTable>) -> MutexGuard<'_, LogTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lazily streams one key's log, re-reading the table for every item.
pub(crate) fn scan_log<'a>(table: &'a Mutex<LogTable>, key: &'a str) -> BoxStream<'a, Result<Record>> {
    stream::unfold(0usize, move |index| async move {
        let record = lock(table).record_at(key, index)?;
        Some((Ok(record), index + 1))
    })
    .boxed()
}

/// Lazily streams the records of every key matching `pattern`.
pub(crate) fn scan_matching<'a>(table: &'a Mutex<LogTable>, pattern: &str) -> BoxStream<'a, Result<Record>> {
    let pattern = match compile_pattern(pattern) {
        Ok(pattern) => pattern,
        Err(e) => return stream::once(future::ready(Err(e))).boxed(),
    };

    stream::unfold((pattern, FindCursor::default()), move |(pattern, mut cursor)| async move {
        let record = lock(table).next_found(&pattern, &mut cursor)?;
        Some((Ok(record), (pattern, cursor)))
    })
    .boxed()
}
