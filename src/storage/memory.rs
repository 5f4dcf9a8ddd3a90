//! In-process store.

use crate::domain::error::Result;
use crate::storage::backend::{lock, scan_log, scan_matching, Store};
use crate::storage::models::{LogTable, Record};
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::BoxStream;
use serde_json::Value;
use std::sync::Mutex;

/// Store that keeps every log in memory. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: Mutex<LogTable>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn write<'a>(&'a self, key: &'a str, data: Value) -> BoxFuture<'a, Result<()>> {
        async move {
            tracing::trace!(key, "memory write");
            lock(&self.table).write(key, data);
            Ok(())
        }
        .boxed()
    }

    fn append<'a>(&'a self, key: &'a str, data: Value) -> BoxFuture<'a, Result<()>> {
        async move {
            tracing::trace!(key, "memory append");
            lock(&self.table).append(key, data);
            Ok(())
        }
        .boxed()
    }

    fn read<'a>(&'a self, key: &'a str) -> BoxStream<'a, Result<Record>> {
        scan_log(&self.table, key)
    }

    fn has<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
        async move { Ok(lock(&self.table).has(key)) }.boxed()
    }

    fn find<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, Result<Record>> {
        scan_matching(&self.table, pattern)
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            lock(&self.table).clear();
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreExt;
    use futures_util::{StreamExt, TryStreamExt};
    use serde_json::json;

    #[tokio::test]
    async fn write_then_read_yields_a_single_record() {
        let store = MemoryStore::new();
        store.append("k", json!(1)).await.unwrap();
        store.write("k", json!(2)).await.unwrap();

        let values: Vec<i32> = store.read_as::<i32>("k").try_collect().await.unwrap();
        assert_eq!(values, vec![2]);
    }

    #[tokio::test]
    async fn unknown_keys_read_as_empty() {
        let store = MemoryStore::new();
        assert!(!store.has("missing").await.unwrap());
        assert_eq!(store.read("missing").count().await, 0);
    }

    #[tokio::test]
    async fn read_catches_up_with_appends_made_while_streaming() {
        let store = MemoryStore::new();
        store.append("log", json!("a")).await.unwrap();

        let mut stream = store.read_as::<String>("log");
        assert_eq!(stream.next().await.unwrap().unwrap(), "a");

        store.append("log", json!("b")).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "b");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn find_as_decodes_matching_logs_in_key_order() {
        let store = MemoryStore::new();
        store.append("job/b", json!(3)).await.unwrap();
        store.append("job/a", json!(1)).await.unwrap();
        store.append("job/a", json!(2)).await.unwrap();
        store.write("other", json!(99)).await.unwrap();

        let values: Vec<u32> = store.find_as::<u32>("job/*").try_collect().await.unwrap();
        assert_eq!(values, vec![1, 2, 3]);

        let mismatched: Vec<_> = store.find_as::<String>("job/*").collect().await;
        assert!(mismatched.iter().all(|value| value.is_err()));
    }

    #[tokio::test]
    async fn find_with_an_invalid_pattern_yields_one_error() {
        let store = MemoryStore::new();
        store.write("a", json!(1)).await.unwrap();

        let results: Vec<_> = store.find("[").collect().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[tokio::test]
    async fn clear_erases_everything() {
        let store = MemoryStore::new();
        store.write("a", json!(1)).await.unwrap();
        store.append("b", json!(2)).await.unwrap();
        store.clear().await.unwrap();

        assert!(!store.has("a").await.unwrap());
        assert_eq!(store.find("*").count().await, 0);
    }
}
