//! JSON file-based store.
//!
//! Keeps the whole log table in memory and rewrites the file after every
//! change using an atomic write (write-to-temp + rename), so a crash never
//! leaves a half-written file behind.
//!
//! # Performance Characteristics
//!
//! - **Read**: served from memory
//! - **Write**: O(n), serializes and writes the entire table
//! - **Best for**: small tables, infrequent writes

use crate::domain::error::{Result, ThreadletError};
use crate::storage::backend::{lock, scan_log, scan_matching, Store};
use crate::storage::models::{LogTable, Record};
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Current on-disk format version.
const FORMAT_VERSION: u32 = 1;

/// On-disk container.
///
/// ```json
/// {
///   "version": 1,
///   "logs": {
///     "events": [
///       { "key": "events", "data": "started", "written_at": 1700000000000 }
///     ]
///   }
/// }
/// ```
#[derive(Debug, Deserialize)]
struct StoreFile {
    /// Version of the storage format for future migrations.
    version: u32,

    #[serde(default)]
    logs: LogTable,
}

/// Store persisted to a single JSON file.
///
/// # Examples
///
/// ```no_run
/// use threadlet::storage::JsonStore;
///
/// let store = JsonStore::open("/tmp/threadlet/store.json")?;
/// # Ok::<(), threadlet::ThreadletError>(())
/// ```
#[derive(Debug)]
pub struct JsonStore {
    file_path: PathBuf,
    table: Mutex<LogTable>,
}

impl JsonStore {
    /// Opens the store at `file_path`, loading existing contents.
    ///
    /// Parent directories are created automatically.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Parent directory creation fails
    /// - File exists but contains invalid JSON
    /// - File permissions prevent reading
    pub fn open(file_path: impl Into<PathBuf>) -> Result<Self> {
        let file_path = file_path.into();
        tracing::debug!(path = ?file_path, "opening JSON store");

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let table = if file_path.exists() {
            Self::load_from_file(&file_path)?
        } else {
            tracing::debug!("initializing new empty store");
            LogTable::default()
        };

        tracing::debug!(keys = table.key_count(), "store opened");
        Ok(Self {
            file_path,
            table: Mutex::new(table),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn load_from_file(path: &Path) -> Result<LogTable> {
        let contents = std::fs::read_to_string(path)?;
        let file: StoreFile = serde_json::from_str(&contents)
            .map_err(|e| ThreadletError::Storage(format!("failed to parse JSON: {e}")))?;

        if file.version != FORMAT_VERSION {
            return Err(ThreadletError::Storage(format!(
                "unsupported store format version {}",
                file.version
            )));
        }
        Ok(file.logs)
    }

    /// Writes `table` to disk atomically.
    fn save_to_file(&self, table: &LogTable) -> Result<()> {
        let file = StoreFileRef {
            version: FORMAT_VERSION,
            logs: table,
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| ThreadletError::Storage(format!("failed to serialize JSON: {e}")))?;

        let tmp_path = self.file_path.with_extension("tmp");
        tracing::trace!(tmp_path = ?tmp_path, "writing to temporary file");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.file_path)?;

        tracing::debug!(path = ?self.file_path, "store saved");
        Ok(())
    }

    /// Applies `change` and persists the result while holding the table lock.
    ///
    /// The change becomes visible only once it is on disk; a failed save leaves
    /// the in-memory table untouched.
    fn mutate(&self, change: impl FnOnce(&mut LogTable)) -> Result<()> {
        let mut table = lock(&self.table);
        let mut next = table.clone();
        change(&mut next);
        self.save_to_file(&next)?;
        *table = next;
        Ok(())
    }
}

#[derive(Serialize)]
struct StoreFileRef<'a> {
    version: u32,
    logs: &'a LogTable,
}

impl Store for JsonStore {
    fn write<'a>(&'a self, key: &'a str, data: Value) -> BoxFuture<'a, Result<()>> {
        async move {
            tracing::debug_span!("json_write", key).in_scope(|| self.mutate(|table| table.write(key, data)))
        }
        .boxed()
    }

    fn append<'a>(&'a self, key: &'a str, data: Value) -> BoxFuture<'a, Result<()>> {
        async move {
            tracing::debug_span!("json_append", key).in_scope(|| self.mutate(|table| table.append(key, data)))
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
            tracing::debug_span!("json_clear").in_scope(|| self.mutate(LogTable::clear))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreExt;
    use futures_util::TryStreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn contents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        {
            let store = JsonStore::open(&path).unwrap();
            store.write("config", json!({"retries": 3})).await.unwrap();
            store.append("events", json!("a")).await.unwrap();
            store.append("events", json!("b")).await.unwrap();
        }

        let store = JsonStore::open(&path).unwrap();
        assert!(store.has("config").await.unwrap());
        let events: Vec<String> = store.read_as::<String>("events").try_collect().await.unwrap();
        assert_eq!(events, vec!["a", "b"]);
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn clear_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonStore::open(&path).unwrap();
        store.write("a", json!(1)).await.unwrap();
        store.clear().await.unwrap();
        drop(store);

        let store = JsonStore::open(&path).unwrap();
        assert!(!store.has("a").await.unwrap());
    }

    #[tokio::test]
    async fn failed_saves_leave_the_table_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonStore::open(&path).unwrap();
        store.write("kept", json!(1)).await.unwrap();

        // A directory in place of the temporary file makes every save fail.
        std::fs::create_dir(path.with_extension("tmp")).unwrap();
        assert!(store.write("lost", json!(2)).await.is_err());
        assert!(store.clear().await.is_err());

        assert!(!store.has("lost").await.unwrap());
        assert!(store.has("kept").await.unwrap());

        drop(store);
        let reopened = JsonStore::open(&path).unwrap();
        assert!(reopened.has("kept").await.unwrap());
        assert!(!reopened.has("lost").await.unwrap());
    }

    #[test]
    fn corrupt_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonStore::open(&path).unwrap_err();
        assert!(matches!(err, ThreadletError::Storage(_)));
    }
}
