//! The `kv` worker: serves [`Store`] operations over the worker protocol.
//!
//! The init data selects the backend: a file path opens a [`JsonStore`], `null`
//! uses a [`MemoryStore`]. Each request carries one operation and is served
//! concurrently with the others.

use crate::domain::error::{Result, ThreadletError};
use crate::storage::{JsonStore, MemoryStore, Record, Store};
use crate::transport::WorkerPort;
use crate::worker::{run_worker, Requests};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Script locator of the kv worker.
pub const SCRIPT: &str = "kv";

/// One store operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum KvRequest {
    Write { key: String, data: Value },
    Append { key: String, data: Value },
    Read { key: String },
    Has { key: String },
    Find { pattern: String },
    Clear,
}

/// Reply to a [`KvRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KvResponse {
    /// A write, append or clear completed.
    Done,
    /// Records returned by a read or find.
    Records { records: Vec<Record> },
    /// Result of a `has` check.
    Exists { exists: bool },
}

impl KvRequest {
    /// Short operation name used in logs and error messages.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Write { .. } => "write",
            Self::Append { .. } => "append",
            Self::Read { .. } => "read",
            Self::Has { .. } => "has",
            Self::Find { .. } => "find",
            Self::Clear => "clear",
        }
    }
}

/// Entry point of the kv worker.
pub async fn run(port: WorkerPort) {
    run_worker(port, serve).await;
}

async fn serve(path: Option<PathBuf>, requests: Requests<KvRequest, KvResponse>) -> Result<Value> {
    let store = open_store(path)?;
    requests
        .for_each(move |request| {
            let store = Arc::clone(&store);
            async move { execute(store.as_ref(), request).await }
        })
        .await;
    Ok(Value::Null)
}

fn open_store(path: Option<PathBuf>) -> Result<Arc<dyn Store>> {
    match path {
        Some(path) => Ok(Arc::new(JsonStore::open(path)?)),
        None => {
            tracing::debug!("no store path given, using memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Runs one operation against `store`.
///
/// # Errors
///
/// Returns [`ThreadletError::Storage`] naming the failed operation.
#[tracing::instrument(level = "debug", skip_all, fields(operation = request.operation()))]
pub async fn execute(store: &dyn Store, request: KvRequest) -> Result<KvResponse> {
    let operation = request.operation();

    match request {
        KvRequest::Write { key, data } => {
            handle_store_result(operation, store.write(&key, data).await, |()| KvResponse::Done)
        }
        KvRequest::Append { key, data } => {
            handle_store_result(operation, store.append(&key, data).await, |()| KvResponse::Done)
        }
        KvRequest::Read { key } => handle_store_result(operation, store.read(&key).try_collect::<Vec<_>>().await, |records| {
            KvResponse::Records { records }
        }),
        KvRequest::Has { key } => {
            handle_store_result(operation, store.has(&key).await, |exists| KvResponse::Exists { exists })
        }
        KvRequest::Find { pattern } => {
            handle_store_result(operation, store.find(&pattern).try_collect::<Vec<_>>().await, |records| {
                KvResponse::Records { records }
            })
        }
        KvRequest::Clear => handle_store_result(operation, store.clear().await, |()| KvResponse::Done),
    }
}

/// Logs the result of a store operation and maps failures to a storage error.
fn handle_store_result<T, F>(operation: &str, result: Result<T>, on_success: F) -> Result<KvResponse>
where
    F: FnOnce(T) -> KvResponse,
{
    match result {
        Ok(value) => {
            tracing::debug!(operation, "store operation successful");
            Ok(on_success(value))
        }
        Err(e) => {
            tracing::debug!(operation, error = %e, "store operation failed");
            Err(ThreadletError::Storage(format!("{operation}: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn executes_operations_against_a_store() {
        let store = MemoryStore::new();

        let done = execute(&store, KvRequest::Append { key: "log".into(), data: json!(1) }).await;
        assert_eq!(done.unwrap(), KvResponse::Done);

        let exists = execute(&store, KvRequest::Has { key: "log".into() }).await.unwrap();
        assert_eq!(exists, KvResponse::Exists { exists: true });

        let KvResponse::Records { records } = execute(&store, KvRequest::Read { key: "log".into() }).await.unwrap()
        else {
            panic!("expected records");
        };
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data, json!(1));
    }

    #[tokio::test]
    async fn failures_name_the_operation() {
        let store = MemoryStore::new();
        let err = execute(&store, KvRequest::Find { pattern: "[".into() }).await.unwrap_err();
        assert!(err.to_string().starts_with("storage error: find:"));
    }

    #[test]
    fn requests_use_an_op_tag() {
        let request = serde_json::to_value(KvRequest::Has { key: "a".into() }).unwrap();
        assert_eq!(request, json!({"op": "has", "key": "a"}));
    }
}
