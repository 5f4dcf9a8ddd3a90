//! The `echo` worker: answers `"ping"` with `"pong"` and returns anything else unchanged.

use crate::transport::WorkerPort;
use crate::worker::{run_worker, Requests};
use serde_json::Value;
use std::convert::Infallible;

/// Script locator of the echo worker.
pub const SCRIPT: &str = "echo";

/// Entry point of the echo worker.
pub async fn run(port: WorkerPort) {
    run_worker(port, |_data: Value, requests: Requests<Value, Value>| async move {
        requests.for_each(|value| async move { Ok::<_, Infallible>(reply(value)) }).await;
        Ok::<_, Infallible>(Value::Null)
    })
    .await;
}

fn reply(value: Value) -> Value {
    if value == "ping" {
        Value::from("pong")
    } else {
        value
    }
}
