//! Built-in workers.
//!
//! - `echo`: ping/pong and echo
//! - `kv`: store operations backed by a [`Store`](crate::storage::Store)

pub mod echo;
pub mod kv;

pub use kv::{KvRequest, KvResponse};

use crate::transport::WorkerRegistry;

/// A registry holding every built-in worker.
#[must_use]
pub fn builtin_registry() -> WorkerRegistry {
    let mut registry = WorkerRegistry::new();
    registry
        .register(echo::SCRIPT, |port| Box::pin(echo::run(port)))
        .register(kv::SCRIPT, |port| Box::pin(kv::run(port)));
    registry
}
