//! Host side of the worker protocol.
//!
//! - `options`: launch parameters
//! - `resource`: acquisition, handshake, listener, teardown
//! - `handle`: `send` and terminal outcome access
//! - `scope`: `with_worker` structured scopes

pub mod handle;
pub mod options;
pub mod resource;
pub mod scope;

pub use handle::{WorkerHandle, WORKER_EXITED};
pub use options::{WorkerOptions, DEFAULT_HANDSHAKE_TIMEOUT_MS, DEFAULT_SHUTDOWN_TIMEOUT_MS};
pub use resource::{WorkerResource, SHUTDOWN_TIMEOUT, TRANSPORT_ERROR};
pub use scope::{with_worker, with_worker_until};
