//! Error types for threadlet.
//!
//! This module defines the centralized error type [`ThreadletError`] and a type alias
//! [`Result`] used throughout the crate. Errors are implemented with `thiserror`.
//!
//! The variants follow the failure taxonomy of the worker protocol: handshake and
//! transport failures are fatal to a resource scope, per-request failures are local
//! to one `send` call, and task failures describe the worker's terminal outcome.

use crate::domain::outcome::ErrorValue;
use thiserror::Error;

/// The main error type for threadlet operations.
///
/// # Examples
///
/// ```
/// use threadlet::domain::{ErrorValue, ThreadletError};
///
/// let err = ThreadletError::Request(ErrorValue::new("Error", "boom"));
/// assert_eq!(err.to_string(), "request failed: Error: boom");
/// ```
#[derive(Debug, Error)]
pub enum ThreadletError {
    /// The worker's first message was not the `open` handshake.
    ///
    /// Fatal: aborts resource acquisition.
    #[error("worker handshake failed: {0}")]
    Handshake(String),

    /// The worker transport raised an error event (thread panic, runtime failure).
    ///
    /// Fatal: aborts the whole resource scope.
    #[error("worker transport error: {0}")]
    Transport(String),

    /// A single request failed inside the worker's request handler.
    ///
    /// Reported only to the caller of that `send`.
    #[error("request failed: {0}")]
    Request(ErrorValue),

    /// The worker's task body finished with a failure, or was terminated.
    #[error("worker task failed: {0}")]
    Task(ErrorValue),

    /// The handle was used after the resource issued `close`.
    #[error("worker is closed")]
    Closed,

    /// A response channel was released by the worker without an answer.
    ///
    /// Happens when the worker finalizes while a request is still in flight.
    #[error("worker dropped the response channel without replying")]
    Disconnected,

    /// No worker entry point is registered under the requested script locator.
    #[error("no worker registered for script '{0}'")]
    UnknownScript(String),

    /// A bounded wait elapsed.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The supervising scope was cancelled.
    #[error("worker scope cancelled")]
    Cancelled,

    /// Value could not be converted to or from its opaque wire form.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem or thread-spawn I/O failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration is invalid or missing.
    #[error("configuration error: {0}")]
    Config(String),

    /// A store operation failed.
    #[error("storage error: {0}")]
    Storage(String),
}

/// A specialized `Result` type for threadlet operations.
pub type Result<T> = std::result::Result<T, ThreadletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_and_task_errors_carry_the_remote_error() {
        let remote = ErrorValue::new("TypeError", "bad input");
        let err = ThreadletError::Request(remote.clone());
        assert_eq!(err.to_string(), "request failed: TypeError: bad input");

        let err = ThreadletError::Task(ErrorValue::terminated());
        assert!(err.to_string().starts_with("worker task failed: Terminated"));
    }

    #[test]
    fn io_errors_convert() {
        fn open() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))?;
            Ok(())
        }
        assert!(matches!(open(), Err(ThreadletError::Io(_))));
    }
}
