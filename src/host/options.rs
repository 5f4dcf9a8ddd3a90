//! Launch parameters for a worker resource.

use crate::domain::Result;
use crate::transport::NativeOptions;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Default bound on waiting for the worker's `open` handshake, in milliseconds.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5_000;

/// Default bound on waiting for the terminal outcome during teardown, in milliseconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// Everything needed to launch one worker.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use threadlet::host::WorkerOptions;
///
/// let options = WorkerOptions::new("kv")
///     .with_data(&"/tmp/store.json")?
///     .with_shutdown_timeout(Duration::from_secs(1));
/// assert_eq!(options.thread_name(), "threadlet-kv");
/// # Ok::<(), threadlet::ThreadletError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOptions {
    /// Script locator: the registry key of the worker entry point.
    pub script: String,

    /// Native thread options.
    pub native: NativeOptions,

    /// Initial data forwarded to the task body via `init`. `null` when absent.
    pub data: Option<Value>,

    /// Bound on waiting for the `open` handshake.
    pub handshake_timeout: Duration,

    /// Bound on waiting for the terminal outcome and thread exit during teardown.
    pub shutdown_timeout: Duration,
}

impl WorkerOptions {
    /// Creates options for `script` with default timeouts and no initial data.
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            native: NativeOptions::default(),
            data: None,
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            shutdown_timeout: Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS),
        }
    }

    /// Sets the initial data, encoding it to its opaque wire form.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if `data` cannot be encoded.
    pub fn with_data<T: Serialize + ?Sized>(mut self, data: &T) -> Result<Self> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }

    /// Sets the worker thread's name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.native.name = Some(name.into());
        self
    }

    /// Sets the worker thread's stack size.
    #[must_use]
    pub const fn with_stack_size(mut self, bytes: usize) -> Self {
        self.native.stack_size = Some(bytes);
        self
    }

    /// Bounds the wait for the worker's `open` message.
    ///
    /// Acquisition fails with [`ThreadletError::Timeout`](crate::ThreadletError::Timeout)
    /// once it elapses. Default: 5 seconds
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Bounds teardown: the wait for the terminal outcome, then for the thread
    /// to exit. A worker that misses it settles as `Timeout`. Default: 5 seconds
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Name given to the worker thread.
    #[must_use]
    pub fn thread_name(&self) -> String {
        self.native
            .name
            .clone()
            .unwrap_or_else(|| format!("threadlet-{}", self.script))
    }
}
