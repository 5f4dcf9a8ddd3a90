//! Native worker threads.
//!
//! Each worker runs on a dedicated OS thread with its own single-threaded tokio
//! runtime, so the task body and its request handlers interleave on one thread
//! and never need to be `Send`. Failures that happen outside the protocol (the
//! runtime cannot be built, the entry point panics) are reported to the host as
//! transport error events.

use crate::domain::{ErrorValue, Result};
use crate::transport::port::{EventSink, WorkerPort};
use crate::transport::registry::WorkerEntry;
use std::panic::AssertUnwindSafe;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Interval used when polling a thread for completion.
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Native options for the worker thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeOptions {
    /// Thread name. Defaults to `threadlet-<script>`.
    pub name: Option<String>,

    /// Stack size in bytes. Defaults to the platform default.
    pub stack_size: Option<usize>,
}

/// Handle to a spawned worker thread.
#[derive(Debug)]
pub struct NativeWorker {
    name: String,
    thread: Option<JoinHandle<()>>,
}

impl NativeWorker {
    /// Spawns a thread that runs `entry` with the worker half of a transport.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the OS refuses to create the thread.
    pub fn spawn(entry: WorkerEntry, name: String, options: &NativeOptions, port: WorkerPort) -> Result<Self> {
        let mut builder = std::thread::Builder::new().name(name.clone());
        if let Some(stack_size) = options.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let sink = port.sink();
        let thread = builder.spawn(move || run_entry(&entry, port, &sink))?;

        tracing::debug!(thread = %name, "worker thread spawned");
        Ok(Self {
            name,
            thread: Some(thread),
        })
    }

    /// Thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` once the thread has exited (or was already joined).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the thread to exit without blocking the async runtime.
    ///
    /// Returns `false` if it is still running after `timeout`; the thread is
    /// then left detached.
    pub async fn join(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return self.detach();
            }
            tokio::time::sleep(JOIN_POLL_INTERVAL).await;
        }
        self.reap()
    }

    /// Blocking variant of [`join`](Self::join) for use in `Drop`.
    pub fn join_blocking(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return self.detach();
            }
            std::thread::sleep(JOIN_POLL_INTERVAL);
        }
        self.reap()
    }

    fn reap(&mut self) -> bool {
        if let Some(thread) = self.thread.take() {
            // The entry point catches its own panics, so join only fails if
            // reporting the panic itself panicked.
            if thread.join().is_err() {
                tracing::error!(thread = %self.name, "worker thread panicked while exiting");
            }
            tracing::debug!(thread = %self.name, "worker thread joined");
        }
        true
    }

    fn detach(&mut self) -> bool {
        if self.thread.take().is_some() {
            tracing::warn!(thread = %self.name, "worker thread did not exit in time, detaching");
        }
        false
    }
}

/// Body of the worker thread.
fn run_entry(entry: &WorkerEntry, port: WorkerPort, sink: &EventSink) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to build worker runtime");
            sink.error(format!("failed to build worker runtime: {e}"));
            return;
        }
    };

    let result = std::panic::catch_unwind(AssertUnwindSafe(|| runtime.block_on(entry(port))));

    if let Err(payload) = result {
        let error = ErrorValue::from_panic(payload.as_ref());
        tracing::error!(error = %error, "worker entry point panicked");
        sink.error(error.message);
    }
}
