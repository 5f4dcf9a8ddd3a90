//! Scoped ownership of one worker.
//!
//! Acquisition spawns the native worker, waits for its `open` handshake, starts
//! a listener on the worker's event stream and posts `init`. Teardown posts
//! `close`, waits for the terminal outcome and joins the thread. A resource
//! dropped without teardown still closes and joins its worker, blocking the
//! dropping thread for at most the shutdown timeout.

use crate::domain::{ErrorValue, Outcome, Result, ThreadletError};
use crate::host::handle::{exited, WorkerHandle};
use crate::host::options::WorkerOptions;
use crate::protocol::{ControlMessage, LifecycleMessage, TraceContext};
use crate::transport::{duplex, HostPort, NativeWorker, WorkerEvent, WorkerRegistry};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Error name recorded when the worker raises a transport error before settling.
pub const TRANSPORT_ERROR: &str = "TransportError";

/// Error name recorded when the worker does not settle within the shutdown timeout.
pub const SHUTDOWN_TIMEOUT: &str = "Timeout";

/// A live worker owned by the host.
#[derive(Debug)]
pub struct WorkerResource {
    handle: WorkerHandle,
    native: NativeWorker,
    listener: Option<JoinHandle<()>>,
    settled: Arc<watch::Sender<Option<Outcome>>>,
    failure: watch::Receiver<Option<String>>,
    shutdown_timeout: Duration,
    torn_down: bool,
}

impl WorkerResource {
    /// Launches the worker named by `options.script` and completes the handshake.
    ///
    /// # Errors
    ///
    /// - [`ThreadletError::UnknownScript`] if the registry has no such entry
    /// - [`ThreadletError::Io`] if the thread cannot be spawned
    /// - [`ThreadletError::Handshake`] if the first message is not `open`
    /// - [`ThreadletError::Transport`] if the worker raised an error before `open`
    /// - [`ThreadletError::Timeout`] if `open` does not arrive in time
    ///
    /// On any handshake failure the worker is closed and joined before returning.
    #[tracing::instrument(level = "debug", skip_all, fields(script = %options.script))]
    pub async fn acquire(registry: &WorkerRegistry, options: WorkerOptions) -> Result<Self> {
        let Some(entry) = registry.resolve(&options.script) else {
            tracing::warn!(known = ?registry.scripts().collect::<Vec<_>>(), "no worker registered for script");
            return Err(ThreadletError::UnknownScript(options.script));
        };

        let (mut host, port) = duplex();
        let mut native = NativeWorker::spawn(entry, options.thread_name(), &options.native, port)?;

        if let Err(e) = handshake(&mut host, options.handshake_timeout).await {
            tracing::warn!(error = %e, "worker handshake failed");
            host.post(ControlMessage::Close);
            drop(host);
            native.join(options.shutdown_timeout).await;
            return Err(e);
        }
        tracing::debug!("worker opened");

        let HostPort { control, events } = host;
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let (failure_tx, failure_rx) = watch::channel(None);
        let settled = Arc::new(outcome_tx);

        let listener = tokio::spawn(
            listen(events, Arc::clone(&settled), failure_tx).instrument(tracing::debug_span!("worker_listener")),
        );

        let handle = WorkerHandle::new(options.script, control, outcome_rx);
        let init = ControlMessage::Init {
            data: options.data.unwrap_or(Value::Null),
            trace_context: TraceContext::from_current(),
        };
        if handle.post(init).is_err() {
            // The listener observes the exit and settles the outcome.
            tracing::warn!("worker exited before init could be posted");
        }

        Ok(Self {
            handle,
            native,
            listener: Some(listener),
            settled,
            failure: failure_rx,
            shutdown_timeout: options.shutdown_timeout,
            torn_down: false,
        })
    }

    /// A handle for sending requests to this worker.
    #[must_use]
    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Resolves with the message of the first transport error the worker raises.
    ///
    /// Never resolves if the worker exits cleanly.
    pub async fn transport_failure(&self) -> String {
        let mut failure = self.failure.clone();
        let message = failure
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|message| message.clone());

        match message {
            Some(message) => message,
            None => std::future::pending().await,
        }
    }

    /// Posts `close`, waits for the terminal outcome and joins the worker thread.
    ///
    /// Never fails: a missing or late outcome is captured as an `Err` outcome.
    /// A worker that does not settle within the shutdown timeout is recorded as
    /// `Timeout`, and that stays its terminal outcome even if a `close` arrives
    /// later. Calling it again returns the already settled outcome.
    #[tracing::instrument(level = "debug", skip_all, fields(script = %self.handle.script()))]
    pub async fn teardown(&mut self) -> Outcome {
        if self.torn_down {
            return self.handle.try_outcome().unwrap_or_else(exited);
        }
        self.torn_down = true;
        self.handle.close();

        let outcome = match tokio::time::timeout(self.shutdown_timeout, self.handle.settled()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(timeout = ?self.shutdown_timeout, "worker did not settle in time");
                settle(
                    &self.settled,
                    Outcome::Err(ErrorValue::new(
                        SHUTDOWN_TIMEOUT,
                        format!("worker did not settle within {:?}", self.shutdown_timeout),
                    )),
                );
                self.handle.try_outcome().unwrap_or_else(exited)
            }
        };

        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.native.join(self.shutdown_timeout).await;

        tracing::debug!(ok = outcome.is_ok(), "worker torn down");
        outcome
    }

    /// Returns `true` once [`teardown`](Self::teardown) has run.
    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl Drop for WorkerResource {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        tracing::debug!(script = %self.handle.script(), "worker resource dropped without teardown, closing");
        self.handle.close();
        self.native.join_blocking(self.shutdown_timeout);
    }
}

/// Waits for the worker's first message, which must be `open`.
async fn handshake(host: &mut HostPort, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, host.recv()).await {
        Ok(Some(WorkerEvent::Message(LifecycleMessage::Open))) => Ok(()),
        Ok(Some(WorkerEvent::Message(LifecycleMessage::Close { result }))) => Err(ThreadletError::Handshake(
            format!("worker closed before opening: {}", describe(&result)),
        )),
        Ok(Some(WorkerEvent::Error(message))) => Err(ThreadletError::Transport(message)),
        Ok(None) => Err(ThreadletError::Handshake("worker exited before opening".into())),
        Err(_) => Err(ThreadletError::Timeout(format!("no handshake within {timeout:?}"))),
    }
}

fn describe(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Ok(_) => "ok".into(),
        Outcome::Err(error) => error.to_string(),
    }
}

/// Routes worker events into the outcome and failure watches.
///
/// The first `close` wins; later ones are logged and ignored.
async fn listen(
    mut events: mpsc::UnboundedReceiver<WorkerEvent>,
    outcome: Arc<watch::Sender<Option<Outcome>>>,
    failure: watch::Sender<Option<String>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            WorkerEvent::Message(LifecycleMessage::Close { result }) => {
                tracing::debug!(ok = result.is_ok(), "worker closed");
                if !settle(&outcome, result) {
                    tracing::warn!("duplicate terminal message ignored");
                }
            }
            WorkerEvent::Message(LifecycleMessage::Open) => {
                tracing::warn!("duplicate open ignored");
            }
            WorkerEvent::Error(message) => {
                tracing::error!(error = %message, "worker transport error");
                settle(&outcome, Outcome::Err(ErrorValue::new(TRANSPORT_ERROR, message.clone())));
                failure.send_replace(Some(message));
            }
        }
    }

    if settle(&outcome, exited()) {
        tracing::warn!("worker event stream ended without a terminal message");
    }
}

fn settle(slot: &watch::Sender<Option<Outcome>>, outcome: Outcome) -> bool {
    slot.send_if_modified(|current| {
        if current.is_some() {
            return false;
        }
        *current = Some(outcome);
        true
    })
}
