//! Worker-side protocol runtime.
//!
//! [`run_worker`] turns the raw control-message stream of a [`WorkerPort`] into
//! the three-state worker protocol and drives the task body:
//!
//! ```text
//! AwaitingInit ──init──► Running ──body done / close──► Finalized
//!      │                                                   ▲
//!      └──────────────── close / host gone ────────────────┘
//! ```
//!
//! `open` is posted unconditionally on startup and the terminal `close` is posted
//! exactly once, after which nothing else is sent.

use crate::domain::{ErrorValue, Outcome};
use crate::protocol::{ControlMessage, LifecycleMessage, TraceContext};
use crate::transport::{EventSink, WorkerPort};
use crate::worker::requests::{not_accepting, Envelope, Requests};
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::LocalSet;
use tracing::Instrument;

/// First-writer-wins slot for the worker's terminal outcome.
///
/// Both the task body (on completion) and the dispatch loop (on `close`) try to
/// resolve it; only the first resolution is kept.
#[derive(Debug, Clone)]
pub struct TerminalOutcome {
    sender: Rc<RefCell<Option<oneshot::Sender<Outcome>>>>,
}

impl TerminalOutcome {
    /// Creates the slot and the receiver that observes its resolution.
    #[must_use]
    pub fn new() -> (Self, oneshot::Receiver<Outcome>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                sender: Rc::new(RefCell::new(Some(sender))),
            },
            receiver,
        )
    }

    /// Resolves the outcome. Returns `false` if it was already resolved.
    pub fn resolve(&self, outcome: Outcome, source: &'static str) -> bool {
        let Some(sender) = self.sender.borrow_mut().take() else {
            tracing::trace!(source, "terminal outcome already resolved");
            return false;
        };
        tracing::debug!(source, ok = outcome.is_ok(), "terminal outcome resolved");
        // The receiver only disappears when the worker itself is being torn down.
        let _ = sender.send(outcome);
        true
    }

    /// Returns `true` once resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.sender.borrow().is_none()
    }
}

/// Runs one worker lifetime on the current thread.
///
/// `body` receives the decoded `init` data and the [`Requests`] stream. Its
/// result, or the "terminated" failure if the host closes first, becomes the
/// terminal outcome posted back to the host.
///
/// # Examples
///
/// ```
/// use threadlet::transport::WorkerPort;
/// use threadlet::worker::{run_worker, Requests};
///
/// async fn pong(port: WorkerPort) {
///     run_worker(port, |(), requests: Requests<String, String>| async move {
///         requests.for_each(|_ping| async { Ok::<_, String>("pong".to_string()) }).await;
///         Ok::<_, String>(())
///     })
///     .await;
/// }
/// ```
pub async fn run_worker<D, S, R, T, E, F, Fut>(port: WorkerPort, body: F)
where
    D: DeserializeOwned + 'static,
    S: DeserializeOwned + 'static,
    R: Serialize + 'static,
    T: Serialize + 'static,
    E: fmt::Display + 'static,
    F: FnOnce(D, Requests<S, R>) -> Fut + 'static,
    Fut: Future<Output = Result<T, E>> + 'static,
{
    let span = tracing::debug_span!("worker", thread = std::thread::current().name().unwrap_or("unnamed"));
    LocalSet::new().run_until(drive(port, body).instrument(span)).await;
}

async fn drive<D, S, R, T, E, F, Fut>(port: WorkerPort, body: F)
where
    D: DeserializeOwned + 'static,
    S: DeserializeOwned + 'static,
    R: Serialize + 'static,
    T: Serialize + 'static,
    E: fmt::Display + 'static,
    F: FnOnce(D, Requests<S, R>) -> Fut + 'static,
    Fut: Future<Output = Result<T, E>> + 'static,
{
    let (mut control, events) = port.into_parts();

    events.post(LifecycleMessage::Open);
    tracing::debug!("handshake posted, awaiting init");

    let outcome = match await_init(&mut control).await {
        Some((data, trace_context)) => match serde_json::from_value::<D>(data) {
            Ok(data) => run_body(control, data, trace_context, body).await,
            Err(e) => {
                tracing::warn!(error = %e, "init data could not be decoded");
                Outcome::Err(ErrorValue::new("DecodeError", e.to_string()))
            }
        },
        None => {
            tracing::debug!("closed before init");
            Outcome::Err(ErrorValue::terminated())
        }
    };

    finalize(&events, outcome);
}

/// `AwaitingInit`: only `init` moves the worker forward.
async fn await_init(
    control: &mut mpsc::UnboundedReceiver<ControlMessage>,
) -> Option<(Value, Option<TraceContext>)> {
    loop {
        match control.recv().await? {
            ControlMessage::Init { data, trace_context } => return Some((data, trace_context)),
            ControlMessage::Send { response, .. } => {
                tracing::warn!(channel_id = response.id(), "send received before init");
                response.post(Outcome::Err(ErrorValue::new(
                    "NotInitialized",
                    "worker has not received init yet",
                )));
            }
            ControlMessage::Close => return None,
        }
    }
}

/// `Running`: the body and the dispatch loop race to resolve the terminal outcome.
async fn run_body<D, S, R, T, E, F, Fut>(
    control: mpsc::UnboundedReceiver<ControlMessage>,
    data: D,
    trace_context: Option<TraceContext>,
    body: F,
) -> Outcome
where
    D: 'static,
    S: DeserializeOwned + 'static,
    R: Serialize + 'static,
    T: Serialize + 'static,
    E: fmt::Display + 'static,
    F: FnOnce(D, Requests<S, R>) -> Fut + 'static,
    Fut: Future<Output = Result<T, E>> + 'static,
{
    let (terminal, settled) = TerminalOutcome::new();
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();

    let body_span = tracing::debug_span!("worker_body");
    if let Some(trace_context) = &trace_context {
        trace_context.adopt(&body_span);
    }

    let dispatcher = tokio::task::spawn_local(dispatch(control, requests_tx, terminal.clone()));

    let started = body_span.in_scope(|| {
        std::panic::catch_unwind(AssertUnwindSafe(|| body(data, Requests::new(requests_rx))))
    });

    let body_task = match started {
        Ok(future) => {
            let resolver = terminal.clone();
            let task = async move {
                let outcome = match AssertUnwindSafe(future).catch_unwind().await {
                    Ok(result) => Outcome::encode(result),
                    Err(payload) => Outcome::Err(ErrorValue::from_panic(payload.as_ref())),
                };
                resolver.resolve(outcome, "body");
            };
            Some(tokio::task::spawn_local(task.instrument(body_span)))
        }
        Err(payload) => {
            terminal.resolve(Outcome::Err(ErrorValue::from_panic(payload.as_ref())), "body");
            None
        }
    };

    let outcome = settled.await.unwrap_or_else(|_| Outcome::Err(ErrorValue::terminated()));

    dispatcher.abort();
    if let Some(body_task) = body_task {
        body_task.abort();
    }
    outcome
}

/// Routes `send` to the task body and turns `close` into forced termination.
async fn dispatch(
    mut control: mpsc::UnboundedReceiver<ControlMessage>,
    requests: mpsc::UnboundedSender<Envelope>,
    terminal: TerminalOutcome,
) {
    loop {
        match control.recv().await {
            Some(ControlMessage::Send {
                value,
                response,
                trace_context,
            }) => {
                let envelope = Envelope {
                    value,
                    response,
                    trace_context,
                };
                if let Err(mpsc::error::SendError(envelope)) = requests.send(envelope) {
                    tracing::debug!(channel_id = envelope.response.id(), "task body is not accepting requests");
                    envelope.response.post(not_accepting());
                }
            }
            Some(ControlMessage::Init { .. }) => {
                tracing::warn!("duplicate init ignored");
            }
            Some(ControlMessage::Close) => {
                tracing::debug!("close received");
                terminal.resolve(Outcome::Err(ErrorValue::terminated()), "close");
                return;
            }
            None => {
                tracing::debug!("host disconnected");
                terminal.resolve(Outcome::Err(ErrorValue::terminated()), "disconnect");
                return;
            }
        }
    }
}

/// `Finalized`: post the single terminal message.
fn finalize(events: &EventSink, outcome: Outcome) {
    match &outcome {
        Outcome::Ok(_) => tracing::debug!("worker finished"),
        Outcome::Err(error) => tracing::debug!(error = %error, "worker finished with failure"),
    }
    if !events.post(LifecycleMessage::Close { result: outcome }) {
        tracing::debug!("host gone before terminal message");
    }
}
