//! The requests abstraction handed to a worker's task body.
//!
//! [`Requests`] yields the payloads of pending `send` messages, decoded into the
//! task body's request type. Each [`Request`] must be answered at most once, and
//! answering consumes it. [`Requests::for_each`] is the usual way to serve them:
//! every request runs as its own local task, so a slow request never blocks the
//! others, and a failing or panicking handler only fails its own request.

use crate::domain::{ErrorValue, Outcome};
use crate::protocol::{ResponsePort, TraceContext};
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::Instrument;

/// A `send` message as forwarded by the dispatch loop.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) value: Value,
    pub(crate) response: ResponsePort,
    pub(crate) trace_context: Option<TraceContext>,
}

/// Stream of pending requests for a task body.
///
/// Ends when the host closes the worker. Dropping it answers every request
/// still queued, and every later one, with a [`NOT_ACCEPTING`] error.
#[derive(Debug)]
pub struct Requests<S, R> {
    inbox: mpsc::UnboundedReceiver<Envelope>,
    _types: PhantomData<fn(S) -> R>,
}

/// One pending request.
#[derive(Debug)]
pub struct Request<S, R> {
    value: S,
    responder: Responder<R>,
}

/// Write-once reply handle for a single request.
///
/// Dropping it without answering posts an [`UNANSWERED`] error, so the caller
/// always receives exactly one response.
#[derive(Debug)]
pub struct Responder<R> {
    port: Option<ResponsePort>,
    span: tracing::Span,
    _type: PhantomData<fn(R)>,
}

/// Error name posted for requests queued when the task body stopped accepting.
pub const NOT_ACCEPTING: &str = "NotAccepting";

/// Error name posted for a request whose responder was dropped unanswered.
pub const UNANSWERED: &str = "Unanswered";

pub(crate) fn not_accepting() -> Outcome {
    Outcome::Err(ErrorValue::new(NOT_ACCEPTING, "task body is not accepting requests"))
}

impl<S, R> Requests<S, R>
where
    S: DeserializeOwned + 'static,
    R: Serialize + 'static,
{
    pub(crate) const fn new(inbox: mpsc::UnboundedReceiver<Envelope>) -> Self {
        Self {
            inbox,
            _types: PhantomData,
        }
    }

    /// Waits for the next request.
    ///
    /// Payloads that cannot be decoded into `S` are answered with a
    /// `DecodeError` and skipped. Returns `None` once the host has closed.
    pub async fn next(&mut self) -> Option<Request<S, R>> {
        loop {
            let Envelope {
                value,
                response,
                trace_context,
            } = self.inbox.recv().await?;

            let span = tracing::debug_span!("worker_request", channel_id = response.id());
            if let Some(trace_context) = &trace_context {
                trace_context.adopt(&span);
            }

            match serde_json::from_value::<S>(value) {
                Ok(value) => {
                    return Some(Request {
                        value,
                        responder: Responder {
                            port: Some(response),
                            span,
                            _type: PhantomData,
                        },
                    })
                }
                Err(e) => {
                    span.in_scope(|| tracing::warn!(error = %e, "request payload could not be decoded"));
                    response.post(Outcome::Err(ErrorValue::new("DecodeError", e.to_string())));
                }
            }
        }
    }

    /// Serves every request with `handler` until the host closes.
    ///
    /// Each request runs as an independent local task. The handler's error, or a
    /// panic inside it, is reported to that request's caller only. Returns after
    /// the request stream ends and all in-flight handlers have answered.
    ///
    /// Must be awaited inside a worker started with
    /// [`run_worker`](crate::worker::run_worker).
    pub async fn for_each<F, Fut, E>(mut self, handler: F)
    where
        F: Fn(S) -> Fut,
        Fut: Future<Output = Result<R, E>> + 'static,
        E: fmt::Display + 'static,
    {
        let mut inflight = JoinSet::new();

        loop {
            tokio::select! {
                request = self.next() => match request {
                    Some(request) => {
                        let (value, responder) = request.into_parts();
                        match std::panic::catch_unwind(AssertUnwindSafe(|| handler(value))) {
                            Ok(future) => {
                                inflight.spawn_local(responder.complete(future));
                            }
                            Err(payload) => {
                                responder.fail(ErrorValue::from_panic(payload.as_ref()));
                            }
                        }
                    }
                    None => break,
                },
                Some(_) = inflight.join_next(), if !inflight.is_empty() => {}
            }
        }

        while inflight.join_next().await.is_some() {}
    }
}

impl<S, R: Serialize> Request<S, R> {
    /// The decoded request payload.
    pub const fn value(&self) -> &S {
        &self.value
    }

    /// Splits the request into its payload and its reply handle.
    pub fn into_parts(self) -> (S, Responder<R>) {
        (self.value, self.responder)
    }

    /// Answers the request. Returns `false` if the caller stopped waiting.
    pub fn respond<E: fmt::Display>(self, result: Result<R, E>) -> bool {
        self.responder.respond(result)
    }

    /// Runs `handler` on the payload and answers with its result.
    pub async fn respond_with<F, Fut, E>(self, handler: F) -> bool
    where
        F: FnOnce(S) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: fmt::Display,
    {
        let (value, responder) = self.into_parts();
        responder.complete(handler(value)).await
    }
}

impl<R: Serialize> Responder<R> {
    /// Posts `result` on the private response channel.
    pub fn respond<E: fmt::Display>(self, result: Result<R, E>) -> bool {
        self.post(Outcome::encode(result))
    }

    /// Posts a failure.
    pub fn fail(self, error: ErrorValue) -> bool {
        self.post(Outcome::Err(error))
    }

    /// Awaits `future` and posts its result, converting a panic into `Err`.
    pub async fn complete<Fut, E>(self, future: Fut) -> bool
    where
        Fut: Future<Output = Result<R, E>>,
        E: fmt::Display,
    {
        let span = self.span.clone();
        let outcome = match AssertUnwindSafe(future).catch_unwind().instrument(span).await {
            Ok(result) => Outcome::encode(result),
            Err(payload) => Outcome::Err(ErrorValue::from_panic(payload.as_ref())),
        };
        self.post(outcome)
    }

    fn post(mut self, outcome: Outcome) -> bool {
        let Some(port) = self.port.take() else {
            return false;
        };
        let _entered = self.span.enter();
        if let Outcome::Err(error) = &outcome {
            tracing::debug!(error = %error, "request failed");
        }
        port.post(outcome)
    }
}

impl<R> Drop for Responder<R> {
    fn drop(&mut self) {
        if let Some(port) = self.port.take() {
            let _entered = self.span.enter();
            tracing::debug!("request dropped without a response");
            port.post(Outcome::Err(ErrorValue::new(UNANSWERED, "request dropped without a response")));
        }
    }
}

impl<S, R> Drop for Requests<S, R> {
    fn drop(&mut self) {
        self.inbox.close();
        let mut rejected = 0usize;
        while let Ok(Envelope { response, .. }) = self.inbox.try_recv() {
            response.post(not_accepting());
            rejected += 1;
        }
        if rejected > 0 {
            tracing::debug!(rejected, "queued requests rejected");
        }
    }
}
