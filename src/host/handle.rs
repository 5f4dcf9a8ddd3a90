//! The host's view of a running worker.

use crate::domain::{ErrorValue, Outcome, Result, ThreadletError};
use crate::protocol::{ControlMessage, ResponseChannel, TraceContext};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};

/// Error name used when a worker's event stream ends without a terminal message.
pub const WORKER_EXITED: &str = "WorkerExited";

/// Cloneable handle for talking to one worker.
///
/// Obtained from a [`WorkerResource`](crate::host::WorkerResource) or handed to
/// the scope of [`with_worker`](crate::host::with_worker). Every clone shares the
/// same worker; once the resource closes it, all clones refuse to send.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    script: String,
    /// `None` once `close` has been posted. Holding the lock while posting
    /// keeps every `send` strictly ordered before the `close`.
    control: Mutex<Option<mpsc::UnboundedSender<ControlMessage>>>,
    outcome: watch::Receiver<Option<Outcome>>,
}

impl WorkerHandle {
    pub(crate) fn new(
        script: String,
        control: mpsc::UnboundedSender<ControlMessage>,
        outcome: watch::Receiver<Option<Outcome>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                script,
                control: Mutex::new(Some(control)),
                outcome,
            }),
        }
    }

    /// Script locator the worker was launched from.
    #[must_use]
    pub fn script(&self) -> &str {
        &self.shared.script
    }

    /// Returns `true` once the resource has posted `close`.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Sends a request and waits for its response.
    ///
    /// Each call opens a private response channel, so concurrent sends on the
    /// same worker are answered independently and in any order.
    ///
    /// # Errors
    ///
    /// - [`ThreadletError::Closed`] if the worker was closed or has exited
    /// - [`ThreadletError::Request`] carrying the worker's error value
    /// - [`ThreadletError::Disconnected`] if the worker went away before answering
    /// - [`ThreadletError::Serialization`] if the value or response cannot be encoded
    #[tracing::instrument(level = "debug", skip_all, fields(script = %self.shared.script))]
    pub async fn send<S, R>(&self, value: &S) -> Result<R>
    where
        S: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let value = serde_json::to_value(value)?;
        let (channel, response) = ResponseChannel::open();
        tracing::debug!(channel_id = channel.id(), "posting send");

        self.post(ControlMessage::Send {
            value,
            response,
            trace_context: TraceContext::from_current(),
        })?;

        match channel.recv().await? {
            Outcome::Ok(value) => Ok(serde_json::from_value(value)?),
            Outcome::Err(error) => Err(ThreadletError::Request(error)),
        }
    }

    /// Waits for the task body's terminal outcome and decodes its success value.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadletError::Task`] with the worker's error value when the
    /// outcome is a failure (including termination by `close`).
    pub async fn outcome<T: DeserializeOwned>(&self) -> Result<T> {
        match self.settled().await {
            Outcome::Ok(value) => Ok(serde_json::from_value(value)?),
            Outcome::Err(error) => Err(ThreadletError::Task(error)),
        }
    }

    /// Waits for the raw terminal outcome.
    pub async fn settled(&self) -> Outcome {
        let mut outcome = self.shared.outcome.clone();
        let settled = outcome
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|settled| settled.clone());

        settled.unwrap_or_else(exited)
    }

    /// The terminal outcome, if it has arrived.
    #[must_use]
    pub fn try_outcome(&self) -> Option<Outcome> {
        self.shared.outcome.borrow().clone()
    }

    /// Posts `close` once. Returns `false` if it was already posted.
    pub(crate) fn close(&self) -> bool {
        let mut control = self.shared.control.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = control.take() else {
            return false;
        };

        tracing::debug!(script = %self.shared.script, "posting close");
        if sender.send(ControlMessage::Close).is_err() {
            tracing::debug!(script = %self.shared.script, "worker already gone");
        }
        true
    }

    pub(crate) fn post(&self, message: ControlMessage) -> Result<()> {
        let control = self.shared.control.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = control.as_ref().ok_or(ThreadletError::Closed)?;
        sender.send(message).map_err(|_| ThreadletError::Closed)
    }
}

pub(crate) fn exited() -> Outcome {
    Outcome::Err(ErrorValue::new(
        WORKER_EXITED,
        "worker exited without a terminal outcome",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (
        WorkerHandle,
        mpsc::UnboundedReceiver<ControlMessage>,
        watch::Sender<Option<Outcome>>,
    ) {
        let (control, inbox) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = watch::channel(None);
        (WorkerHandle::new("test".into(), control, outcome_rx), inbox, outcome_tx)
    }

    #[tokio::test]
    async fn send_is_refused_after_close() {
        let (handle, mut inbox, _outcome) = handle();

        assert!(handle.close());
        assert!(!handle.close());
        assert!(handle.is_closed());
        assert!(matches!(inbox.recv().await, Some(ControlMessage::Close)));

        let err = handle.send::<_, String>("ping").await.unwrap_err();
        assert!(matches!(err, ThreadletError::Closed));
    }

    #[tokio::test]
    async fn send_decodes_the_response() {
        let (handle, mut inbox, _outcome) = handle();

        let worker = async move {
            if let Some(ControlMessage::Send { value, response, .. }) = inbox.recv().await {
                assert_eq!(value, serde_json::json!(20));
                response.post(Outcome::Ok(serde_json::json!(21)));
            }
        };

        let (response, ()) = tokio::join!(handle.send::<_, u32>(&20), worker);
        assert_eq!(response.unwrap(), 21);
    }

    #[tokio::test]
    async fn outcome_reports_the_first_settled_value() {
        let (handle, _inbox, outcome) = handle();
        assert_eq!(handle.try_outcome(), None);

        outcome.send_replace(Some(Outcome::Err(ErrorValue::terminated())));
        let err = handle.outcome::<()>().await.unwrap_err();
        assert!(matches!(err, ThreadletError::Task(e) if e.is_terminated()));
    }

    #[tokio::test]
    async fn a_vanished_listener_settles_as_exited() {
        let (handle, _inbox, outcome) = handle();
        drop(outcome);

        let settled = handle.settled().await;
        assert_eq!(settled.error().map(|e| e.name.as_str()), Some(WORKER_EXITED));
    }
}
