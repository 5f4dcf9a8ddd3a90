//! Duplex message ports connecting a host to its worker.
//!
//! A [`duplex`] call creates two halves: the [`HostPort`] posts control messages
//! and receives [`WorkerEvent`]s, the [`WorkerPort`] receives control messages and
//! posts lifecycle messages. Transport-level failures (a panicking worker thread)
//! travel on the same event stream as [`WorkerEvent::Error`], mirroring a native
//! worker's separate `error` event.

use crate::protocol::{ControlMessage, LifecycleMessage};
use tokio::sync::mpsc;

/// An event observed by the host on a worker's message stream.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A protocol message posted by the worker.
    Message(LifecycleMessage),
    /// A transport-level failure raised outside the protocol.
    Error(String),
}

/// Host half of a worker transport.
#[derive(Debug)]
pub struct HostPort {
    pub(crate) control: mpsc::UnboundedSender<ControlMessage>,
    pub(crate) events: mpsc::UnboundedReceiver<WorkerEvent>,
}

/// Worker half of a worker transport.
#[derive(Debug)]
pub struct WorkerPort {
    control: mpsc::UnboundedReceiver<ControlMessage>,
    events: EventSink,
}

/// Cloneable sender for worker → host events.
#[derive(Debug, Clone)]
pub struct EventSink {
    events: mpsc::UnboundedSender<WorkerEvent>,
}

/// Creates a connected host/worker port pair.
#[must_use]
pub fn duplex() -> (HostPort, WorkerPort) {
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    (
        HostPort {
            control: control_tx,
            events: events_rx,
        },
        WorkerPort {
            control: control_rx,
            events: EventSink { events: events_tx },
        },
    )
}

impl HostPort {
    /// Posts a control message. Returns `false` once the worker side is gone.
    pub fn post(&self, message: ControlMessage) -> bool {
        self.control.send(message).is_ok()
    }

    /// Receives the next worker event, or `None` when the worker side is gone.
    pub async fn recv(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }
}

impl WorkerPort {
    /// Receives the next control message, or `None` when the host disconnected.
    pub async fn recv(&mut self) -> Option<ControlMessage> {
        self.control.recv().await
    }

    /// Posts a lifecycle message. Returns `false` once the host side is gone.
    pub fn post(&self, message: LifecycleMessage) -> bool {
        self.events.post(message)
    }

    /// Returns a sink the native layer keeps for reporting transport errors.
    #[must_use]
    pub fn sink(&self) -> EventSink {
        self.events.clone()
    }

    /// Splits the port into its receiving and posting halves.
    pub(crate) fn into_parts(self) -> (mpsc::UnboundedReceiver<ControlMessage>, EventSink) {
        (self.control, self.events)
    }
}

impl EventSink {
    /// Posts a lifecycle message.
    pub fn post(&self, message: LifecycleMessage) -> bool {
        self.events.send(WorkerEvent::Message(message)).is_ok()
    }

    /// Raises a transport error event.
    pub fn error(&self, message: impl Into<String>) -> bool {
        self.events.send(WorkerEvent::Error(message.into())).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_flow_both_ways() {
        let (mut host, mut worker) = duplex();

        assert!(worker.post(LifecycleMessage::Open));
        assert_eq!(host.recv().await, Some(WorkerEvent::Message(LifecycleMessage::Open)));

        assert!(host.post(ControlMessage::Close));
        assert!(matches!(worker.recv().await, Some(ControlMessage::Close)));
    }

    #[tokio::test]
    async fn error_events_share_the_stream() {
        let (mut host, worker) = duplex();
        let sink = worker.sink();
        drop(worker);

        assert!(sink.error("thread panicked"));
        assert_eq!(host.recv().await, Some(WorkerEvent::Error("thread panicked".into())));

        drop(sink);
        assert_eq!(host.recv().await, None);
    }

    #[test]
    fn posting_to_a_departed_peer_reports_failure() {
        let (host, worker) = duplex();
        drop(worker);
        assert!(!host.post(ControlMessage::Close));
    }
}
