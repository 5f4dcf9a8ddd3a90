//! Ephemeral response channels.
//!
//! Every `send` call opens a private, single-use reply path. The host keeps the
//! [`ResponseChannel`] end and transfers the [`ResponsePort`] end to the worker
//! inside the `send` control message. Posting consumes the port, so a channel can
//! carry at most one response. Dropping either end releases it.

use crate::domain::{Result, ThreadletError};
use crate::domain::Outcome;
use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

/// Source of process-unique channel identifiers.
static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Host-side end of an ephemeral response channel.
///
/// Owned by exactly one `send` call. Released on drop whether or not a reply
/// arrived, which also covers a caller that stopped waiting.
#[derive(Debug)]
pub struct ResponseChannel {
    id: u64,
    receiver: oneshot::Receiver<Outcome>,
}

/// Worker-side, write-once end of an ephemeral response channel.
#[derive(Debug)]
pub struct ResponsePort {
    id: u64,
    sender: oneshot::Sender<Outcome>,
}

impl ResponseChannel {
    /// Opens a new channel and returns both endpoints.
    ///
    /// # Examples
    ///
    /// ```
    /// use threadlet::domain::Outcome;
    /// use threadlet::protocol::ResponseChannel;
    ///
    /// # tokio_test_block(async {
    /// let (channel, port) = ResponseChannel::open();
    /// assert!(port.post(Outcome::Ok(serde_json::json!(1))));
    /// assert!(channel.recv().await.is_ok());
    /// # });
    /// # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
    /// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
    /// # }
    /// ```
    #[must_use]
    pub fn open() -> (Self, ResponsePort) {
        let id = NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        tracing::trace!(channel_id = id, "response channel opened");
        (Self { id, receiver }, ResponsePort { id, sender })
    }

    /// Identifier shared by both endpoints.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the single response.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadletError::Disconnected`] if the port was dropped without
    /// posting, e.g. because the worker finalized first.
    pub async fn recv(mut self) -> Result<Outcome> {
        (&mut self.receiver)
            .await
            .map_err(|_| ThreadletError::Disconnected)
    }
}

impl Drop for ResponseChannel {
    fn drop(&mut self) {
        self.receiver.close();
        tracing::trace!(channel_id = self.id, "response channel released");
    }
}

impl ResponsePort {
    /// Identifier shared by both endpoints.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns `true` once the host end has been released.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.sender.is_closed()
    }

    /// Posts the response and consumes the port.
    ///
    /// Returns `false` if nobody is listening anymore. Posting to an abandoned
    /// channel discards the value and has no other effect.
    pub fn post(self, outcome: Outcome) -> bool {
        let delivered = self.sender.send(outcome).is_ok();
        if !delivered {
            tracing::trace!(channel_id = self.id, "response discarded, channel abandoned");
        }
        delivered
    }
}

/// On the wire a port is represented by its channel identifier.
impl Serialize for ResponsePort {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorValue;
    use serde_json::json;

    #[tokio::test]
    async fn delivers_exactly_one_response() {
        let (channel, port) = ResponseChannel::open();
        assert_eq!(channel.id(), port.id());

        assert!(port.post(Outcome::Err(ErrorValue::new("Error", "nope"))));
        let outcome = channel.recv().await.unwrap();
        assert_eq!(outcome.error().map(|e| e.message.as_str()), Some("nope"));
    }

    #[tokio::test]
    async fn dropped_port_disconnects_the_caller() {
        let (channel, port) = ResponseChannel::open();
        drop(port);
        assert!(matches!(channel.recv().await, Err(ThreadletError::Disconnected)));
    }

    #[test]
    fn posting_to_an_abandoned_channel_is_harmless() {
        let (channel, port) = ResponseChannel::open();
        drop(channel);
        assert!(port.is_abandoned());
        assert!(!port.post(Outcome::Ok(json!("late"))));
    }

    #[test]
    fn channel_ids_are_unique() {
        let (a, _pa) = ResponseChannel::open();
        let (b, _pb) = ResponseChannel::open();
        assert_ne!(a.id(), b.id());
    }
}
