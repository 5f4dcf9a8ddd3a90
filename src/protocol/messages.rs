//! Worker protocol message types for cross-thread communication.
//!
//! This module defines the control messages the host posts to a worker and the
//! lifecycle messages a worker posts back. It also implements distributed tracing
//! context propagation across the thread boundary, so spans opened by the worker
//! are children of the host span that issued the message.

use crate::domain::Outcome;
use crate::protocol::channel::ResponsePort;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Distributed tracing context for cross-thread span propagation.
///
/// Captures the current trace and span IDs from OpenTelemetry to maintain
/// trace continuity when passing messages to the worker thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// OpenTelemetry trace ID as a hex string.
    pub trace_id: String,

    /// Parent span ID for linking spans across threads.
    pub parent_span_id: String,
}

impl TraceContext {
    /// Creates a trace context from the current tracing span.
    ///
    /// Returns `None` when no OpenTelemetry layer is installed or the active span
    /// context is invalid.
    #[must_use]
    pub fn from_current() -> Option<Self> {
        use opentelemetry::trace::TraceContextExt;
        use tracing_opentelemetry::OpenTelemetrySpanExt;

        let otel_context = tracing::Span::current().context();
        let span_ref = otel_context.span();
        let span_context = span_ref.span_context();

        if !span_context.is_valid() {
            return None;
        }

        Some(Self {
            trace_id: format!("{:032x}", span_context.trace_id()),
            parent_span_id: format!("{:016x}", span_context.span_id()),
        })
    }

    /// Links `span` to the remote parent described by this context.
    ///
    /// Malformed identifiers are ignored and leave the span unparented.
    pub fn adopt(&self, span: &tracing::Span) {
        use opentelemetry::trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState};
        use tracing_opentelemetry::OpenTelemetrySpanExt;

        let (Ok(trace_id), Ok(span_id)) = (
            TraceId::from_hex(&self.trace_id),
            SpanId::from_hex(&self.parent_span_id),
        ) else {
            tracing::debug!(trace_id = %self.trace_id, "ignoring malformed trace context");
            return;
        };

        let remote = SpanContext::new(trace_id, span_id, TraceFlags::SAMPLED, true, TraceState::default());
        span.set_parent(opentelemetry::Context::new().with_remote_span_context(remote));
    }
}

/// Messages posted from the host to the worker.
///
/// The serialized form is tagged by `type`; a `send` carries its response port
/// as the port's channel identifier.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Initial configuration for the task body. Sent once, right after `open`.
    Init {
        /// Opaque initial data.
        data: Value,

        /// Trace context for linking spans across threads.
        #[serde(skip_serializing_if = "Option::is_none")]
        trace_context: Option<TraceContext>,
    },

    /// One request, answered on its private response port.
    Send {
        /// Opaque request payload.
        value: Value,

        /// Write-once reply path owned by the issuing `send` call.
        response: ResponsePort,

        /// Trace context for linking spans across threads.
        #[serde(skip_serializing_if = "Option::is_none")]
        trace_context: Option<TraceContext>,
    },

    /// The host wants the worker to wind down.
    Close,
}

impl ControlMessage {
    /// Short variant name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Send { .. } => "send",
            Self::Close => "close",
        }
    }
}

/// Messages posted from the worker to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LifecycleMessage {
    /// Handshake: the worker is ready for `init`. Always the first message.
    Open,

    /// Terminal outcome of the worker. Always the last message.
    Close {
        /// The task body's value, or its failure.
        result: Outcome,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorValue;
    use crate::protocol::ResponseChannel;
    use serde_json::json;

    #[test]
    fn control_messages_serialize_to_tagged_shapes() {
        let init = ControlMessage::Init {
            data: json!({"path": "/tmp/x"}),
            trace_context: None,
        };
        assert_eq!(
            serde_json::to_value(&init).unwrap(),
            json!({"type": "init", "data": {"path": "/tmp/x"}})
        );

        let (channel, port) = ResponseChannel::open();
        let send = ControlMessage::Send {
            value: json!("ping"),
            response: port,
            trace_context: None,
        };
        assert_eq!(
            serde_json::to_value(&send).unwrap(),
            json!({"type": "send", "value": "ping", "response": channel.id()})
        );

        assert_eq!(serde_json::to_value(&ControlMessage::Close).unwrap(), json!({"type": "close"}));
    }

    #[test]
    fn lifecycle_messages_round_trip_through_json() {
        assert_eq!(serde_json::to_value(&LifecycleMessage::Open).unwrap(), json!({"type": "open"}));

        let wire = json!({
            "type": "close",
            "result": {"ok": false, "error": {"name": "Terminated", "message": "bye"}}
        });
        let message: LifecycleMessage = serde_json::from_value(wire).unwrap();
        assert_eq!(
            message,
            LifecycleMessage::Close {
                result: Outcome::Err(ErrorValue::new("Terminated", "bye")),
            }
        );
    }

    #[test]
    fn trace_context_is_absent_without_an_otel_layer() {
        assert!(TraceContext::from_current().is_none());
    }
}
