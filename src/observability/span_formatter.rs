//! OTLP JSON encoding of exported spans.
//!
//! Each exported batch becomes one self-contained OTLP `resourceSpans` document,
//! so the trace file can be fed line by line to any OTLP-aware tool.

use opentelemetry::trace::{Event, Link, SpanId, SpanKind, Status};
use opentelemetry::{KeyValue, Value};
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::resource::Resource;
use serde_json::{json, Value as JsonValue};
use std::time::{SystemTime, UNIX_EPOCH};

/// Instrumentation scope name recorded on every batch.
pub const SCOPE_NAME: &str = "threadlet";

/// Encodes span batches as OTLP JSON.
pub struct SpanFormatter {
    resource: Resource,
}

impl SpanFormatter {
    /// Creates a formatter that tags every batch with `resource`.
    pub const fn new(resource: Resource) -> Self {
        Self { resource }
    }

    /// Encodes `batch` as a single OTLP document:
    ///
    /// ```json
    /// {"resourceSpans": [{
    ///   "resource": {"attributes": [{"key": "service.name", "value": {"stringValue": "threadlet"}}]},
    ///   "scopeSpans": [{"scope": {"name": "threadlet"}, "spans": [...]}]
    /// }]}
    /// ```
    pub fn format_batch(&self, batch: &[SpanData]) -> JsonValue {
        let resource: Vec<JsonValue> = self
            .resource
            .iter()
            .map(|(key, value)| attribute(key.as_str(), value))
            .collect();

        json!({
            "resourceSpans": [{
                "resource": { "attributes": resource },
                "scopeSpans": [{
                    "scope": { "name": SCOPE_NAME },
                    "spans": batch.iter().map(span).collect::<Vec<_>>(),
                }],
            }],
        })
    }
}

fn span(span: &SpanData) -> JsonValue {
    let context = &span.span_context;
    let parent = if span.parent_span_id == SpanId::INVALID {
        String::new()
    } else {
        format!("{:016x}", span.parent_span_id)
    };
    let (code, message) = status(&span.status);

    json!({
        "traceId": format!("{:032x}", context.trace_id()),
        "spanId": format!("{:016x}", context.span_id()),
        "parentSpanId": parent,
        "name": span.name,
        "kind": kind(&span.span_kind),
        "startTimeUnixNano": unix_nanos(span.start_time),
        "endTimeUnixNano": unix_nanos(span.end_time),
        "attributes": attributes(&span.attributes),
        "events": span.events.iter().map(event).collect::<Vec<_>>(),
        "links": span.links.iter().map(link).collect::<Vec<_>>(),
        "status": { "code": code, "message": message },
    })
}

fn event(event: &Event) -> JsonValue {
    json!({
        "timeUnixNano": unix_nanos(event.timestamp),
        "name": event.name,
        "attributes": attributes(&event.attributes),
    })
}

fn link(link: &Link) -> JsonValue {
    json!({
        "traceId": format!("{:032x}", link.span_context.trace_id()),
        "spanId": format!("{:016x}", link.span_context.span_id()),
        "attributes": attributes(&link.attributes),
    })
}

fn attributes(attributes: &[KeyValue]) -> Vec<JsonValue> {
    attributes
        .iter()
        .map(|kv| attribute(kv.key.as_str(), &kv.value))
        .collect()
}

fn attribute(key: &str, value: &Value) -> JsonValue {
    json!({ "key": key, "value": attribute_value(value) })
}

/// OTLP `AnyValue`. 64-bit integers travel as strings; arrays fall back to
/// their debug rendering.
fn attribute_value(value: &Value) -> JsonValue {
    match value {
        Value::Bool(b) => json!({ "boolValue": b }),
        Value::I64(i) => json!({ "intValue": i.to_string() }),
        Value::F64(f) => json!({ "doubleValue": f }),
        Value::String(s) => json!({ "stringValue": s.as_str() }),
        Value::Array(_) => json!({ "stringValue": format!("{value:?}") }),
    }
}

/// OTLP span kind codes.
const fn kind(kind: &SpanKind) -> u8 {
    match kind {
        SpanKind::Internal => 1,
        SpanKind::Server => 2,
        SpanKind::Client => 3,
        SpanKind::Producer => 4,
        SpanKind::Consumer => 5,
    }
}

fn status(status: &Status) -> (u8, String) {
    match status {
        Status::Unset => (0, String::new()),
        Status::Ok => (1, String::new()),
        Status::Error { description } => (2, description.to_string()),
    }
}

fn unix_nanos(time: SystemTime) -> String {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos().to_string()
}

impl std::fmt::Debug for SpanFormatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanFormatter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_values_use_otlp_shapes() {
        assert_eq!(attribute_value(&Value::I64(7)), json!({"intValue": "7"}));
        assert_eq!(attribute_value(&Value::Bool(true)), json!({"boolValue": true}));
        assert_eq!(attribute_value(&Value::from("x")), json!({"stringValue": "x"}));
    }

    #[test]
    fn empty_batches_still_carry_the_resource() {
        let resource = Resource::new(vec![KeyValue::new("service.name", "threadlet")]);
        let document = SpanFormatter::new(resource).format_batch(&[]);

        let scope = &document["resourceSpans"][0]["scopeSpans"][0];
        assert_eq!(scope["scope"]["name"], "threadlet");
        assert_eq!(scope["spans"], json!([]));

        let attributes = document["resourceSpans"][0]["resource"]["attributes"].as_array().unwrap();
        assert!(attributes.contains(&json!({"key": "service.name", "value": {"stringValue": "threadlet"}})));
    }
}
