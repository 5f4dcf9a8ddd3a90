//! Tracer provider that exports spans to a rotating OTLP JSON file.

use super::file_writer::{RotatingFileWriter, RotationPolicy};
use super::span_formatter::SpanFormatter;
use futures_util::future::{self, BoxFuture};
use opentelemetry::trace::TraceError;
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::trace::TracerProvider;
use std::path::PathBuf;

/// `SpanExporter` writing one OTLP JSON document per batch, one per line.
struct FileSpanExporter {
    writer: RotatingFileWriter,
    formatter: SpanFormatter,
    is_shutdown: bool,
}

impl SpanExporter for FileSpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        if self.is_shutdown {
            return Box::pin(future::ready(Err(TraceError::from("exporter is shut down"))));
        }

        let line = self.formatter.format_batch(&batch).to_string();
        let result = self
            .writer
            .write_line(&line)
            .map_err(|e| TraceError::from(e.to_string()));
        Box::pin(future::ready(result))
    }

    fn shutdown(&mut self) {
        self.is_shutdown = true;
    }
}

impl std::fmt::Debug for FileSpanExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSpanExporter")
            .field("writer", &self.writer)
            .field("is_shutdown", &self.is_shutdown)
            .finish_non_exhaustive()
    }
}

/// Builds a provider that exports every finished span straight to `file_path`.
pub fn create_tracer_provider(file_path: PathBuf, policy: RotationPolicy, resource: Resource) -> TracerProvider {
    let exporter = FileSpanExporter {
        writer: RotatingFileWriter::new(file_path, policy),
        formatter: SpanFormatter::new(resource.clone()),
        is_shutdown: false,
    };

    TracerProvider::builder()
        .with_config(opentelemetry_sdk::trace::Config::default().with_resource(resource))
        .with_simple_exporter(exporter)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{Tracer, TracerProvider as _};
    use opentelemetry::KeyValue;

    #[test]
    fn finished_spans_land_in_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("otlp.json");
        let resource = Resource::new(vec![KeyValue::new("service.name", "threadlet-test")]);

        let provider = create_tracer_provider(path.clone(), RotationPolicy::default(), resource);
        provider.tracer("test").in_span("unit-of-work", |_cx| {});
        let _ = provider.shutdown();

        let contents = std::fs::read_to_string(&path).unwrap();
        let document: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        let span = &document["resourceSpans"][0]["scopeSpans"][0]["spans"][0];
        assert_eq!(span["name"], "unit-of-work");
    }
}
