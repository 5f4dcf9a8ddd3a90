//! Tracing subscriber setup.

use super::file_writer::RotationPolicy;
use super::tracer;
use crate::Config;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::resource::Resource;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Service name reported in exported traces.
const SERVICE_NAME: &str = "threadlet";

/// Installs the global tracing subscriber.
///
/// The pipeline is:
/// 1. An `EnvFilter` from `RUST_LOG`, else `config.trace_level`, else `"info"`
/// 2. A human-readable stderr layer when `config.log_to_stderr` is set
/// 3. An OpenTelemetry layer exporting OTLP JSON to `config.trace_file`, if set
///
/// Only the first call takes effect. A trace file whose directory cannot be
/// created disables export without failing.
///
/// # Example
///
/// ```rust
/// use threadlet::observability::init_tracing;
/// use threadlet::Config;
///
/// let config = Config {
///     trace_level: Some("debug".to_string()),
///     ..Default::default()
/// };
///
/// init_tracing(&config);
/// tracing::debug!("tracing is now active");
/// ```
pub fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.trace_level.as_deref().unwrap_or("info"))
    });

    let fmt_layer = config.log_to_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed()
    });

    let otel_layer = config.trace_file.as_ref().and_then(|trace_file| {
        if let Some(parent) = trace_file.parent() {
            std::fs::create_dir_all(parent).ok()?;
        }

        let resource = Resource::new(vec![opentelemetry::KeyValue::new("service.name", SERVICE_NAME)]);
        let policy = RotationPolicy {
            max_bytes: config.trace_max_bytes,
            max_backups: config.trace_max_backups,
        };
        let provider = tracer::create_tracer_provider(trace_file.clone(), policy, resource);
        Some(OpenTelemetryLayer::new(provider.tracer(SERVICE_NAME)).boxed())
    });

    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(otel_layer)
        .with(filter)
        .try_init();
}
