//! Structured logging and OpenTelemetry trace export.
//!
//! ```text
//! tracing macros → EnvFilter ─┬→ fmt layer → stderr
//!                             └→ tracing-opentelemetry → FileSpanExporter → rotating OTLP JSON file
//! ```
//!
//! Trace level resolution:
//! 1. `RUST_LOG` environment variable
//! 2. `trace_level` in [`Config`](crate::Config)
//! 3. Default: `"info"`
//!
//! Spans opened on a worker thread join the host's trace through the
//! [`TraceContext`](crate::protocol::TraceContext) carried by control messages.
//!
//! # Modules
//!
//! - [`init`]: subscriber setup
//! - `tracer`: tracer provider with file export
//! - `span_formatter`: OTLP JSON encoding
//! - `file_writer`: size-rotated file writer

mod file_writer;
pub mod init;
mod span_formatter;
mod tracer;

pub use file_writer::{RotationPolicy, DEFAULT_MAX_BACKUPS, DEFAULT_MAX_BYTES};
pub use init::init_tracing;
