//! Worker transport: the out-of-band duplex channel between host and worker.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ControlMessage    ┌──────────────────────────┐
//! │   HostPort   │ ──────────────────► │ WorkerPort               │
//! │              │ ◄────────────────── │ (native thread, LocalSet)│
//! └──────────────┘    WorkerEvent      └──────────────────────────┘
//! ```
//!
//! - `port`: duplex port pair and the worker event stream
//! - `registry`: script locator → entry point
//! - `native`: dedicated OS thread per worker, panic capture

pub mod native;
pub mod port;
pub mod registry;

pub use native::{NativeOptions, NativeWorker};
pub use port::{duplex, EventSink, HostPort, WorkerEvent, WorkerPort};
pub use registry::{WorkerEntry, WorkerRegistry};
