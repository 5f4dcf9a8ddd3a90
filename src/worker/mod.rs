//! Worker-side runtime.
//!
//! Code in this module runs on the background worker thread. It adapts the
//! transport's message stream into the worker protocol and drives the
//! user-supplied task body.
//!
//! # Architecture
//!
//! - `runtime`: handshake, `AwaitingInit → Running → Finalized` state machine,
//!   first-writer-wins terminal outcome
//! - `requests`: the request stream handed to the task body, concurrent dispatch

pub mod requests;
pub mod runtime;

pub use requests::{Request, Requests, Responder, NOT_ACCEPTING, UNANSWERED};
pub use runtime::{run_worker, TerminalOutcome};
