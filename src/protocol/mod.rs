//! Wire-level protocol between a host and its worker.
//!
//! - `messages`: tagged control (host → worker) and lifecycle (worker → host) messages
//! - `channel`: ephemeral single-use response channels, one per `send`

pub mod channel;
pub mod messages;

pub use channel::{ResponseChannel, ResponsePort};
pub use messages::{ControlMessage, LifecycleMessage, TraceContext};
