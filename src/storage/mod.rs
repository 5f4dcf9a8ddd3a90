//! Key/value log storage for worker task bodies.
//!
//! # Modules
//!
//! - `backend`: the dyn-compatible [`Store`] trait and typed helpers
//! - `models`: [`Record`] and the in-memory log table
//! - `memory`: in-process implementation
//! - `json`: JSON file implementation with atomic writes

pub mod backend;
pub mod json;
pub mod memory;
pub mod models;

pub use backend::{Store, StoreExt};
pub use json::JsonStore;
pub use memory::MemoryStore;
pub use models::Record;
