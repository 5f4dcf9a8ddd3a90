//! Domain layer for threadlet.
//!
//! Core value types shared by both halves of the worker protocol, independent of
//! the transport and runtime that carry them.
//!
//! # Organization
//!
//! - [`error`]: Error types and result aliases
//! - [`outcome`]: Structurally cloned success/failure values
//!
//! # Examples
//!
//! ```
//! use threadlet::domain::{ErrorValue, Outcome};
//!
//! let outcome = Outcome::Err(ErrorValue::terminated());
//! assert!(outcome.error().is_some_and(ErrorValue::is_terminated));
//! ```

pub mod error;
pub mod outcome;

pub use error::{Result, ThreadletError};
pub use outcome::{ErrorValue, Outcome};
