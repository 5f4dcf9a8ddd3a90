//! Outcome values exchanged between host and worker.
//!
//! An [`Outcome`] is exactly one of `Ok(value)` or `Err(error)`. It is the wire
//! payload of every per-request response and of the worker's terminal `close`
//! message. Its serialized shape is `{"ok": true, "value": ...}` or
//! `{"ok": false, "error": {...}}`.

use crate::domain::error::ThreadletError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Name carried by the forced-termination failure.
pub const TERMINATED: &str = "Terminated";

/// A structurally cloned failure.
///
/// Errors cross the thread boundary as plain data: a `name` classifying the
/// failure and a human-readable `message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{name}: {message}")]
pub struct ErrorValue {
    /// Failure class, e.g. `"Error"`, `"Panic"`, `"Terminated"`.
    pub name: String,

    /// Human-readable description.
    pub message: String,
}

impl ErrorValue {
    /// Creates an error value with an explicit name.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Captures any displayable error under the generic `"Error"` name.
    pub fn from_display(error: &impl fmt::Display) -> Self {
        Self::new("Error", error.to_string())
    }

    /// The failure a worker resolves to when `close` arrives before its task
    /// body completes.
    #[must_use]
    pub fn terminated() -> Self {
        Self::new(TERMINATED, "worker terminated before its task completed")
    }

    /// Returns `true` for the forced-termination failure.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.name == TERMINATED
    }

    /// Converts a caught panic payload into an error value.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with a non-string payload".to_string());
        Self::new("Panic", message)
    }
}

impl From<ThreadletError> for ErrorValue {
    fn from(error: ThreadletError) -> Self {
        match error {
            ThreadletError::Request(value) | ThreadletError::Task(value) => value,
            other => Self::from_display(&other),
        }
    }
}

/// Result of a request or of a whole worker lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "OutcomeRepr", try_from = "OutcomeRepr")]
pub enum Outcome {
    /// Success carrying an opaque value.
    Ok(Value),
    /// Failure carrying a structurally cloned error.
    Err(ErrorValue),
}

impl Outcome {
    /// Encodes a typed result, capturing encoding failures as `Err`.
    pub fn encode<T, E>(result: std::result::Result<T, E>) -> Self
    where
        T: Serialize,
        E: fmt::Display,
    {
        match result {
            Ok(value) => match serde_json::to_value(value) {
                Ok(value) => Self::Ok(value),
                Err(e) => Self::Err(ErrorValue::new("SerializationError", e.to_string())),
            },
            Err(e) => Self::Err(ErrorValue::from_display(&e)),
        }
    }

    /// Returns `true` if this is a success.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Returns the error, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&ErrorValue> {
        match self {
            Self::Ok(_) => None,
            Self::Err(e) => Some(e),
        }
    }
}

/// Flat serde representation of [`Outcome`].
#[derive(Serialize, Deserialize)]
struct OutcomeRepr {
    ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorValue>,
}

impl From<Outcome> for OutcomeRepr {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Ok(value) => Self {
                ok: true,
                value: Some(value),
                error: None,
            },
            Outcome::Err(error) => Self {
                ok: false,
                value: None,
                error: Some(error),
            },
        }
    }
}

impl TryFrom<OutcomeRepr> for Outcome {
    type Error = String;

    fn try_from(repr: OutcomeRepr) -> std::result::Result<Self, Self::Error> {
        if repr.ok {
            Ok(Self::Ok(repr.value.unwrap_or(Value::Null)))
        } else {
            repr.error
                .map(Self::Err)
                .ok_or_else(|| "failed outcome is missing its error".to_string())
        }
    }
}
