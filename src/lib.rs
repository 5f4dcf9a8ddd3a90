//! Threadlet: structured, request/response workers on dedicated threads.
//!
//! A host launches a worker by script locator, exchanges a handshake with it,
//! sends it requests that are answered on private one-shot channels, and tears
//! it down with a guaranteed terminal outcome:
//! - Each `send` gets exactly one response, regardless of concurrency
//! - One failing request never fails the others or the worker
//! - Every worker lifetime ends with exactly one terminal outcome
//! - Leaving a worker scope always posts `close` and awaits that outcome
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  CLI (main.rs)                                      │  ← Entry point
//! └─────────────────────────────────────────────────────┘
//!                        │
//! ┌─────────────────────────────────────────────────────┐
//! │  Host Layer (host/)                                 │  ← Scoped resource
//! │  - Acquisition + handshake                          │
//! │  - send / outcome                                   │
//! │  - Teardown, with_worker scopes                     │
//! └─────────────────────────────────────────────────────┘
//!                        │
//! ┌───────────────┐   ┌───────────────┐   ┌───────────────┐
//! │ Protocol      │   │ Transport     │   │ Worker Layer  │
//! │ (protocol/)   │   │ (transport/)  │   │ (worker/)     │
//! │ - Messages    │   │ - Duplex port │   │ - State machine│
//! │ - Response    │   │ - Registry    │   │ - Requests    │
//! │   channels    │   │ - OS threads  │   │ - Dispatch    │
//! └───────────────┘   └───────────────┘   └───────────────┘
//!                        │
//! ┌─────────────────────────────────────────────────────┐
//! │  Built-in workers (builtin/) + Storage (storage/)   │
//! │  - echo, kv                                         │
//! │  - Store trait, memory and JSON stores              │
//! └─────────────────────────────────────────────────────┘
//!                        │
//! ┌─────────────────────────────────────────────────────┐
//! │  Domain (domain/), Infrastructure, Observability    │
//! │  - Error + outcome types                            │
//! │  - Data paths                                       │
//! │  - tracing + OpenTelemetry file export              │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`host`]: worker resources, handles and scopes
//! - [`worker`]: worker-side runtime and the requests abstraction
//! - [`protocol`]: control/lifecycle messages and response channels
//! - [`transport`]: duplex ports, registry, native threads
//! - [`storage`]: key/value log stores
//! - [`builtin`]: `echo` and `kv` workers
//! - [`domain`]: error and outcome types
//! - [`infrastructure`]: platform paths
//! - [`observability`]: tracing setup
//!
//! # Example
//!
//! ```rust
//! use threadlet::transport::WorkerRegistry;
//! use threadlet::worker::{run_worker, Requests};
//! use threadlet::{with_worker, WorkerOptions};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> threadlet::Result<()> {
//! let mut registry = WorkerRegistry::new();
//! registry.register("double", |port| {
//!     Box::pin(run_worker(port, |(), requests: Requests<u64, u64>| async move {
//!         requests.for_each(|n| async move { Ok::<_, String>(n * 2) }).await;
//!         Ok::<_, String>(())
//!     }))
//! });
//!
//! let doubled: u64 = with_worker(&registry, WorkerOptions::new("double"), |worker| async move {
//!     worker.send(&21).await
//! })
//! .await?;
//! assert_eq!(doubled, 42);
//! # Ok(())
//! # }
//! ```

#![allow(clippy::multiple_crate_versions)]

pub mod builtin;
pub mod domain;
pub mod host;
pub mod infrastructure;
pub mod observability;
pub mod protocol;
pub mod storage;
pub mod transport;
pub mod worker;

pub use domain::{ErrorValue, Outcome, Result, ThreadletError};
pub use host::{with_worker, with_worker_until, WorkerHandle, WorkerOptions, WorkerResource};
pub use transport::WorkerRegistry;
pub use worker::{run_worker, Request, Requests};

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the `kv` worker's store inside the data directory.
pub const STORE_FILE: &str = "store.json";

/// Runtime configuration.
///
/// Loaded from a TOML file or a flat string map; every field has a default.
///
/// # Example
///
/// ```toml
/// trace_level = "debug"
/// log_to_stderr = true
/// trace_file = "/tmp/threadlet-otlp.json"
/// data_dir = "~/.local/share/threadlet"
/// handshake_timeout_ms = 2000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Tracing filter directive. `RUST_LOG` overrides it. Default: `"info"`
    pub trace_level: Option<String>,

    /// Print human-readable logs to stderr. Default: `true`
    pub log_to_stderr: bool,

    /// OTLP JSON trace export file. Export is disabled when unset.
    pub trace_file: Option<PathBuf>,

    /// Trace file size that triggers rotation. Default: 10 MiB
    pub trace_max_bytes: u64,

    /// Rotated trace files to keep. Default: 3
    pub trace_max_backups: usize,

    /// Directory for the `kv` worker's store. Default: [`infrastructure::data_dir`]
    pub data_dir: Option<PathBuf>,

    /// Handshake bound in milliseconds. Default: 5000
    pub handshake_timeout_ms: u64,

    /// Teardown bound in milliseconds. Default: 5000
    pub shutdown_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trace_level: None,
            log_to_stderr: true,
            trace_file: None,
            trace_max_bytes: observability::DEFAULT_MAX_BYTES,
            trace_max_backups: observability::DEFAULT_MAX_BACKUPS,
            data_dir: None,
            handshake_timeout_ms: host::DEFAULT_HANDSHAKE_TIMEOUT_MS,
            shutdown_timeout_ms: host::DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Parses configuration from a flat string map.
    ///
    /// Unparseable values fall back to their defaults. Paths expand a leading `~`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::collections::BTreeMap;
    /// use threadlet::Config;
    ///
    /// let mut map = BTreeMap::new();
    /// map.insert("trace_level".to_string(), "debug".to_string());
    /// map.insert("handshake_timeout_ms".to_string(), "250".to_string());
    /// map.insert("log_to_stderr".to_string(), "nope".to_string());
    ///
    /// let config = Config::from_map(&map);
    /// assert_eq!(config.trace_level.as_deref(), Some("debug"));
    /// assert_eq!(config.handshake_timeout_ms, 250);
    /// assert!(config.log_to_stderr);
    /// ```
    #[must_use]
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str, default: u64| {
            map.get(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        let path = |key: &str| {
            map.get(key)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(infrastructure::expand_tilde)
        };

        Self {
            trace_level: map.get("trace_level").cloned(),
            log_to_stderr: map
                .get("log_to_stderr")
                .and_then(|s| parse_bool(s))
                .unwrap_or(defaults.log_to_stderr),
            trace_file: path("trace_file"),
            trace_max_bytes: number("trace_max_bytes", defaults.trace_max_bytes),
            trace_max_backups: map
                .get("trace_max_backups")
                .and_then(|s| s.trim().parse::<usize>().ok())
                .unwrap_or(defaults.trace_max_backups),
            data_dir: path("data_dir"),
            handshake_timeout_ms: number("handshake_timeout_ms", defaults.handshake_timeout_ms),
            shutdown_timeout_ms: number("shutdown_timeout_ms", defaults.shutdown_timeout_ms),
        }
    }

    /// Parses TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadletError::Config`] for malformed TOML or unknown keys.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let mut config: Self =
            toml::from_str(contents).map_err(|e| ThreadletError::Config(format!("invalid configuration: {e}")))?;
        config.trace_file = config.trace_file.map(|p| expand_path(&p));
        config.data_dir = config.data_dir.map(|p| expand_path(&p));
        Ok(config)
    }

    /// Loads TOML configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a configuration
    /// error if it cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = ?path, "loading configuration");
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// How long acquisition waits for a worker's `open` message.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// How long teardown waits for a worker to settle and its thread to exit.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Launch options for `script` carrying the configured timeouts.
    ///
    /// # Parameters
    ///
    /// * `script` - Registry locator of the worker to launch
    ///
    /// # Returns
    ///
    /// [`WorkerOptions`] with no init data; add it with
    /// [`WorkerOptions::with_data`].
    #[must_use]
    pub fn worker_options(&self, script: impl Into<String>) -> WorkerOptions {
        WorkerOptions::new(script)
            .with_handshake_timeout(self.handshake_timeout())
            .with_shutdown_timeout(self.shutdown_timeout())
    }

    /// Location of the `kv` worker's JSON store.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(infrastructure::data_dir)
            .join(STORE_FILE)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn expand_path(path: &Path) -> PathBuf {
    path.to_str().map_or_else(|| path.to_path_buf(), infrastructure::expand_tilde)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert!(config.log_to_stderr);
        assert_eq!(config.trace_max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.trace_max_backups, 3);
        assert_eq!(config.handshake_timeout(), Duration::from_secs(5));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn map_values_fall_back_on_parse_errors() {
        let map = BTreeMap::from([
            ("shutdown_timeout_ms".to_string(), "soon".to_string()),
            ("log_to_stderr".to_string(), "off".to_string()),
            ("data_dir".to_string(), "/var/lib/threadlet".to_string()),
        ]);

        let config = Config::from_map(&map);
        assert_eq!(config.shutdown_timeout_ms, host::DEFAULT_SHUTDOWN_TIMEOUT_MS);
        assert!(!config.log_to_stderr);
        assert_eq!(config.store_path(), PathBuf::from("/var/lib/threadlet/store.json"));
    }

    #[test]
    fn toml_files_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "trace_level = \"debug\"\nhandshake_timeout_ms = 100").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.trace_level.as_deref(), Some("debug"));

        let options = config.worker_options("echo");
        assert_eq!(options.handshake_timeout, Duration::from_millis(100));
        assert_eq!(options.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn unknown_toml_keys_are_rejected() {
        let err = Config::from_toml_str("scan_depth = 4").unwrap_err();
        assert!(matches!(err, ThreadletError::Config(_)));
    }
}
