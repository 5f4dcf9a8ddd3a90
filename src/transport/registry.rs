//! Worker entry-point registry.
//!
//! A script locator names a worker entry point. Hosts launch workers by locator,
//! and the registry resolves it to the function that runs on the new thread.

use crate::transport::port::WorkerPort;
use futures_util::future::LocalBoxFuture;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A worker entry point.
///
/// Called once on the freshly spawned worker thread with the worker half of the
/// transport. The returned future runs on that thread and need not be `Send`.
pub type WorkerEntry = Arc<dyn Fn(WorkerPort) -> LocalBoxFuture<'static, ()> + Send + Sync>;

/// Maps script locators to worker entry points.
///
/// # Examples
///
/// ```
/// use threadlet::transport::WorkerRegistry;
/// use threadlet::worker::{run_worker, Requests};
///
/// let mut registry = WorkerRegistry::new();
/// registry.register("echo", |port| {
///     Box::pin(run_worker(port, |(), requests: Requests<String, String>| async move {
///         requests.for_each(|text| async move { Ok::<_, String>(text) }).await;
///         Ok::<_, String>(())
///     }))
/// });
/// assert!(registry.contains("echo"));
/// ```
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    entries: BTreeMap<String, WorkerEntry>,
}

impl WorkerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entry` under `script`, replacing any previous entry.
    pub fn register<F>(&mut self, script: impl Into<String>, entry: F) -> &mut Self
    where
        F: Fn(WorkerPort) -> LocalBoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let script = script.into();
        tracing::debug!(script = %script, "registering worker entry point");
        self.entries.insert(script, Arc::new(entry));
        self
    }

    /// Returns `true` if `script` is registered.
    #[must_use]
    pub fn contains(&self, script: &str) -> bool {
        self.entries.contains_key(script)
    }

    /// Resolves a script locator.
    #[must_use]
    pub fn resolve(&self, script: &str) -> Option<WorkerEntry> {
        self.entries.get(script).cloned()
    }

    /// Registered locators, in lexical order.
    ///
    /// # Returns
    ///
    /// An iterator borrowing the registry; used for diagnostics when a locator
    /// does not resolve.
    pub fn scripts(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("scripts", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle(_port: WorkerPort) -> LocalBoxFuture<'static, ()> {
        Box::pin(async {})
    }

    #[test]
    fn later_registrations_replace_earlier_ones() {
        let mut registry = WorkerRegistry::new();
        registry.register("zeta", idle).register("alpha", idle).register("zeta", idle);

        assert_eq!(registry.scripts().collect::<Vec<_>>(), vec!["alpha", "zeta"]);
        assert!(registry.contains("alpha"));
        assert!(registry.resolve("beta").is_none());
        assert_eq!(format!("{registry:?}"), r#"WorkerRegistry { scripts: ["alpha", "zeta"] }"#);
    }
}
