//! Structured worker scopes.
//!
//! [`with_worker`] ties a worker's lifetime to an async block: the worker is
//! acquired before the block runs and torn down, with its outcome awaited, before
//! the call returns, whether the block succeeded, failed, or was interrupted by
//! a transport error.

use crate::domain::{Result, ThreadletError};
use crate::host::handle::WorkerHandle;
use crate::host::options::WorkerOptions;
use crate::host::resource::WorkerResource;
use crate::transport::WorkerRegistry;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Runs `scope` with a handle to a freshly acquired worker.
///
/// A transport error raised by the worker while `scope` runs aborts the scope
/// with [`ThreadletError::Transport`]. In every case the worker is closed and
/// its terminal outcome awaited before this returns.
///
/// # Errors
///
/// Acquisition errors, transport errors, or whatever `scope` returns.
///
/// # Examples
///
/// ```
/// use threadlet::builtin::builtin_registry;
/// use threadlet::host::{with_worker, WorkerOptions};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> threadlet::Result<()> {
/// let registry = builtin_registry();
/// let reply: String = with_worker(&registry, WorkerOptions::new("echo"), |worker| async move {
///     worker.send(&"ping").await
/// })
/// .await?;
/// assert_eq!(reply, "pong");
/// # Ok(())
/// # }
/// ```
pub async fn with_worker<T, F, Fut>(registry: &WorkerRegistry, options: WorkerOptions, scope: F) -> Result<T>
where
    F: FnOnce(WorkerHandle) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_worker_until(registry, options, CancellationToken::new(), scope).await
}

/// Like [`with_worker`], but also stops the scope when `cancel` fires.
///
/// Cancellation still closes the worker and awaits its outcome before
/// returning [`ThreadletError::Cancelled`].
///
/// # Errors
///
/// Acquisition errors, transport errors, [`ThreadletError::Cancelled`], or
/// whatever `scope` returns.
pub async fn with_worker_until<T, F, Fut>(
    registry: &WorkerRegistry,
    options: WorkerOptions,
    cancel: CancellationToken,
    scope: F,
) -> Result<T>
where
    F: FnOnce(WorkerHandle) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut resource = WorkerResource::acquire(registry, options).await?;

    let result = {
        let scope = scope(resource.handle());
        tokio::select! {
            result = scope => result,
            message = resource.transport_failure() => Err(ThreadletError::Transport(message)),
            () = cancel.cancelled() => {
                tracing::debug!(script = %resource.handle().script(), "worker scope cancelled");
                Err(ThreadletError::Cancelled)
            }
        }
    };

    let outcome = resource.teardown().await;
    if let Some(error) = outcome.error() {
        tracing::debug!(error = %error, "worker finished with a failure");
    }

    result
}
