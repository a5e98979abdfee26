//! Supervised background tasks
//!
//! - `SessionTask`: task handle + cancellation token; cooperative cancel with
//!   a bounded wait, then abort
//! - `guarded`: runs a provider future at the registry boundary so that
//!   errors, panics and timeouts all come back as `Err`

use crate::error::{Error, Result};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a supervised background task
pub struct SessionTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl SessionTask {
    /// Spawn a task; the closure receives the task's cancellation token
    pub fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(f(cancel.clone()));
        Self { handle, cancel }
    }

    /// Request cooperative cancellation without waiting
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel, wait up to `grace`, then abort
    pub async fn shutdown(self, grace: Duration) {
        self.cancel.cancel();
        let mut handle = self.handle;
        if tokio::time::timeout(grace, &mut handle).await.is_err() {
            tracing::warn!(grace_ms = grace.as_millis() as u64, "Task did not stop in time, aborting");
            handle.abort();
        }
    }
}

/// Run a provider call with a time budget, mapping panics to errors
pub async fn guarded<T, Fut>(what: &str, limit: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, AssertUnwindSafe(fut).catch_unwind()).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(Error::Internal(format!("{} panicked", what))),
        Err(_) => Err(Error::Timeout(format!(
            "{} exceeded {}ms",
            what,
            limit.as_millis()
        ))),
    }
}
