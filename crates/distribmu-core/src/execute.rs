//! Acquire-run-release helpers built on [`DistributedMutex`].

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::context::Context;
use crate::error::LockError;
use crate::traits::DistributedMutex;

/// Extension trait running caller logic while a [`DistributedMutex`] is held.
///
/// `logic` returns the caller's own error type; lock failures are converted
/// into it through `From<LockError>`. The lock is released with a non-forced
/// unlock once `logic` finishes, whether it succeeded or not. An unlock
/// failure after `logic` has run is logged and does not replace its result.
pub trait DistributedMutexExt: DistributedMutex {
    /// Retries [`lock_wait`](DistributedMutex::lock_wait) until the lock is
    /// acquired, then runs `logic`.
    ///
    /// This never gives up on a permanently contested key. Bound it with a
    /// [`Context`] deadline or prefer [`do_with_max_retry`](Self::do_with_max_retry).
    fn do_with_must_done<F, Fut, T, E>(
        &mut self,
        ctx: &Context,
        timeout: Duration,
        logic: F,
    ) -> impl Future<Output = Result<T, E>> + Send
    where
        Self: Sized,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<LockError> + Send,
    {
        async move {
            while !self.lock_wait(ctx, timeout).await? {
                debug!(mutex.key = %self.key(), "lock still busy, waiting again");
            }
            run_then_unlock(self, ctx, logic).await
        }
    }

    /// Like [`do_with_must_done`](Self::do_with_must_done) but gives up after
    /// `max` acquisition attempts with [`LockError::RetryExhausted`]. `logic`
    /// does not run in that case.
    fn do_with_max_retry<F, Fut, T, E>(
        &mut self,
        ctx: &Context,
        max: u32,
        timeout: Duration,
        logic: F,
    ) -> impl Future<Output = Result<T, E>> + Send
    where
        Self: Sized,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: From<LockError> + Send,
    {
        async move {
            for attempt in 1..=max {
                if self.lock_wait(ctx, timeout).await? {
                    return run_then_unlock(self, ctx, logic).await;
                }
                debug!(mutex.key = %self.key(), attempt, max, "lock still busy");
            }
            Err(LockError::RetryExhausted { attempts: max }.into())
        }
    }
}

impl<T: DistributedMutex> DistributedMutexExt for T {}

async fn run_then_unlock<M, F, Fut, T, E>(mutex: &mut M, ctx: &Context, logic: F) -> Result<T, E>
where
    M: DistributedMutex,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let result = logic().await;
    if let Err(err) = mutex.unlock(ctx, false).await {
        warn!(
            mutex.key = %mutex.key(),
            logic_ok = result.is_ok(),
            error = %err,
            "failed to unlock after running logic"
        );
    }
    result
}
