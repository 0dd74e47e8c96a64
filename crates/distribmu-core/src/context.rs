//! Cancellation and deadline scope for mutex operations.

use std::future::{Future, pending};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

use crate::error::{LockError, LockResult};

/// Caller-supplied scope that every blocking mutex operation races against.
///
/// - [`Context::background`] - never cancelled, no deadline
/// - [`Context::with_cancel`] - cancelled through the returned [`CancelHandle`]
/// - [`Context::with_timeout`] / [`Context::with_deadline`] - expires at a fixed instant
///
/// Cancellation surfaces as [`LockError::Cancelled`] and an expired deadline as
/// [`LockError::DeadlineExceeded`]. Neither is ever reported as a wait timeout.
///
/// # Example
///
/// ```rust,ignore
/// let (ctx, cancel) = Context::with_cancel();
/// tokio::spawn(async move {
///     tokio::signal::ctrl_c().await.ok();
///     cancel.cancel();
/// });
/// mutex.lock_wait(&ctx, Duration::from_secs(30)).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels every [`Context`] derived from [`Context::with_cancel`].
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A cancellable context and the handle that cancels it.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        (
            Self {
                cancel: Some(receiver),
                deadline: None,
            },
            CancelHandle { sender },
        )
    }

    /// Child context expiring `timeout` from now, or earlier if this one does.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Child context expiring at `deadline`, or earlier if this one does.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        };
        Self {
            cancel: self.cancel.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the error this context currently fails with, if any.
    pub fn err(&self) -> Option<LockError> {
        if self.cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Some(LockError::Cancelled);
        }
        if self.deadline.is_some_and(|d| d <= Instant::now()) {
            return Some(LockError::DeadlineExceeded);
        }
        None
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> LockError {
        let cancelled = async {
            match &self.cancel {
                Some(receiver) => {
                    let mut receiver = receiver.clone();
                    // A dropped handle can no longer cancel.
                    if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
                        pending::<()>().await;
                    }
                }
                None => pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => LockError::Cancelled,
            _ = expired => LockError::DeadlineExceeded,
        }
    }

    /// Runs `fut` to completion unless the context ends first.
    pub async fn run<T, F>(&self, fut: F) -> LockResult<T>
    where
        F: Future<Output = LockResult<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            result = fut => result,
        }
    }

    /// Sleeps for `duration` unless the context ends first.
    pub async fn sleep(&self, duration: Duration) -> LockResult<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}
