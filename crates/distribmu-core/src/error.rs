//! Error types for distributed mutex operations.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during mutex operations.
///
/// Contention is not an error: a busy key is reported as `Ok(false)` by
/// [`lock`](crate::DistributedMutex::lock) and friends.
#[derive(Error, Debug)]
pub enum LockError {
    /// A bounded wait for the key to be released ran out of budget.
    #[error("wait for key release timed out after {0:?}")]
    WaitTimeout(Duration),

    /// Ownership verification found a different (or no) holder.
    ///
    /// Anything done under the lock must be assumed unprotected from here on.
    #[error("lock was lost: {0}")]
    LockLost(String),

    /// The caller cancelled the operation's context.
    #[error("lock operation was cancelled")]
    Cancelled,

    /// The operation's context deadline passed.
    #[error("lock operation exceeded its context deadline")]
    DeadlineExceeded,

    /// `do_with_max_retry` used up every acquisition attempt.
    #[error("failed to acquire lock after {attempts} attempts")]
    RetryExhausted { attempts: u32 },

    /// The mutex configuration is unusable.
    #[error("invalid mutex configuration: {0}")]
    InvalidConfig(String),

    /// Backend connection failed.
    #[error("connection error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Backend-specific protocol error.
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LockError {
    /// Wraps a message as a [`LockError::Backend`].
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into().into())
    }

    pub fn is_wait_timeout(&self) -> bool {
        matches!(self, Self::WaitTimeout(_))
    }

    pub fn is_lock_lost(&self) -> bool {
        matches!(self, Self::LockLost(_))
    }

    /// True for both explicit cancellation and an expired context deadline.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

/// Result type for mutex operations.
pub type LockResult<T> = Result<T, LockError>;
