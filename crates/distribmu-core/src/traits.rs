//! Core trait for distributed mutexes.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::context::Context;
use crate::error::LockResult;

/// A distributed mutual exclusion lock over one key in a remote store.
///
/// One instance binds one lock key, one holder identity, one lease duration
/// (TTL) and one store handle. It represents a single holder's view of the
/// lock: mutating operations take `&mut self`, so sharing an instance between
/// concurrent critical sections requires external synchronization. Use a
/// separate instance per logical attempt instead.
///
/// Every operation that touches the store runs on the caller's task and is
/// raced against `ctx`.
///
/// # Example
///
/// ```rust,ignore
/// use distribmu_core::prelude::*;
///
/// async fn exclusive(mutex: &mut impl DistributedMutex) -> LockResult<()> {
///     let ctx = Context::background();
///     if !mutex.lock_wait(&ctx, Duration::from_secs(5)).await? {
///         return Ok(()); // someone else kept it
///     }
///     perform_critical_section().await;
///     mutex.unlock(&ctx, false).await
/// }
/// ```
pub trait DistributedMutex: Send + Sync {
    /// The contested key.
    fn key(&self) -> &str;

    /// The identity stored as the key's value while this instance holds it.
    fn holder_id(&self) -> &str;

    /// Lease duration applied on acquire and refresh.
    fn ttl(&self) -> Duration;

    /// Locally tracked expiry of the current lease.
    ///
    /// `None` until the first successful acquire and after an unlock. The
    /// value is advisory: the store decides when the key actually expires.
    fn expire_time(&self) -> Option<Instant>;

    /// Attempts a single non-blocking acquisition.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Lock acquired, expire time advanced
    /// * `Ok(false)` - Key is held by someone (not an error)
    /// * `Err(...)` - Transport or protocol failure
    fn lock(&mut self, ctx: &Context) -> impl Future<Output = LockResult<bool>> + Send;

    /// Acquires the lock, waiting up to `timeout` for a busy key to be released.
    ///
    /// Running out of `timeout` is not an error: the call returns `Ok(false)`.
    fn lock_wait(
        &mut self,
        ctx: &Context,
        timeout: Duration,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Blocks until the key is observed released or `timeout` elapses.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Key is absent (or was deleted/expired while waiting)
    /// * `Err(LockError::WaitTimeout)` - Key still present when the budget ran out
    fn wait_key_release(
        &self,
        ctx: &Context,
        timeout: Duration,
    ) -> impl Future<Output = LockResult<()>> + Send;

    /// Releases the lock. Deleting an already-absent key succeeds.
    ///
    /// `force` deletes even when the local lease has already run out; how a
    /// backend treats a non-forced unlock is documented on the driver.
    fn unlock(&mut self, ctx: &Context, force: bool) -> impl Future<Output = LockResult<()>> + Send;

    /// Extends the lease after verifying this instance still holds the key.
    ///
    /// Returns `Err(LockError::LockLost)` when another holder owns the key,
    /// including the case where it took over between the ownership check and
    /// the extension. The double check narrows that window but cannot close
    /// it: this is not a fencing token.
    fn refresh_ttl(&mut self, ctx: &Context) -> impl Future<Output = LockResult<()>> + Send;
}
