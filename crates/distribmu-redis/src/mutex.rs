//! Poll-based distributed mutex.

use std::time::Duration;

use distribmu_core::context::Context;
use distribmu_core::error::{LockError, LockResult};
use distribmu_core::traits::DistributedMutex;
use tokio::time::Instant;
use tracing::{Span, debug, field, instrument, warn};

use crate::cache::TtlCache;

/// Default polling granularity of the wait loops.
pub const DEFAULT_PRECISION: Duration = Duration::from_millis(100);

/// A distributed mutex over a [`TtlCache`] such as Redis.
///
/// The cache offers no change notifications, so waiting means polling the
/// key every `precision` until it disappears or the budget runs out.
pub struct RedisMutex<C> {
    cache: C,
    key: String,
    holder_id: String,
    ttl: Duration,
    precision: Duration,
    expire_time: Option<Instant>,
}

impl<C: TtlCache> RedisMutex<C> {
    /// Creates a mutex for `key` polling at [`DEFAULT_PRECISION`].
    pub fn new(cache: C, key: impl Into<String>, holder_id: impl Into<String>, ttl: Duration) -> Self {
        Self::with_precision(cache, key, holder_id, ttl, DEFAULT_PRECISION)
    }

    /// Creates a mutex for `key` polling every `precision` (at least 1ms).
    pub fn with_precision(
        cache: C,
        key: impl Into<String>,
        holder_id: impl Into<String>,
        ttl: Duration,
        precision: Duration,
    ) -> Self {
        Self {
            cache,
            key: key.into(),
            holder_id: holder_id.into(),
            ttl,
            precision: precision.max(Duration::from_millis(1)),
            expire_time: None,
        }
    }

    pub fn precision(&self) -> Duration {
        self.precision
    }

    /// Returns the underlying cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// One precision interval, cut short so a wait never overruns `timeout`.
    fn poll_interval(&self, start: Instant, timeout: Duration) -> Duration {
        self.precision.min(timeout.saturating_sub(start.elapsed()))
    }

    async fn ensure_owned(&self, ctx: &Context, stage: &str) -> LockResult<()> {
        let current = ctx.run(self.cache.get(&self.key)).await?;
        if current.as_deref() == Some(self.holder_id.as_str()) {
            return Ok(());
        }

        warn!(holder = %self.holder_id, current = ?current, stage, "lock no longer held");
        Err(LockError::LockLost(match current {
            Some(other) => format!("key '{}' is held by '{}' {}", self.key, other, stage),
            None => format!("key '{}' no longer exists {}", self.key, stage),
        }))
    }
}

impl<C: TtlCache> DistributedMutex for RedisMutex<C> {
    fn key(&self) -> &str {
        &self.key
    }

    fn holder_id(&self) -> &str {
        &self.holder_id
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn expire_time(&self) -> Option<Instant> {
        self.expire_time
    }

    #[instrument(skip(self, ctx), fields(mutex.key = %self.key, backend = "redis", acquired = field::Empty))]
    async fn lock(&mut self, ctx: &Context) -> LockResult<bool> {
        let set = ctx
            .run(self.cache.set_if_absent(&self.key, &self.holder_id, self.ttl))
            .await?;
        Span::current().record("acquired", set);

        if set {
            self.expire_time = Some(Instant::now() + self.ttl);
        }
        Ok(set)
    }

    /// Retries acquisition every precision interval until it succeeds or
    /// `timeout` is used up, in which case it returns `Ok(false)`. The last
    /// sleep is shortened so the final attempt lands on the deadline.
    #[instrument(skip(self, ctx), fields(mutex.key = %self.key, backend = "redis", acquired = field::Empty))]
    async fn lock_wait(&mut self, ctx: &Context, timeout: Duration) -> LockResult<bool> {
        let start = Instant::now();
        loop {
            if self.lock(ctx).await? {
                Span::current().record("acquired", true);
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                debug!(elapsed_ms = start.elapsed().as_millis() as u64, "gave up waiting");
                Span::current().record("acquired", false);
                return Ok(false);
            }
            ctx.sleep(self.poll_interval(start, timeout)).await?;
        }
    }

    #[instrument(skip(self, ctx), fields(mutex.key = %self.key, backend = "redis"))]
    async fn wait_key_release(&self, ctx: &Context, timeout: Duration) -> LockResult<()> {
        let start = Instant::now();
        loop {
            // Check existence rather than TTL: the key may be deleted by hand.
            if !ctx.run(self.cache.exists(&self.key)).await? {
                debug!(elapsed_ms = start.elapsed().as_millis() as u64, "key released");
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(LockError::WaitTimeout(timeout));
            }
            ctx.sleep(self.poll_interval(start, timeout)).await?;
        }
    }

    /// Always deletes the key, whatever `force` says: an expired entry has
    /// already removed itself, so there is nothing to protect.
    #[instrument(skip(self, ctx), fields(mutex.key = %self.key, backend = "redis"))]
    async fn unlock(&mut self, ctx: &Context, force: bool) -> LockResult<()> {
        if !ctx.run(self.cache.delete(&self.key)).await? {
            debug!(force, "key already absent");
        }
        self.expire_time = None;
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(mutex.key = %self.key, backend = "redis"))]
    async fn refresh_ttl(&mut self, ctx: &Context) -> LockResult<()> {
        self.ensure_owned(ctx, "before refresh").await?;

        if !ctx.run(self.cache.expire(&self.key, self.ttl)).await? {
            warn!(holder = %self.holder_id, "lock key vanished during refresh");
            return Err(LockError::LockLost(format!(
                "key '{}' expired before its TTL could be refreshed",
                self.key
            )));
        }

        // Another holder may have won the key between the check and the PEXPIRE.
        self.ensure_owned(ctx, "after refresh").await?;

        self.expire_time = Some(Instant::now() + self.ttl);
        Ok(())
    }
}
