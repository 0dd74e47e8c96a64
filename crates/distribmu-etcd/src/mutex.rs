//! Watch-based distributed mutex.

use std::time::Duration;

use distribmu_core::context::Context;
use distribmu_core::error::{LockError, LockResult};
use distribmu_core::traits::DistributedMutex;
use tokio::time::Instant;
use tracing::{Span, debug, field, instrument, warn};

use crate::store::WatchStore;

/// A distributed mutex over a [`WatchStore`] such as etcd.
///
/// Waiters subscribe to the key's change notifications and retry
/// acquisition once they see it deleted or expired.
pub struct EtcdMutex<S> {
    store: S,
    key: String,
    holder_id: String,
    ttl: Duration,
    expire_time: Option<Instant>,
}

impl<S: WatchStore> EtcdMutex<S> {
    /// Creates a mutex for `key`, identifying this holder as `holder_id`.
    pub fn new(store: S, key: impl Into<String>, holder_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            holder_id: holder_id.into(),
            ttl,
            expire_time: None,
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fails with `LockLost` unless the stored value is our holder id.
    async fn ensure_owned(&self, ctx: &Context, stage: &str) -> LockResult<()> {
        match ctx.run(self.store.get(&self.key)).await? {
            Some(node) if node.value == self.holder_id => Ok(()),
            Some(node) => {
                warn!(holder = %self.holder_id, current = %node.value, stage, "lock taken by another holder");
                Err(LockError::LockLost(format!(
                    "key '{}' is held by '{}' {}",
                    self.key, node.value, stage
                )))
            }
            None => {
                warn!(holder = %self.holder_id, stage, "lock key vanished");
                Err(LockError::LockLost(format!(
                    "key '{}' no longer exists {}",
                    self.key, stage
                )))
            }
        }
    }
}

impl<S: WatchStore> DistributedMutex for EtcdMutex<S> {
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

    #[instrument(skip(self, ctx), fields(mutex.key = %self.key, backend = "etcd", acquired = field::Empty))]
    async fn lock(&mut self, ctx: &Context) -> LockResult<bool> {
        let created = ctx
            .run(self.store.create_if_absent(&self.key, &self.holder_id, self.ttl))
            .await?;
        Span::current().record("acquired", created);

        if created {
            self.expire_time = Some(Instant::now() + self.ttl);
        }
        Ok(created)
    }

    /// Tries once, waits for a release notification, then tries exactly once
    /// more. A wait that runs out of `timeout` gives up with `Ok(false)`
    /// without a second attempt.
    #[instrument(skip(self, ctx), fields(mutex.key = %self.key, backend = "etcd", acquired = field::Empty))]
    async fn lock_wait(&mut self, ctx: &Context, timeout: Duration) -> LockResult<bool> {
        if self.lock(ctx).await? {
            Span::current().record("acquired", true);
            return Ok(true);
        }

        match self.wait_key_release(ctx, timeout).await {
            Ok(()) => {}
            Err(LockError::WaitTimeout(_)) => {
                debug!("key not released in time");
                Span::current().record("acquired", false);
                return Ok(false);
            }
            Err(err) => return Err(err),
        }

        let acquired = self.lock(ctx).await?;
        Span::current().record("acquired", acquired);
        Ok(acquired)
    }

    /// Reads the key's change index and watches from just after it. The
    /// first notification of any kind ends the wait; the caller's next
    /// acquire attempt decides whether the key is actually free.
    #[instrument(skip(self, ctx), fields(mutex.key = %self.key, backend = "etcd"))]
    async fn wait_key_release(&self, ctx: &Context, timeout: Duration) -> LockResult<()> {
        let Some(node) = ctx.run(self.store.get(&self.key)).await? else {
            debug!("key already absent");
            return Ok(());
        };

        let deadline = Instant::now() + timeout;
        let event = ctx
            .run(async {
                tokio::time::timeout_at(deadline, self.store.watch(&self.key, node.index))
                    .await
                    .map_err(|_| LockError::WaitTimeout(timeout))?
            })
            .await?;

        if event.action.releases() {
            debug!(action = ?event.action, index = event.index, "key released");
        } else {
            debug!(action = ?event.action, index = event.index, "key changed, ending wait");
        }
        Ok(())
    }

    /// Deletes the key when `force` is set or the local lease has not run
    /// out. A lease that already ran out may belong to someone else now, so a
    /// non-forced unlock leaves the key alone.
    #[instrument(skip(self, ctx), fields(mutex.key = %self.key, backend = "etcd"))]
    async fn unlock(&mut self, ctx: &Context, force: bool) -> LockResult<()> {
        let lease_valid = self.expire_time.is_some_and(|t| t > Instant::now());
        if !force && !lease_valid {
            debug!("lease already expired locally, leaving key alone");
            return Ok(());
        }

        if !ctx.run(self.store.delete(&self.key)).await? {
            debug!("key already absent");
        }
        self.expire_time = None;
        Ok(())
    }

    #[instrument(skip(self, ctx), fields(mutex.key = %self.key, backend = "etcd"))]
    async fn refresh_ttl(&mut self, ctx: &Context) -> LockResult<()> {
        self.ensure_owned(ctx, "before refresh").await?;

        if !ctx.run(self.store.refresh_ttl(&self.key, self.ttl)).await? {
            warn!(holder = %self.holder_id, "lock key vanished during refresh");
            return Err(LockError::LockLost(format!(
                "key '{}' expired before its TTL could be refreshed",
                self.key
            )));
        }

        // Another holder may have won the key between the check and the write.
        self.ensure_owned(ctx, "after refresh").await?;

        self.expire_time = Some(Instant::now() + self.ttl);
        Ok(())
    }
}
