//! Scripted mutex for testing the acquire-run-release helpers.

use std::time::Duration;

use distribmu::{Context, DistributedMutex, LockError, LockResult};
use tokio::time::Instant;

/// Mutex whose `lock_wait` outcome is scripted per attempt.
pub struct MockMutex {
    /// Attempt (1-based) on which `lock_wait` succeeds; `None` never does.
    acquire_on: Option<u32>,
    /// Makes `lock_wait` fail with a connection error.
    fail_lock_wait: bool,
    /// Makes `unlock` fail with a backend error.
    fail_unlock: bool,
    pub lock_wait_calls: u32,
    pub unlock_calls: u32,
    expire_time: Option<Instant>,
}

impl MockMutex {
    pub fn acquiring_on(attempt: u32) -> Self {
        Self {
            acquire_on: Some(attempt),
            fail_lock_wait: false,
            fail_unlock: false,
            lock_wait_calls: 0,
            unlock_calls: 0,
            expire_time: None,
        }
    }

    pub fn never_acquiring() -> Self {
        Self {
            acquire_on: None,
            ..Self::acquiring_on(1)
        }
    }

    pub fn failing_lock_wait() -> Self {
        Self {
            fail_lock_wait: true,
            ..Self::acquiring_on(1)
        }
    }

    pub fn failing_unlock(mut self) -> Self {
        self.fail_unlock = true;
        self
    }

    pub fn is_held(&self) -> bool {
        self.expire_time.is_some()
    }
}

impl DistributedMutex for MockMutex {
    fn key(&self) -> &str {
        "mock-key"
    }

    fn holder_id(&self) -> &str {
        "mock-holder"
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn expire_time(&self) -> Option<Instant> {
        self.expire_time
    }

    async fn lock(&mut self, _ctx: &Context) -> LockResult<bool> {
        Ok(false)
    }

    async fn lock_wait(&mut self, _ctx: &Context, _timeout: Duration) -> LockResult<bool> {
        self.lock_wait_calls += 1;
        if self.fail_lock_wait {
            return Err(LockError::Connection(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "mock connection reset",
            ))));
        }
        let acquired = self.acquire_on == Some(self.lock_wait_calls);
        if acquired {
            self.expire_time = Some(Instant::now() + self.ttl());
        }
        Ok(acquired)
    }

    async fn wait_key_release(&self, _ctx: &Context, timeout: Duration) -> LockResult<()> {
        Err(LockError::WaitTimeout(timeout))
    }

    async fn unlock(&mut self, _ctx: &Context, _force: bool) -> LockResult<()> {
        self.unlock_calls += 1;
        if self.fail_unlock {
            return Err(LockError::backend("mock unlock failure"));
        }
        self.expire_time = None;
        Ok(())
    }

    async fn refresh_ttl(&mut self, _ctx: &Context) -> LockResult<()> {
        Ok(())
    }
}
