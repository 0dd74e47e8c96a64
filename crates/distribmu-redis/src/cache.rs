//! Cache contract consumed by [`RedisMutex`](crate::RedisMutex), and its
//! implementation for the Redis client.

use std::future::Future;
use std::time::Duration;

use distribmu_core::error::{LockError, LockResult};
use fred::prelude::*;
use fred::types::CustomCommand;

/// A key-value cache with atomic set-if-absent and TTL expiry.
pub trait TtlCache: Send + Sync {
    /// Sets `key` to `value` with `ttl` unless it exists.
    ///
    /// Returns `Ok(false)` when the key already exists.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    fn exists(&self, key: &str) -> impl Future<Output = LockResult<bool>> + Send;

    /// Reads `key`, returning `Ok(None)` when it does not exist.
    fn get(&self, key: &str) -> impl Future<Output = LockResult<Option<String>>> + Send;

    /// Resets the TTL of `key`, returning `Ok(false)` when it does not exist.
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = LockResult<bool>> + Send;

    /// Deletes `key`, returning `Ok(false)` when it did not exist.
    fn delete(&self, key: &str) -> impl Future<Output = LockResult<bool>> + Send;
}

fn command_error(command: &str, err: RedisError) -> LockError {
    LockError::Backend(Box::new(std::io::Error::other(format!(
        "Redis {} failed: {}",
        command, err
    ))))
}

/// Redis rejects a zero expiry, so sub-millisecond TTLs round up.
fn ttl_millis(ttl: Duration) -> i64 {
    (ttl.as_millis() as i64).max(1)
}

impl TtlCache for RedisClient {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        // SET NX returns Some(value) if key was set, None if key already exists
        let result: Option<String> = self
            .set(
                key,
                value,
                Some(Expiration::PX(ttl_millis(ttl))),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(|e| command_error("SET NX", e))?;

        Ok(result.is_some())
    }

    async fn exists(&self, key: &str) -> LockResult<bool> {
        let count: i64 = KeysInterface::exists(self, key)
            .await
            .map_err(|e| command_error("EXISTS", e))?;
        Ok(count > 0)
    }

    async fn get(&self, key: &str) -> LockResult<Option<String>> {
        KeysInterface::get(self, key)
            .await
            .map_err(|e| command_error("GET", e))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> LockResult<bool> {
        let args: Vec<RedisValue> = vec![key.into(), ttl_millis(ttl).into()];
        let cmd = CustomCommand::new_static("PEXPIRE", None, false);

        let result: i64 = self
            .custom(cmd, args)
            .await
            .map_err(|e| command_error("PEXPIRE", e))?;
        Ok(result == 1)
    }

    async fn delete(&self, key: &str) -> LockResult<bool> {
        let removed: i64 = self.del(key).await.map_err(|e| command_error("DEL", e))?;
        Ok(removed > 0)
    }
}
