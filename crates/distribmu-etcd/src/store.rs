//! Store contract consumed by [`EtcdMutex`](crate::EtcdMutex).

use std::future::Future;
use std::time::Duration;

use distribmu_core::error::LockResult;

/// Current state of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNode {
    /// Stored value (the holder identity).
    pub value: String,
    /// Change index the key was read at. Watches anchor just after it.
    pub index: u64,
}

/// Kind of mutation reported by a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    /// Key written (create, set, update, compare-and-swap).
    Set,
    /// Key deleted explicitly.
    Delete,
    /// Key removed by TTL expiry.
    Expire,
}

impl WatchAction {
    /// Whether this mutation leaves the key free to acquire.
    pub fn releases(self) -> bool {
        matches!(self, Self::Delete | Self::Expire)
    }
}

/// One change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchEvent {
    pub action: WatchAction,
    /// Change index of the mutation.
    pub index: u64,
}

/// A linearizable key-value store with TTL keys and change notification.
pub trait WatchStore: Send + Sync {
    /// Creates `key` with `value` and `ttl` unless it exists.
    ///
    /// Returns `Ok(false)` when the key already exists.
    fn create_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Reads `key`, returning `Ok(None)` when it does not exist.
    fn get(&self, key: &str) -> impl Future<Output = LockResult<Option<KeyNode>>> + Send;

    /// Waits for the first mutation of `key` with an index after `after_index`.
    ///
    /// This may block indefinitely; callers bound it with their own deadline.
    fn watch(&self, key: &str, after_index: u64) -> impl Future<Output = LockResult<WatchEvent>> + Send;

    /// Resets the TTL of `key` without changing its value.
    ///
    /// Returns `Ok(false)` when the key does not exist.
    fn refresh_ttl(&self, key: &str, ttl: Duration) -> impl Future<Output = LockResult<bool>> + Send;

    /// Deletes `key`, returning `Ok(false)` when it did not exist.
    fn delete(&self, key: &str) -> impl Future<Output = LockResult<bool>> + Send;
}
