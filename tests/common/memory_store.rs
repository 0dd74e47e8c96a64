//! In-memory store implementing both backend contracts, for testing drivers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use distribmu::{KeyNode, LockError, LockResult, TtlCache, WatchAction, WatchEvent, WatchStore};
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};

struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    /// Store-wide change index, bumped on every mutation.
    index: u64,
    events: Vec<(String, WatchEvent)>,
    /// Value written over a key right after its TTL is refreshed.
    steal_on_refresh: HashMap<String, String>,
}

impl State {
    fn record(&mut self, key: &str, action: WatchAction) {
        self.index += 1;
        let event = WatchEvent {
            action,
            index: self.index,
        };
        self.events.push((key.to_string(), event));
    }

    /// Drops expired keys, recording an expiry event for each.
    fn purge(&mut self, now: Instant) -> bool {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.entries.remove(key);
            self.record(key, WatchAction::Expire);
        }
        !expired.is_empty()
    }
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    changed: Notify,
    acquire_attempts: AtomicUsize,
    unavailable: AtomicBool,
}

/// Shared in-memory store; clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of create-if-absent / set-if-absent calls so far.
    pub fn acquire_attempts(&self) -> usize {
        self.inner.acquire_attempts.load(Ordering::SeqCst)
    }

    /// Makes every subsequent operation fail with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Current value of `key`, if present.
    pub fn value_of(&self, key: &str) -> Option<String> {
        self.with_state(|state| state.entries.get(key).map(|e| e.value.clone()))
    }

    /// Writes `value` under `key` as another holder would, keeping the TTL.
    pub fn overwrite(&self, key: &str, value: &str) {
        self.with_state(|state| {
            let expires_at = state
                .entries
                .get(key)
                .map(|e| e.expires_at)
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
            state.entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at,
                },
            );
            state.record(key, WatchAction::Set);
        });
        self.inner.changed.notify_waiters();
    }

    /// Deletes `key` behind every driver's back.
    pub fn remove(&self, key: &str) {
        self.with_state(|state| {
            if state.entries.remove(key).is_some() {
                state.record(key, WatchAction::Delete);
            }
        });
        self.inner.changed.notify_waiters();
    }

    /// Lets `thief` take `key` right after the next TTL refresh of it.
    pub fn steal_on_refresh(&self, key: &str, thief: &str) {
        self.with_state(|state| {
            state
                .steal_on_refresh
                .insert(key.to_string(), thief.to_string());
        });
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.inner.state.lock().unwrap();
        if state.purge(Instant::now()) {
            self.inner.changed.notify_waiters();
        }
        f(&mut state)
    }

    fn check_available(&self) -> LockResult<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(LockError::Connection(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "memory store unavailable",
            ))));
        }
        Ok(())
    }

    fn insert_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        self.check_available()?;
        self.inner.acquire_attempts.fetch_add(1, Ordering::SeqCst);

        let created = self.with_state(|state| {
            if state.entries.contains_key(key) {
                return false;
            }
            state.entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: Instant::now() + ttl,
                },
            );
            state.record(key, WatchAction::Set);
            true
        });
        if created {
            self.inner.changed.notify_waiters();
        }
        Ok(created)
    }

    fn touch(&self, key: &str, ttl: Duration) -> LockResult<bool> {
        self.check_available()?;
        let (found, stolen) = self.with_state(|state| {
            let Some(entry) = state.entries.get_mut(key) else {
                return (false, false);
            };
            entry.expires_at = Instant::now() + ttl;
            match state.steal_on_refresh.remove(key) {
                Some(thief) => {
                    if let Some(entry) = state.entries.get_mut(key) {
                        entry.value = thief;
                    }
                    state.record(key, WatchAction::Set);
                    (true, true)
                }
                None => (true, false),
            }
        });
        if stolen {
            self.inner.changed.notify_waiters();
        }
        Ok(found)
    }

    fn erase(&self, key: &str) -> LockResult<bool> {
        self.check_available()?;
        let removed = self.with_state(|state| {
            let removed = state.entries.remove(key).is_some();
            if removed {
                state.record(key, WatchAction::Delete);
            }
            removed
        });
        if removed {
            self.inner.changed.notify_waiters();
        }
        Ok(removed)
    }
}

impl WatchStore for MemoryStore {
    async fn create_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        self.insert_if_absent(key, value, ttl)
    }

    async fn get(&self, key: &str) -> LockResult<Option<KeyNode>> {
        self.check_available()?;
        Ok(self.with_state(|state| {
            state.entries.get(key).map(|entry| KeyNode {
                value: entry.value.clone(),
                index: state.index,
            })
        }))
    }

    async fn watch(&self, key: &str, after_index: u64) -> LockResult<WatchEvent> {
        loop {
            self.check_available()?;
            // Register before inspecting state so no notification is missed.
            let changed = self.inner.changed.notified();

            let (event, expires_at) = self.with_state(|state| {
                let event = state
                    .events
                    .iter()
                    .find(|(k, e)| k == key && e.index > after_index)
                    .map(|(_, e)| *e);
                (event, state.entries.get(key).map(|e| e.expires_at))
            });
            if let Some(event) = event {
                return Ok(event);
            }

            match expires_at {
                Some(at) => {
                    tokio::select! {
                        _ = changed => {}
                        _ = sleep_until(at) => {}
                    }
                }
                None => changed.await,
            }
        }
    }

    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> LockResult<bool> {
        self.touch(key, ttl)
    }

    async fn delete(&self, key: &str) -> LockResult<bool> {
        self.erase(key)
    }
}

impl TtlCache for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> LockResult<bool> {
        self.insert_if_absent(key, value, ttl)
    }

    async fn exists(&self, key: &str) -> LockResult<bool> {
        self.check_available()?;
        Ok(self.with_state(|state| state.entries.contains_key(key)))
    }

    async fn get(&self, key: &str) -> LockResult<Option<String>> {
        self.check_available()?;
        Ok(self.value_of(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> LockResult<bool> {
        self.touch(key, ttl)
    }

    async fn delete(&self, key: &str) -> LockResult<bool> {
        self.erase(key)
    }
}

