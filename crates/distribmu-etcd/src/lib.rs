//! etcd backend for distributed mutexes.
//!
//! Acquisition is an atomic create-if-absent with TTL; waiters are woken by
//! the store's change notifications instead of polling.

pub mod client;
pub mod mutex;
pub mod store;

pub use client::{EtcdError, EtcdV2Client, EtcdV2ClientBuilder};
pub use mutex::EtcdMutex;
pub use store::{KeyNode, WatchAction, WatchEvent, WatchStore};
