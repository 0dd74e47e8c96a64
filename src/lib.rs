//! Distributed mutex over etcd or Redis.
//!
//! Independent processes coordinate exclusive access to a named key in a
//! shared store, without talking to each other. The holder's identity is
//! stored as the key's value and the key carries a TTL, so a crashed holder
//! releases the lock by expiry.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use distribmu::prelude::*;
//! use distribmu::{BackendKind, EtcdDriverConfig, EtcdV2Client, MutexConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MutexConfig::new(
//!         BackendKind::Etcd,
//!         "job:42",
//!         Duration::from_secs(10),
//!         "worker-A",
//!         EtcdDriverConfig::new(EtcdV2Client::new("http://127.0.0.1:2379")?),
//!     )?;
//!     let mut mutex = config.build();
//!     let ctx = Context::background();
//!
//!     mutex
//!         .do_with_max_retry(&ctx, 3, Duration::from_secs(5), || async {
//!             println!("Doing critical work...");
//!             Ok::<_, LockError>(())
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! ## etcd
//!
//! Uses the v2 keys API: `prevExist=false` creates with a TTL, and waiters
//! block on a watch until the key is deleted or expires.
//!
//! ## Redis
//!
//! Uses `SET NX PX`. Redis has no change stream, so waiters poll at a
//! configurable precision interval.
//!
//! # Leases
//!
//! A holder that needs the lock longer than its TTL calls
//! [`refresh_ttl`](DistributedMutex::refresh_ttl) before the lease runs out.
//! A [`LockError::LockLost`] from it means another holder owns the key and
//! the critical section is no longer protected.
//!
//! # Crate Organization
//!
//! This crate holds configuration and dispatch, and re-exports:
//! - `distribmu-core`: contract, errors, context and retry helpers
//! - `distribmu-etcd`: etcd backend
//! - `distribmu-redis`: Redis backend

pub mod config;
pub mod mutex;
pub mod settings;

pub use config::{
    BackendKind, DriverConfig, EtcdDriverConfig, MutexConfig, RedisDriverConfig, new_mutex,
};
pub use mutex::AnyMutex;
pub use settings::{EtcdSettings, MutexSettings, RedisSettings};

// Re-export core types and traits
pub use distribmu_core::*;

// Re-export backends
pub use distribmu_etcd::{
    EtcdError, EtcdMutex, EtcdV2Client, EtcdV2ClientBuilder, KeyNode, WatchAction, WatchEvent,
    WatchStore,
};
pub use distribmu_redis::{DEFAULT_PRECISION, RedisMutex, TtlCache};
