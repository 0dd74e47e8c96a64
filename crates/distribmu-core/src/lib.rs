//! Core contract, error taxonomy and retry helpers for distributed mutexes.
//!
//! Backend crates (`distribmu-etcd`, `distribmu-redis`) implement
//! [`DistributedMutex`]; callers written against the trait work with either.

pub mod context;
pub mod error;
pub mod execute;
pub mod prelude;
pub mod traits;

pub use context::{CancelHandle, Context};
pub use error::{LockError, LockResult};
pub use execute::DistributedMutexExt;
pub use traits::DistributedMutex;
