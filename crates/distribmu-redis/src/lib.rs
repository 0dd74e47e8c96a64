//! Redis backend for distributed mutexes.
//!
//! Acquisition is `SET NX PX`; Redis has no change stream, so waiters poll
//! the key at a fixed precision interval.

pub mod cache;
pub mod mutex;

pub use cache::TtlCache;
pub use mutex::{DEFAULT_PRECISION, RedisMutex};
