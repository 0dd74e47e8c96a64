//! Convenience prelude for distributed mutex types.

pub use crate::context::{CancelHandle, Context};
pub use crate::error::{LockError, LockResult};
pub use crate::execute::DistributedMutexExt;
pub use crate::traits::DistributedMutex;
