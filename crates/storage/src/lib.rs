pub mod conformance;
mod error;
mod executor;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use executor::{RetryPolicy, StatefulExecutor};
pub use memory::{MemoryLockingMap, MemoryNonLockingMap, DEFAULT_LOCK_DURATION};
pub use record::{ItemLock, LockedItemRecord};
pub use traits::{LockingMap, NonLockingMap};
