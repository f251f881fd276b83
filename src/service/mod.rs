//! Storage Service Module
//!
//! The backend-agnostic contract callers program against, and its
//! implementations.
//!
//! | Backend | Where the data lives |
//! |---|---|
//! | [`DbStorageService`] | embedded engine in a local directory |
//! | [`RemoteStorageService`] | a `dakv-server` reached over TCP |
//! | [`RedundantStorageService`] | every one of several other backends |
//!
//! All three report failures through [`StorageError`], so composites can
//! treat `NotFound` (try another replica) and `BackendUnavailable` (replica
//! is down) differently without knowing what sits underneath.

pub mod db;
pub mod redundant;
pub mod remote;

use std::fmt;
use std::sync::Arc;

use crate::error::StorageError;

pub use db::DbStorageService;
pub use redundant::RedundantStorageService;
pub use remote::RemoteStorageService;

/// Result type for storage service operations
pub type ServiceResult<T> = std::result::Result<T, StorageError>;

/// Uniform operation set implemented by every backend
///
/// `Display` is the human-readable identity, e.g. `DbStorage(/var/das)`.
pub trait StorageService: fmt::Display + Send + Sync {
    /// Value of the live record for `key`, as an owned copy
    ///
    /// `NotFound` if the key was never written or has expired.
    fn read(&self, key: &[u8]) -> ServiceResult<Vec<u8>>;

    /// Upsert a record, retained for `timeout_secs` after the write
    ///
    /// 0 means the deployment default retention. The record is either fully
    /// visible to later reads or not at all.
    fn write(&self, key: &[u8], value: &[u8], timeout_secs: u64) -> ServiceResult<()>;

    /// Durability barrier: every write that returned before this call is on
    /// stable storage once it returns
    fn sync(&self) -> ServiceResult<()>;

    /// Diagnostic identifier; not stable enough to key anything on
    fn identity(&self) -> String {
        self.to_string()
    }
}

impl<S: StorageService + ?Sized> StorageService for Arc<S> {
    fn read(&self, key: &[u8]) -> ServiceResult<Vec<u8>> {
        (**self).read(key)
    }

    fn write(&self, key: &[u8], value: &[u8], timeout_secs: u64) -> ServiceResult<()> {
        (**self).write(key, value, timeout_secs)
    }

    fn sync(&self) -> ServiceResult<()> {
        (**self).sync()
    }

    fn identity(&self) -> String {
        (**self).identity()
    }
}
