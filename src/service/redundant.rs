//! Redundant composite backend
//!
//! Mirrors every write onto all of its backends and reads from the first
//! one that has the key, repairing earlier replicas that were missing it.

use std::fmt;
use std::sync::Arc;
use std::thread;

use crate::error::StorageError;

use super::{ServiceResult, StorageService};

/// Storage service that keeps every record on all of its backends
pub struct RedundantStorageService {
    backends: Vec<Arc<dyn StorageService>>,
}

impl RedundantStorageService {
    /// Compose `backends`; reads try them in this order
    pub fn new(backends: Vec<Arc<dyn StorageService>>) -> ServiceResult<Self> {
        if backends.is_empty() {
            return Err(StorageError::InvalidArgument(
                "redundant storage needs at least one backend".to_string(),
            ));
        }
        Ok(Self { backends })
    }

    pub fn backends(&self) -> &[Arc<dyn StorageService>] {
        &self.backends
    }

    /// Run `op` on every backend concurrently and fold the failures
    ///
    /// Each backend gets its own thread, so a hung replica delays the result
    /// but never the calls to the others.
    fn fan_out<F>(&self, what: &str, op: F) -> ServiceResult<()>
    where
        F: Fn(&dyn StorageService) -> ServiceResult<()> + Sync,
    {
        let results: Vec<ServiceResult<()>> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .backends
                .iter()
                .map(|backend| {
                    let op = &op;
                    scope.spawn(move || op(backend.as_ref()))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(StorageError::BackendUnavailable("backend panicked".to_string()))
                    })
                })
                .collect()
        });

        let failures: Vec<(String, StorageError)> = self
            .backends
            .iter()
            .zip(results)
            .filter_map(|(backend, result)| result.err().map(|e| (backend.identity(), e)))
            .collect();

        if failures.is_empty() {
            return Ok(());
        }

        for (identity, error) in &failures {
            tracing::warn!(backend = %identity, %error, "Redundant {} failed on backend", what);
        }

        let summary = failures
            .iter()
            .map(|(identity, error)| format!("{}: {}", identity, error))
            .collect::<Vec<_>>()
            .join("; ");

        if failures.iter().all(|(_, e)| e.is_invalid_argument()) {
            Err(StorageError::InvalidArgument(summary))
        } else {
            Err(StorageError::BackendUnavailable(summary))
        }
    }
}

impl StorageService for RedundantStorageService {
    fn read(&self, key: &[u8]) -> ServiceResult<Vec<u8>> {
        let mut missing: Vec<&Arc<dyn StorageService>> = Vec::new();
        let mut unavailable: Vec<String> = Vec::new();

        for backend in &self.backends {
            match backend.read(key) {
                Ok(value) => {
                    for stale in missing {
                        // Repaired replicas get the default retention
                        if let Err(e) = stale.write(key, &value, 0) {
                            tracing::warn!(backend = %stale.identity(), error = %e, "Read repair failed");
                        }
                    }
                    return Ok(value);
                }
                Err(StorageError::NotFound) => missing.push(backend),
                Err(StorageError::InvalidArgument(msg)) => {
                    return Err(StorageError::InvalidArgument(msg))
                }
                Err(e) => {
                    tracing::debug!(backend = %backend.identity(), error = %e, "Replica read failed");
                    unavailable.push(format!("{}: {}", backend.identity(), e));
                }
            }
        }

        if unavailable.is_empty() {
            Err(StorageError::NotFound)
        } else {
            Err(StorageError::BackendUnavailable(unavailable.join("; ")))
        }
    }

    fn write(&self, key: &[u8], value: &[u8], timeout_secs: u64) -> ServiceResult<()> {
        self.fan_out("write", |backend| backend.write(key, value, timeout_secs))
    }

    fn sync(&self) -> ServiceResult<()> {
        self.fan_out("sync", |backend| backend.sync())
    }
}

impl fmt::Display for RedundantStorageService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Redundant(")?;
        for (i, backend) in self.backends.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", backend.identity())?;
        }
        write!(f, ")")
    }
}
