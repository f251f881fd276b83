//! Embedded-engine backend
//!
//! One `DbStorageService` is one store handle: it owns an open [`Engine`]
//! over a directory plus the GC loop that keeps that directory compact.
//! Both live until the cancellation token fires.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::engine::{Engine, EngineStats};
use crate::error::StorageError;
use crate::gc::{self, GcCycleReport, GcLoop, GcState};
use crate::lifecycle::CancellationToken;

use super::{ServiceResult, StorageService};

/// Storage service backed by the embedded engine
pub struct DbStorageService {
    engine: Arc<Engine>,
    gc: GcLoop,
    token: CancellationToken,
    dir: PathBuf,
    discard_ratio: f64,
}

impl DbStorageService {
    /// Open a handle over `dir` with default tuning
    pub fn new(
        dir: impl AsRef<Path>,
        discard_after_timeout: bool,
        token: CancellationToken,
    ) -> ServiceResult<Self> {
        let config = Config::builder()
            .data_dir(dir.as_ref())
            .discard_after_timeout(discard_after_timeout)
            .build();
        Self::open(config, token)
    }

    /// Open a handle from a full config and start its GC loop
    ///
    /// Any failure is `OpenFailed`; no half-open handle is ever returned.
    /// Cancelling `token` shuts the handle down; `close()` shuts down only
    /// this handle, not others sharing the token.
    pub fn open(config: Config, token: CancellationToken) -> ServiceResult<Self> {
        let token = token.child_token();
        let dir = config.data_dir.clone();
        let interval = config.gc_interval;
        let discard_ratio = config.gc_discard_ratio;

        let engine = Engine::open(config)
            .map(Arc::new)
            .map_err(|e| StorageError::OpenFailed(format!("{}: {}", dir.display(), e)))?;

        let gc = match GcLoop::spawn(Arc::clone(&engine), interval, discard_ratio, token.clone()) {
            Ok(gc) => gc,
            Err(e) => {
                if let Err(close_err) = engine.close() {
                    tracing::warn!(error = %close_err, "Engine close failed after GC spawn error");
                }
                return Err(StorageError::OpenFailed(format!(
                    "{}: failed to start GC loop: {}",
                    dir.display(),
                    e
                )));
            }
        };

        tracing::info!(dir = %dir.display(), "Store handle opened");

        Ok(Self {
            engine,
            gc,
            token,
            dir,
            discard_ratio,
        })
    }

    /// Run one GC drain now, on the caller's thread
    pub fn collect_garbage(&self) -> ServiceResult<GcCycleReport> {
        self.check_live()?;
        Ok(gc::drain(&self.engine, self.discard_ratio, &self.token))
    }

    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }

    pub fn gc_state(&self) -> GcState {
        self.gc.state()
    }

    /// This handle's own token, a child of the one passed at open
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cancel the token and wait until the GC loop has closed the engine
    ///
    /// Once this returns the directory can be opened again. Calling it more
    /// than once is harmless.
    pub fn close(&self) {
        self.token.cancel();

        let clean_exit = self.gc.join();
        if !clean_exit {
            tracing::error!(dir = %self.dir.display(), "GC loop panicked; closing engine directly");
            if let Err(e) = self.engine.close() {
                tracing::error!(error = %e, "Engine close failed");
            }
        }
    }

    fn check_live(&self) -> ServiceResult<()> {
        if self.token.is_cancelled() {
            return Err(StorageError::BackendUnavailable(format!(
                "{} is shut down",
                self
            )));
        }
        Ok(())
    }
}

impl StorageService for DbStorageService {
    fn read(&self, key: &[u8]) -> ServiceResult<Vec<u8>> {
        self.check_live()?;
        match self.engine.get(key)? {
            Some(value) => Ok(value),
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&self, key: &[u8], value: &[u8], timeout_secs: u64) -> ServiceResult<()> {
        self.check_live()?;
        self.engine.put(key, value, timeout_secs)?;
        Ok(())
    }

    fn sync(&self) -> ServiceResult<()> {
        self.check_live()?;
        self.engine.sync()?;
        Ok(())
    }
}

impl fmt::Display for DbStorageService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DbStorage({})", self.dir.display())
    }
}

impl Drop for DbStorageService {
    fn drop(&mut self) {
        self.close();
    }
}
