//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{DaError, Result};

use super::{Operation, WalEntry, WalRecovery};

/// Writes entries to the WAL file
pub struct WalWriter {
    path: PathBuf,
    file: File,
    /// Byte length of the well-formed log
    len: u64,
    /// LSN handed to the next append
    next_lsn: u64,
    /// Highest LSN known to be on stable storage
    synced_lsn: u64,
    /// Entries appended since the last fsync
    uncommitted: usize,
    sync_strategy: WalSyncStrategy,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// An existing log is scanned to continue its LSN sequence; a torn tail
    /// left by a crash is cut off before new entries are appended.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let stats = if path.exists() {
            Some(WalRecovery::verify(path)?)
        } else {
            None
        };

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        let (valid_len, last_lsn) = stats
            .map(|s| (s.valid_len, s.last_lsn))
            .unwrap_or((0, 0));

        if file.metadata()?.len() > valid_len {
            tracing::warn!(
                path = %path.display(),
                valid_len,
                "Cutting torn tail off WAL before appending"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(valid_len))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len: valid_len,
            next_lsn: last_lsn + 1,
            synced_lsn: last_lsn,
            uncommitted: 0,
            sync_strategy,
        })
    }

    /// Append an operation; returns the LSN assigned to it
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        let lsn = self.next_lsn;
        let frame = WalEntry::new(lsn, operation).serialize()?;

        if let Err(e) = self.file.write_all(&frame) {
            // Never leave a half frame in front of later appends
            self.rollback(self.len, lsn);
            return Err(DaError::WalWrite(format!("append of LSN {} failed: {}", lsn, e)));
        }

        let start = self.len;
        self.len += frame.len() as u64;
        self.next_lsn += 1;
        self.uncommitted += 1;

        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.uncommitted >= count,
        };
        if due {
            if let Err(e) = self.sync() {
                // A write reported as failed must not be replayed later
                self.rollback(start, lsn);
                self.uncommitted -= 1;
                return Err(e);
            }
        }

        Ok(lsn)
    }

    /// Force sync to disk
    ///
    /// Returns `false` when there was nothing to sync.
    pub fn sync(&mut self) -> Result<bool> {
        if self.uncommitted == 0 {
            return Ok(false);
        }
        self.file.sync_data()?;
        self.uncommitted = 0;
        self.synced_lsn = self.next_lsn - 1;
        Ok(true)
    }

    /// Discard all entries (after they became durable elsewhere)
    ///
    /// The LSN sequence keeps counting.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.sync_all()?;
        self.len = 0;
        self.uncommitted = 0;
        self.synced_lsn = self.next_lsn - 1;
        Ok(())
    }

    /// Cut the log back to `len`, handing `lsn` out again
    fn rollback(&mut self, len: u64, lsn: u64) {
        if let Err(e) = self
            .file
            .set_len(len)
            .and_then(|()| self.file.seek(SeekFrom::Start(len)).map(|_| ()))
        {
            tracing::error!(path = %self.path.display(), error = %e, "WAL rollback failed");
        }
        self.len = len;
        self.next_lsn = lsn;
    }

    /// Get the next LSN to be assigned
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Highest LSN known to be durable
    pub fn synced_lsn(&self) -> u64 {
        self.synced_lsn
    }

    /// Entries appended but not yet fsynced
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    /// Current log size in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
