//! Engine Module
//!
//! The embedded storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, and Storage
//! - Handle concurrent read/write access
//! - Trigger flushes when MemTable is full
//! - Manage crash recovery on startup
//! - Own the data directory exclusively while open
//! - Expose single-pass value-log GC to the background loop

use std::fs::{self, File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::config::Config;
use crate::error::{DaError, Result};
use crate::memtable::MemTable;
use crate::record::{now_millis, Entry, Record, MAX_KEY_SIZE, MAX_VALUE_SIZE};
use crate::storage::{ReclaimOutcome, ReclaimPolicy, StorageManager};
use crate::wal::{Operation, WalRecovery, WalWriter};

/// Point-in-time counters for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub memtable_entries: usize,
    pub memtable_bytes: usize,
    pub sstable_count: usize,
    pub sstable_bytes: u64,
    pub wal_bytes: u64,
    pub next_lsn: u64,
    pub synced_lsn: u64,
    pub gc_passes: u64,
    pub gc_bytes_reclaimed: u64,
    pub gc_segments_rewritten: u64,
    pub gc_segments_removed: u64,
}

#[derive(Default)]
struct GcCounters {
    passes: AtomicU64,
    bytes_reclaimed: AtomicU64,
    segments_rewritten: AtomicU64,
    segments_removed: AtomicU64,
}

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/flush): Serialized by `write_lock`
///   - Only ONE write operation at a time
///   - Must acquire: open(read) → write_lock → WAL → memtable → storage
///
/// - **Reads** (get): Fully concurrent
///   - MemTable uses internal RwLock (many concurrent readers)
///   - SSTable lookups go through per-file handles behind their own Mutex
///
/// - **GC** (run_value_log_gc): Serialized by `gc_lock`, runs alongside
///   reads and writes; briefly takes `write_lock` to sync the WAL before
///   MemTable keys may shadow segment data
///
/// - **Close**: Takes `open` for writing, so it waits for every in-flight
///   operation; afterwards all operations fail with `DaError::Closed`
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Directory for all data files (SSTables)
    storage_dir: PathBuf,

    /// Write-ahead log for durability (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// In-memory table for recent writes (internal RwLock)
    memtable: MemTable,

    /// Persistent storage manager (internal RwLock on sstables vec)
    storage: StorageManager,

    /// Serializes write operations (put/flush)
    write_lock: Mutex<()>,

    /// Serializes reclamation passes
    gc_lock: Mutex<()>,

    /// `false` once closed
    open: RwLock<bool>,

    /// Exclusive lock on `{data_dir}/LOCK`, released on close
    dir_lock: Mutex<Option<File>>,

    gc: GcCounters,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";
    const SSTABLE_DIR: &'static str = "sstables";
    const LOCK_FILENAME: &'static str = "LOCK";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config, create data directory
    /// 2. Take the directory lock (fails with `Locked` if another handle holds it)
    /// 3. Load existing SSTables
    /// 4. Recover from WAL if it exists, flush recovered data, truncate the WAL
    /// 5. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Create data directory if it doesn't exist
        fs::create_dir_all(&config.data_dir)?;

        // Step 2: Exclusive ownership of the directory
        let dir_lock = Self::lock_dir(&config.data_dir)?;

        // Step 3: Compute paths (derived from data_dir, not configurable)
        let storage_dir = config.data_dir.join(Self::SSTABLE_DIR);
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        // Step 4: Open storage manager (loads existing SSTables)
        let storage = StorageManager::open(&storage_dir)?;

        // Step 5: Create memtable
        let memtable = MemTable::new();

        // Step 6: Recover from WAL if it exists and flush to make data durable
        let mut recovered = false;
        if wal_path.exists() {
            let (entries, recovery_result) = WalRecovery::recover(&wal_path)?;

            if recovery_result.entries_recovered > 0 || recovery_result.entries_corrupted > 0 {
                tracing::info!(
                    recovered = recovery_result.entries_recovered,
                    corrupted = recovery_result.entries_corrupted,
                    last_lsn = recovery_result.last_lsn,
                    truncated = recovery_result.was_truncated,
                    "WAL recovery complete"
                );
            }

            // Replay entries to memtable
            for entry in entries {
                match entry.operation {
                    Operation::Put {
                        key,
                        value,
                        expires_at,
                    } => {
                        memtable.put(key, Record::new(value, expires_at));
                    }
                }
            }

            // Flush recovered data to an SSTable before the WAL is reset
            if !memtable.is_empty() {
                tracing::debug!(entries = memtable.entry_count(), "Flushing recovered entries");
                storage.flush(&memtable)?;
                memtable.clear();
                recovered = true;
            }
        }

        let mut wal = WalWriter::open(&wal_path, config.wal_sync_strategy)?;
        if recovered {
            // Recovered data is durable in SSTables now
            wal.truncate()?;
        }

        tracing::info!(
            dir = %config.data_dir.display(),
            sstables = storage.sstable_count(),
            discard_after_timeout = config.discard_after_timeout,
            "Engine opened"
        );

        Ok(Self {
            config,
            storage_dir,
            wal: Mutex::new(wal),
            memtable,
            storage,
            write_lock: Mutex::new(()),
            gc_lock: Mutex::new(()),
            open: RwLock::new(true),
            dir_lock: Mutex::new(Some(dir_lock)),
            gc: GcCounters::default(),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Get a live value by key
    ///
    /// Expired records read as absent when `discard_after_timeout` is set.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let now = now_millis();
        let record = self.get_record(key)?;
        Ok(record
            .filter(|r| !(self.config.discard_after_timeout && r.is_expired(now)))
            .map(|r| r.value))
    }

    /// Get the newest stored record, ignoring retention policy
    ///
    /// Search order:
    /// 1. MemTable (most recent writes)
    /// 2. SSTables (newest to oldest)
    pub fn get_record(&self, key: &[u8]) -> Result<Option<Record>> {
        validate_key(key)?;
        let _open = self.ensure_open()?;

        // Step 1: Check MemTable first (most recent data)
        if let Some(record) = self.memtable.get(key) {
            return Ok(Some(record));
        }

        // Step 2: Check SSTables (newest to oldest)
        Ok(self.storage.get(key)?.and_then(Entry::into_record))
    }

    /// Put a key-value pair with a relative retention timeout
    ///
    /// `timeout_secs == 0` means the deployment default: `default_retention`
    /// when discarding is enabled, no expiry otherwise.
    pub fn put(&self, key: &[u8], value: &[u8], timeout_secs: u64) -> Result<()> {
        let expires_at = self.expiry_for(timeout_secs, now_millis());
        self.put_with_expiry(key, value, expires_at)
    }

    /// Put a key-value pair with an absolute expiry (unix millis)
    ///
    /// `Some(0)` is rejected: segments store 0 as "never expires".
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Write to WAL (durability)
    /// 3. Write to MemTable
    /// 4. Check if flush needed
    pub fn put_with_expiry(&self, key: &[u8], value: &[u8], expires_at: Option<u64>) -> Result<()> {
        validate_key(key)?;
        if value.len() > MAX_VALUE_SIZE {
            return Err(DaError::InvalidArgument(format!(
                "value of {} bytes exceeds limit",
                value.len()
            )));
        }
        if expires_at == Some(0) {
            return Err(DaError::InvalidArgument(
                "expiry must be a positive unix time".to_string(),
            ));
        }

        let _open = self.ensure_open()?;
        let _write_guard = self.write_lock.lock();

        // Step 1: Write to WAL first; a failed append leaves the MemTable untouched
        self.wal.lock().append(Operation::Put {
            key: key.to_vec(),
            value: value.to_vec(),
            expires_at,
        })?;

        // Step 2: Write to MemTable
        self.memtable
            .put(key.to_vec(), Record::new(value.to_vec(), expires_at));

        // Step 3: Check if flush is needed. The write itself is already
        // applied, so a failed flush is retried by the next write.
        if self.memtable.should_flush(self.config.memtable_size_limit) {
            if let Err(e) = self.flush_internal() {
                tracing::warn!(error = %e, "MemTable flush failed");
            }
        }

        Ok(())
    }

    /// Make every acknowledged write durable
    ///
    /// Returns `false` when there was nothing left to sync.
    pub fn sync(&self) -> Result<bool> {
        let _open = self.ensure_open()?;
        let synced = self.wal.lock().sync()?;
        Ok(synced)
    }

    /// Flush memtable to disk (public API)
    ///
    /// Forces a flush regardless of memtable size
    pub fn flush(&self) -> Result<()> {
        let _open = self.ensure_open()?;
        let _write_guard = self.write_lock.lock();
        self.flush_internal()
    }

    /// Run one value-log GC pass at the current time
    ///
    /// Returns `Ok(None)` when no segment has at least `discard_ratio` garbage.
    pub fn run_value_log_gc(&self, discard_ratio: f64) -> Result<Option<ReclaimOutcome>> {
        self.run_value_log_gc_at(discard_ratio, now_millis())
    }

    /// Run one value-log GC pass, judging expiry against `now_ms`
    pub fn run_value_log_gc_at(
        &self,
        discard_ratio: f64,
        now_ms: u64,
    ) -> Result<Option<ReclaimOutcome>> {
        if !(discard_ratio > 0.0 && discard_ratio <= 1.0) {
            return Err(DaError::InvalidArgument(format!(
                "discard ratio {} outside (0, 1]",
                discard_ratio
            )));
        }

        let _open = self.ensure_open()?;
        let _gc_guard = self.gc_lock.lock();

        // MemTable versions only shadow segment copies once their WAL frames
        // are on disk; writes racing past this point are not considered.
        let durable_keys = {
            let _write_guard = self.write_lock.lock();
            self.wal.lock().sync()?;
            self.memtable.keys()
        };

        let policy = ReclaimPolicy {
            discard_ratio,
            discard_expired: self.config.discard_after_timeout,
            now_ms,
        };
        let outcome = self.storage.reclaim_one(&durable_keys, &policy)?;

        self.gc.passes.fetch_add(1, Ordering::Relaxed);
        if let Some(outcome) = &outcome {
            self.gc
                .bytes_reclaimed
                .fetch_add(outcome.bytes_reclaimed(), Ordering::Relaxed);
            let counter = if outcome.removed {
                &self.gc.segments_removed
            } else {
                &self.gc.segments_rewritten
            };
            counter.fetch_add(1, Ordering::Relaxed);

            tracing::debug!(
                sstable = outcome.sstable_id,
                entries_before = outcome.entries_before,
                entries_after = outcome.entries_after,
                reclaimed = outcome.bytes_reclaimed(),
                removed = outcome.removed,
                "Value-log GC pass"
            );
        }

        Ok(outcome)
    }

    /// Close the engine gracefully
    ///
    /// Waits for in-flight operations, flushes pending data, syncs the WAL and
    /// releases the directory lock. Closing twice is a no-op; the lock is
    /// released even if the final flush fails.
    pub fn close(&self) -> Result<()> {
        let mut open = self.open.write();
        if !*open {
            return Ok(());
        }
        *open = false;

        let result = self.shutdown_internal();
        self.dir_lock.lock().take();

        match &result {
            Ok(()) => tracing::info!(dir = %self.config.data_dir.display(), "Engine closed"),
            Err(e) => tracing::error!(error = %e, "Engine closed with error"),
        }
        result
    }

    /// Whether `close` has not been called yet
    pub fn is_open(&self) -> bool {
        *self.open.read()
    }

    /// Absolute expiry for a write made at `now_ms`
    pub fn expiry_for(&self, timeout_secs: u64, now_ms: u64) -> Option<u64> {
        let expires_at = if timeout_secs > 0 {
            now_ms.saturating_add(timeout_secs.saturating_mul(1000))
        } else if self.config.discard_after_timeout {
            let retention = self.config.default_retention.as_millis() as u64;
            now_ms.saturating_add(retention)
        } else {
            return None;
        };
        // 0 is reserved for "never" on disk
        Some(expires_at.max(1))
    }

    /// Snapshot of engine counters
    pub fn stats(&self) -> EngineStats {
        let (wal_bytes, next_lsn, synced_lsn) = {
            let wal = self.wal.lock();
            (wal.len(), wal.current_lsn(), wal.synced_lsn())
        };
        EngineStats {
            memtable_entries: self.memtable.entry_count(),
            memtable_bytes: self.memtable.size(),
            sstable_count: self.storage.sstable_count(),
            sstable_bytes: self.storage.total_bytes(),
            wal_bytes,
            next_lsn,
            synced_lsn,
            gc_passes: self.gc.passes.load(Ordering::Relaxed),
            gc_bytes_reclaimed: self.gc.bytes_reclaimed.load(Ordering::Relaxed),
            gc_segments_rewritten: self.gc.segments_rewritten.load(Ordering::Relaxed),
            gc_segments_removed: self.gc.segments_removed.load(Ordering::Relaxed),
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the storage directory path (where SSTables are stored)
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Get the current memtable size
    pub fn memtable_size(&self) -> usize {
        self.memtable.size()
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.entry_count()
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    /// Highest LSN known to be durable
    pub fn synced_lsn(&self) -> u64 {
        self.wal.lock().synced_lsn()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_open(&self) -> Result<RwLockReadGuard<'_, bool>> {
        let open = self.open.read();
        if !*open {
            return Err(DaError::Closed);
        }
        Ok(open)
    }

    /// Internal flush implementation (called with write lock held)
    fn flush_internal(&self) -> Result<()> {
        // Skip if memtable is empty
        if self.memtable.is_empty() {
            return Ok(());
        }

        // Step 1: Flush memtable to SSTable
        self.storage.flush(&self.memtable)?;

        // Step 2: Clear memtable
        self.memtable.clear();

        // Step 3: Truncate WAL (entries are now durable in SSTable)
        self.wal.lock().truncate()?;

        Ok(())
    }

    /// Called from `close` with `open` held for writing
    fn shutdown_internal(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();
        self.flush_internal()?;
        self.wal.lock().sync()?;
        Ok(())
    }

    fn lock_dir(dir: &Path) -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(dir.join(Self::LOCK_FILENAME))?;

        match file.try_lock() {
            Ok(()) => Ok(file),
            Err(TryLockError::WouldBlock) => Err(DaError::Locked(dir.display().to_string())),
            Err(TryLockError::Error(e)) => Err(DaError::Io(e)),
        }
    }
}

fn validate_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(DaError::InvalidArgument("key must not be empty".to_string()));
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(DaError::InvalidArgument(format!(
            "key of {} bytes exceeds limit of {}",
            key.len(),
            MAX_KEY_SIZE
        )));
    }
    Ok(())
}
