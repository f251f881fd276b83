//! Configuration for dakv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{DaError, Result};

/// Main configuration for a dakv store handle
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files (WAL, SSTables, lock file)
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── LOCK             (exclusive lock, held while open)
    ///     ├── wal.log          (write-ahead log)
    ///     └── sstables/        (SSTable segments)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes)
    pub memtable_size_limit: usize,

    // -------------------------------------------------------------------------
    // Retention Configuration
    // -------------------------------------------------------------------------
    /// When true, records past their expiry read as absent and are reclaimed by GC.
    /// When false, every record is retained forever regardless of its timeout.
    pub discard_after_timeout: bool,

    /// Retention applied to writes without a timeout when discarding is enabled
    pub default_retention: Duration,

    // -------------------------------------------------------------------------
    // GC Configuration
    // -------------------------------------------------------------------------
    /// Interval between background GC ticks
    pub gc_interval: Duration,

    /// Minimum garbage fraction (0, 1] a segment needs before it is rewritten
    pub gc_discard_ratio: f64,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries; `sync()` is the durability barrier in between
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./dakv_data"),
            wal_sync_strategy: WalSyncStrategy::EveryNEntries { count: 100 },
            memtable_size_limit: 64 * 1024 * 1024, // 64 MB
            discard_after_timeout: false,
            default_retention: Duration::from_secs(21 * 24 * 60 * 60), // 3 weeks
            gc_interval: Duration::from_secs(5 * 60),
            gc_discard_ratio: 0.7,
            listen_addr: "127.0.0.1:9876".to_string(),
            max_connections: 1024,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.gc_discard_ratio > 0.0 && self.gc_discard_ratio <= 1.0) {
            return Err(DaError::Config(format!(
                "gc_discard_ratio must be in (0, 1], got {}",
                self.gc_discard_ratio
            )));
        }
        if self.gc_interval.is_zero() {
            return Err(DaError::Config("gc_interval must be non-zero".to_string()));
        }
        if self.memtable_size_limit == 0 {
            return Err(DaError::Config(
                "memtable_size_limit must be non-zero".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(DaError::Config("max_connections must be non-zero".to_string()));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(DaError::Config(
                "EveryNEntries sync count must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Enable or disable discarding records after their timeout
    pub fn discard_after_timeout(mut self, discard: bool) -> Self {
        self.config.discard_after_timeout = discard;
        self
    }

    /// Set the retention used for writes that carry no timeout
    pub fn default_retention(mut self, retention: Duration) -> Self {
        self.config.default_retention = retention;
        self
    }

    /// Set the background GC tick interval
    pub fn gc_interval(mut self, interval: Duration) -> Self {
        self.config.gc_interval = interval;
        self
    }

    /// Set the garbage ratio a segment needs before it is rewritten
    pub fn gc_discard_ratio(mut self, ratio: f64) -> Self {
        self.config.gc_discard_ratio = ratio;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
