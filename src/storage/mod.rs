//! Storage Module
//!
//! Persistent storage layer: immutable SSTable segments plus the manager that
//! orders them and reclaims their space.
//!
//! ## Responsibilities
//! - Persist MemTable flushes to disk in sorted format
//! - Point lookups newest segment → oldest
//! - Value-log GC: rewrite one segment per pass, dropping shadowed, expired
//!   and orphaned entries
//!
//! ## Layout
//! ```text
//! <data_dir>/
//!   LOCK                 held by the open engine
//!   wal.log              write-ahead log
//!   sstables/
//!     sstable_000001.sst oldest segment
//!     sstable_000002.sst
//!     ...                highest id wins on lookup
//! ```

mod manager;
mod sstable;

pub use manager::{ReclaimOutcome, ReclaimPolicy, StorageManager};
pub use sstable::{IndexEntry, SSTable, SSTableBuilder, SSTableIterator, SSTableReader};
