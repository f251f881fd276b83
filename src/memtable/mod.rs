//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Single-writer/multi-reader access pattern
//! - Track size for flush triggers
//! - Ordered iteration for SSTable creation
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in a parking_lot RwLock:
//! - Ordered keys (required for SSTable generation)
//! - Many concurrent readers, one writer at a time
//!
//! The MemTable never holds tombstones: the storage contract has no delete,
//! and tombstones are only produced when GC rewrites a segment.

mod table;

pub use table::{MemTable, MemTableIterator};
