//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::record::Record;

/// Bytes charged per entry on top of key and value (expiry field)
const ENTRY_OVERHEAD: usize = 8;

/// In-memory table for recent writes
pub struct MemTable {
    data: RwLock<BTreeMap<Vec<u8>, Record>>,
    /// Approximate size in bytes; only updated under the write lock
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get a record by key (read lock); returns an owned copy
    pub fn get(&self, key: &[u8]) -> Option<Record> {
        self.data.read().get(key).cloned()
    }

    /// Whether the key has a version here
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.data.read().contains_key(key)
    }

    /// Snapshot of the keys currently held
    pub fn keys(&self) -> BTreeSet<Vec<u8>> {
        self.data.read().keys().cloned().collect()
    }

    /// Insert or replace a record (write lock)
    ///
    /// Returns the approximate table size after the insert.
    pub fn put(&self, key: Vec<u8>, record: Record) -> usize {
        let mut data = self.data.write();
        let added = entry_size(&key, &record);
        let removed = data
            .get(&key)
            .map(|old| entry_size(&key, old))
            .unwrap_or(0);
        data.insert(key, record);

        let new_size = self.size.load(Ordering::Relaxed) + added - removed;
        self.size.store(new_size, Ordering::Relaxed);
        new_size
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Check if should flush (size >= limit)
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() >= size_limit
    }

    /// Snapshot of all entries in sorted key order (for flush)
    pub fn iter(&self) -> MemTableIterator {
        let snapshot: Vec<(Vec<u8>, Record)> = self
            .data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        MemTableIterator {
            inner: snapshot.into_iter(),
        }
    }

    /// Clear all entries (after successful flush)
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.clear();
        self.size.store(0, Ordering::Relaxed);
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_size(key: &[u8], record: &Record) -> usize {
    key.len() + record.value.len() + ENTRY_OVERHEAD
}

/// Iterator over a MemTable snapshot
pub struct MemTableIterator {
    inner: std::vec::IntoIter<(Vec<u8>, Record)>,
}

impl Iterator for MemTableIterator {
    type Item = (Vec<u8>, Record);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}
