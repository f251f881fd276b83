//! Storage Manager
//!
//! Manages multiple SSTables and coordinates reads/writes.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup
//! - Search SSTables newest → oldest for reads
//! - Create new SSTables from MemTable flushes
//! - Reclaim space by rewriting one segment at a time (value-log GC)

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{DaError, Result};
use crate::memtable::MemTable;
use crate::record::{is_expired, Entry};

use super::sstable::{sync_dir, TMP_SUFFIX};
use super::{IndexEntry, SSTable, SSTableBuilder, SSTableReader};

/// An open SSTable and the id that fixes its precedence
#[derive(Clone)]
struct Segment {
    id: u64,
    reader: Arc<SSTableReader>,
}

/// Inputs of one reclamation pass
#[derive(Debug, Clone, Copy)]
pub struct ReclaimPolicy {
    /// Minimum garbage fraction of a segment's data block before it is rewritten
    pub discard_ratio: f64,
    /// Whether expired records count as garbage
    pub discard_expired: bool,
    /// Reference time for expiry (unix millis)
    pub now_ms: u64,
}

/// What one reclamation pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimOutcome {
    pub sstable_id: u64,
    pub entries_before: u64,
    pub entries_after: u64,
    pub bytes_before: u64,
    pub bytes_after: u64,
    /// The whole segment was garbage and its file was deleted
    pub removed: bool,
}

impl ReclaimOutcome {
    pub fn bytes_reclaimed(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Fate of one entry during a rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Keep,
    /// Expired, but older versions still need shadowing
    Tombstone,
    Drop,
}

/// Manages the storage layer
///
/// ## Concurrency:
/// - `sstables`: Protected by RwLock; readers clone the Arc list and release
///   the lock before touching files
/// - `next_sstable_id`: Atomic counter (lock-free)
/// - Reclamation must be serialized by the caller (the engine's GC lock);
///   flushes may run concurrently with it
pub struct StorageManager {
    /// Directory where SSTables are stored
    data_dir: PathBuf,

    /// Open SSTables, ordered newest → oldest
    sstables: RwLock<Vec<Segment>>,

    /// Next ID for creating new SSTables (atomic, lock-free)
    next_sstable_id: AtomicU64,
}

impl StorageManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Remove leftovers of interrupted builds (`*.tmp`)
    /// 3. Discover existing SSTable files
    /// 4. Open readers for each (validates checksums, loads indexes into RAM)
    /// 5. Order by ID descending (newest first)
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut sstable_ids: Vec<u64> = Vec::new();

        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_path = entry.path();

            if !file_path.is_file() {
                continue;
            }
            if Self::is_tmp_file(&file_path) {
                tracing::warn!(path = %file_path.display(), "Removing incomplete SSTable");
                fs::remove_file(&file_path)?;
                continue;
            }
            if let Some(id) = Self::parse_sstable_id(&file_path) {
                sstable_ids.push(id);
            }
        }

        sstable_ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut sstables = Vec::with_capacity(sstable_ids.len());
        for id in &sstable_ids {
            let reader = SSTableReader::open(&Self::sstable_path_with_dir(path, *id))?;
            sstables.push(Segment {
                id: *id,
                reader: Arc::new(reader),
            });
        }

        // Next ID = max + 1, or 1 if no SSTables exist
        let next_id = sstable_ids.first().map(|&id| id + 1).unwrap_or(1);

        tracing::debug!(
            dir = %path.display(),
            sstables = sstables.len(),
            next_id,
            "Storage opened"
        );

        Ok(Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(sstables),
            next_sstable_id: AtomicU64::new(next_id),
        })
    }

    /// Get the newest entry for a key (searches all SSTables newest → oldest)
    ///
    /// Returns:
    /// - `Ok(Some(Entry::Live(_)))` — key found with value
    /// - `Ok(Some(Entry::Tombstone))` — newest version is a tombstone
    /// - `Ok(None)` — key not in any SSTable
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        let segments = self.sstables.read().clone();

        for segment in &segments {
            // Skip SSTable if key is outside its range (O(1) check)
            if !segment.reader.might_contain(key) {
                continue;
            }
            if let Some(entry) = segment.reader.get(key)? {
                return Ok(Some(entry));
            }
        }

        Ok(None)
    }

    /// Flush a MemTable to a new SSTable
    ///
    /// Creates a new SSTable file from the MemTable's sorted entries,
    /// opens a reader for it, and adds it to the front of the list.
    pub fn flush(&self, memtable: &MemTable) -> Result<SSTable> {
        if memtable.is_empty() {
            return Err(DaError::Storage("Cannot flush empty MemTable".to_string()));
        }

        let id = self.next_sstable_id.fetch_add(1, Ordering::SeqCst);
        let path = self.sstable_path(id);

        // Entries are already sorted (BTreeMap)
        let mut builder = SSTableBuilder::new(&path)?;
        for (key, record) in memtable.iter() {
            builder.add(&key, &record)?;
        }
        let metadata = builder.finish()?;

        let reader = SSTableReader::open(&path)?;
        self.sstables.write().insert(
            0,
            Segment {
                id,
                reader: Arc::new(reader),
            },
        );

        tracing::debug!(
            id,
            entries = metadata.entry_count,
            bytes = metadata.file_size,
            "Flushed MemTable to SSTable"
        );

        Ok(metadata)
    }

    /// Run one reclamation pass
    ///
    /// Scores every segment by the share of its data block that is garbage:
    /// versions shadowed by `newer_keys` or a newer segment, expired records
    /// (when the policy discards them), and tombstones with nothing older left
    /// to shadow. The worst segment at or above `discard_ratio` is rewritten in
    /// place, keeping its precedence slot, or deleted if nothing survives.
    ///
    /// `newer_keys` must only hold keys whose newer version is already
    /// durable; a dropped segment copy is gone for good.
    ///
    /// Returns `Ok(None)` when no segment qualifies.
    pub fn reclaim_one(
        &self,
        newer_keys: &BTreeSet<Vec<u8>>,
        policy: &ReclaimPolicy,
    ) -> Result<Option<ReclaimOutcome>> {
        let snapshot = self.sstables.read().clone();

        let mut best: Option<(usize, f64)> = None;
        for position in 0..snapshot.len() {
            let total = snapshot[position].reader.data_size();
            if total == 0 {
                continue;
            }
            let garbage = garbage_bytes(&snapshot, position, newer_keys, policy);
            if garbage == 0 {
                continue;
            }
            let ratio = garbage as f64 / total as f64;
            if ratio >= policy.discard_ratio && best.map_or(true, |(_, r)| ratio > r) {
                best = Some((position, ratio));
            }
        }

        let (position, ratio) = match best {
            Some(candidate) => candidate,
            None => return Ok(None),
        };
        let target = snapshot[position].clone();
        let path = target.reader.path().to_path_buf();

        tracing::debug!(id = target.id, ratio, "Reclaiming SSTable");

        let mut builder = SSTableBuilder::new(&path)?;
        for item in target.reader.iter()? {
            let (key, entry) = item?;
            let slot = match target.reader.index_entry(&key) {
                Some(slot) => *slot,
                None => {
                    return Err(DaError::SegmentCorruption(format!(
                        "{}: key missing from index",
                        path.display()
                    )))
                }
            };
            match classify(&snapshot, position, &key, &slot, newer_keys, policy) {
                Action::Keep => match entry {
                    Entry::Live(record) => builder.add(&key, &record)?,
                    Entry::Tombstone => builder.add_tombstone(&key)?,
                },
                Action::Tombstone => builder.add_tombstone(&key)?,
                Action::Drop => {}
            }
        }

        let entries_before = target.reader.entry_count();
        let bytes_before = target.reader.file_size();

        if builder.entry_count() == 0 {
            builder.abandon()?;
            self.sstables.write().retain(|s| s.id != target.id);
            fs::remove_file(&path)?;
            sync_dir(&self.data_dir)?;

            return Ok(Some(ReclaimOutcome {
                sstable_id: target.id,
                entries_before,
                entries_after: 0,
                bytes_before,
                bytes_after: 0,
                removed: true,
            }));
        }

        // Atomic rename over the old file; open handles keep the old inode
        let metadata = builder.finish()?;
        let reader = Arc::new(SSTableReader::open(&path)?);

        {
            let mut sstables = self.sstables.write();
            match sstables.iter_mut().find(|s| s.id == target.id) {
                Some(slot) => slot.reader = reader,
                None => {
                    return Err(DaError::Storage(format!(
                        "SSTable {} vanished during reclamation",
                        target.id
                    )))
                }
            }
        }

        Ok(Some(ReclaimOutcome {
            sstable_id: target.id,
            entries_before,
            entries_after: metadata.entry_count,
            bytes_before,
            bytes_after: metadata.file_size,
            removed: false,
        }))
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    /// IDs of open SSTables, newest first
    pub fn sstable_ids(&self) -> Vec<u64> {
        self.sstables.read().iter().map(|s| s.id).collect()
    }

    /// Total on-disk size of all SSTables
    pub fn total_bytes(&self) -> u64 {
        self.sstables.read().iter().map(|s| s.reader.file_size()).sum()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the next SSTable ID (for testing/debugging)
    pub fn next_sstable_id(&self) -> u64 {
        self.next_sstable_id.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Generate the file path for an SSTable with given ID
    fn sstable_path(&self, id: u64) -> PathBuf {
        Self::sstable_path_with_dir(&self.data_dir, id)
    }

    /// Generate SSTable path given a directory and ID
    fn sstable_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("sstable_{:06}.sst", id))
    }

    /// Parse SSTable ID from filename
    /// "sstable_000042.sst" → Some(42)
    fn parse_sstable_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        let id_str = name.strip_prefix("sstable_")?;
        id_str.parse().ok()
    }

    fn is_tmp_file(path: &Path) -> bool {
        let is_tmp = path.extension().map_or(false, |ext| ext == TMP_SUFFIX);
        let is_sstable = path
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.starts_with("sstable_"));
        is_tmp && is_sstable
    }
}

/// Decide what survives a rewrite of `snapshot[position]`
///
/// Newer segments only ever gain shadowing entries and older ones only lose
/// entries (reclamation is serialized), so a stale snapshot errs on the side
/// of keeping data.
fn classify(
    snapshot: &[Segment],
    position: usize,
    key: &[u8],
    slot: &IndexEntry,
    newer_keys: &BTreeSet<Vec<u8>>,
    policy: &ReclaimPolicy,
) -> Action {
    let shadowed = newer_keys.contains(key)
        || snapshot[..position].iter().any(|s| s.reader.contains_key(key));
    if shadowed {
        return Action::Drop;
    }

    let older_versions = || snapshot[position + 1..].iter().any(|s| s.reader.contains_key(key));

    if slot.is_tombstone() {
        return if older_versions() { Action::Keep } else { Action::Drop };
    }

    if policy.discard_expired && is_expired(slot.expires_at, policy.now_ms) {
        return if older_versions() { Action::Tombstone } else { Action::Drop };
    }

    Action::Keep
}

fn garbage_bytes(
    snapshot: &[Segment],
    position: usize,
    newer_keys: &BTreeSet<Vec<u8>>,
    policy: &ReclaimPolicy,
) -> u64 {
    snapshot[position]
        .reader
        .index_entries()
        .map(|(key, slot)| match classify(snapshot, position, key, slot, newer_keys, policy) {
            Action::Keep => 0,
            Action::Tombstone => slot.value_len.unwrap_or(0) as u64,
            Action::Drop => slot.data_size(key.len()),
        })
        .sum()
}
