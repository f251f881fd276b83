//! Tests for StorageManager
//!
//! These tests verify:
//! - Opening/creating storage directories
//! - Flushing MemTable to SSTable
//! - Newest-first lookups and tombstone precedence
//! - Persistence (restart and rediscover SSTables)
//! - Cleanup of interrupted builds

use std::fs;

use dakv::memtable::MemTable;
use dakv::storage::StorageManager;
use dakv::{DaError, Entry, Record};
use tempfile::TempDir;

use crate::{memtable_with, write_segment};

fn live(value: &[u8]) -> Option<Entry> {
    Some(Entry::Live(Record::permanent(value.to_vec())))
}

#[test]
fn test_open_creates_directory() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("sstables");

    let storage = StorageManager::open(&dir).unwrap();

    assert!(dir.exists());
    assert_eq!(storage.sstable_count(), 0);
    assert_eq!(storage.next_sstable_id(), 1);
    assert_eq!(storage.data_dir(), dir.as_path());
}

#[test]
fn test_flush_writes_numbered_sstable() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(temp.path()).unwrap();

    let meta = storage
        .flush(&memtable_with(&[(b"a", b"1"), (b"b", b"2")]))
        .unwrap();

    assert_eq!(meta.entry_count, 2);
    assert!(temp.path().join("sstable_000001.sst").exists());
    assert_eq!(storage.get(b"a").unwrap(), live(b"1"));
    assert_eq!(storage.get(b"zzz").unwrap(), None);
    assert_eq!(storage.total_bytes(), meta.file_size);
}

#[test]
fn test_flush_empty_memtable_fails() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(temp.path()).unwrap();

    assert!(matches!(
        storage.flush(&MemTable::new()),
        Err(DaError::Storage(_))
    ));
}

#[test]
fn test_newest_sstable_wins() {
    let temp = TempDir::new().unwrap();
    let storage = StorageManager::open(temp.path()).unwrap();

    storage.flush(&memtable_with(&[(b"k", b"old"), (b"x", b"1")])).unwrap();
    storage.flush(&memtable_with(&[(b"k", b"new")])).unwrap();

    assert_eq!(storage.sstable_ids(), vec![2, 1]);
    assert_eq!(storage.get(b"k").unwrap(), live(b"new"));
    assert_eq!(storage.get(b"x").unwrap(), live(b"1"));
}

#[test]
fn test_tombstone_hides_older_versions() {
    let temp = TempDir::new().unwrap();
    write_segment(temp.path(), 1, &[(b"k", Some(Record::permanent(b"v".to_vec())))]);
    write_segment(temp.path(), 2, &[(b"k", None)]);

    let storage = StorageManager::open(temp.path()).unwrap();

    assert_eq!(storage.get(b"k").unwrap(), Some(Entry::Tombstone));
}

#[test]
fn test_reopen_discovers_sstables() {
    let temp = TempDir::new().unwrap();
    {
        let storage = StorageManager::open(temp.path()).unwrap();
        storage.flush(&memtable_with(&[(b"a", b"1")])).unwrap();
        storage.flush(&memtable_with(&[(b"b", b"2")])).unwrap();
    }

    let storage = StorageManager::open(temp.path()).unwrap();

    assert_eq!(storage.sstable_ids(), vec![2, 1]);
    assert_eq!(storage.next_sstable_id(), 3);
    assert_eq!(storage.get(b"a").unwrap(), live(b"1"));
    assert_eq!(storage.get(b"b").unwrap(), live(b"2"));
}

#[test]
fn test_open_removes_interrupted_builds() {
    let temp = TempDir::new().unwrap();
    write_segment(temp.path(), 1, &[(b"a", Some(Record::permanent(b"1".to_vec())))]);
    let stray = temp.path().join("sstable_000002.sst.tmp");
    fs::write(&stray, b"half written").unwrap();
    let unrelated = temp.path().join("notes.txt");
    fs::write(&unrelated, b"keep me").unwrap();

    let storage = StorageManager::open(temp.path()).unwrap();

    assert!(!stray.exists());
    assert!(unrelated.exists());
    assert_eq!(storage.sstable_count(), 1);
}

#[test]
fn test_corrupt_sstable_fails_open() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("sstable_000001.sst"), vec![0u8; 64]).unwrap();

    assert!(matches!(
        StorageManager::open(temp.path()),
        Err(DaError::SegmentCorruption(_))
    ));
}
