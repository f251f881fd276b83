//! Tests for WAL Recovery
//!
//! These tests verify:
//! - Recovery from a clean WAL (no corruption)
//! - Recovery from an empty WAL
//! - Recovery with partial writes (truncated tail)
//! - Recovery with corrupted entries (CRC mismatch)
//! - Verify mode (stats only, file untouched)

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use dakv::wal::{RecoveryResult, WalEntry, WalRecovery};

use crate::{put, setup_temp_wal, write_entries_via_writer};

/// Write raw serialized entries directly to a file (for crafting corruption)
fn write_raw_entries(path: &Path, entries: &[WalEntry]) -> Vec<usize> {
    let mut file = File::create(path).unwrap();
    let mut offsets = Vec::new();
    let mut offset = 0;
    for entry in entries {
        let bytes = entry.serialize().unwrap();
        offsets.push(offset);
        offset += bytes.len();
        file.write_all(&bytes).unwrap();
    }
    file.sync_all().unwrap();
    offsets
}

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result, RecoveryResult::default());
}

#[test]
fn test_recover_clean_log() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 10);
    let len = fs::metadata(&wal_path).unwrap().len();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 10);
    assert_eq!(result.entries_recovered, 10);
    assert_eq!(result.entries_corrupted, 0);
    assert_eq!(result.last_lsn, 10);
    assert_eq!(result.valid_len, len);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_truncates_partial_write() {
    let (_temp, wal_path) = setup_temp_wal();
    let entries: Vec<WalEntry> = (0..3).map(|i| WalEntry::new(i as u64 + 1, put(i))).collect();
    write_raw_entries(&wal_path, &entries);
    let clean_len = fs::metadata(&wal_path).unwrap().len();

    // Simulate a crash halfway through a fourth frame
    let torn = WalEntry::new(4, put(3)).serialize().unwrap();
    let mut file = fs::OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&torn[..torn.len() / 2]).unwrap();
    drop(file);

    let (recovered, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(recovered, entries);
    assert!(result.was_truncated);
    assert_eq!(result.last_lsn, 3);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), clean_len);
}

#[test]
fn test_recover_skips_corrupted_middle_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    let entries: Vec<WalEntry> = (0..3).map(|i| WalEntry::new(i as u64 + 1, put(i))).collect();
    let offsets = write_raw_entries(&wal_path, &entries);

    // Flip the last data byte of the second frame
    let mut bytes = fs::read(&wal_path).unwrap();
    bytes[offsets[2] - 1] ^= 0xFF;
    fs::write(&wal_path, &bytes).unwrap();

    let (recovered, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(recovered.len(), 2);
    assert_eq!(recovered[0].lsn, 1);
    assert_eq!(recovered[1].lsn, 3);
    assert_eq!(result.entries_corrupted, 1);
    assert!(!result.was_truncated);
}

#[test]
fn test_verify_leaves_file_untouched() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 2);

    let mut file = fs::OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[0u8; 5]).unwrap();
    drop(file);
    let len_before = fs::metadata(&wal_path).unwrap().len();

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 2);
    assert!(result.valid_len < len_before);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), len_before);
}
