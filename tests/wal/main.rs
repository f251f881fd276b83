//! WAL tests: framing, appends, reading back and crash recovery.

mod entry;
mod recovery;

use std::path::{Path, PathBuf};

use dakv::config::WalSyncStrategy;
use dakv::wal::{Operation, WalWriter};
use tempfile::TempDir;

pub fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

pub fn put(i: usize) -> Operation {
    Operation::Put {
        key: format!("key{}", i).into_bytes(),
        value: format!("value{}", i).into_bytes(),
        expires_at: None,
    }
}

/// Write entries using WalWriter (produces a well-formed WAL)
pub fn write_entries_via_writer(path: &Path, count: usize) {
    let mut writer = WalWriter::open(path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..count {
        writer.append(put(i)).unwrap();
    }
}
