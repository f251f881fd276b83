//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::{self, OpenOptions};
use std::path::Path;

use crate::error::Result;

use super::entry::frame_data_len;
use super::{WalEntry, HEADER_SIZE};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the WAL was truncated (partial writes removed)
    pub was_truncated: bool,

    /// Length of the log up to the end of the last complete frame
    pub valid_len: u64,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Detect and skip corrupted entries
    /// 3. Truncate partial writes at end
    /// 4. Return all valid entries in order
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let bytes = fs::read(path)?;
        let (entries, mut result) = scan(&bytes);

        if result.valid_len < bytes.len() as u64 {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(result.valid_len)?;
            file.sync_all()?;
            result.was_truncated = true;

            tracing::warn!(
                path = %path.display(),
                dropped_bytes = bytes.len() as u64 - result.valid_len,
                "Truncated partial write at WAL tail"
            );
        }

        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let bytes = fs::read(path)?;
        let (_, result) = scan(&bytes);
        Ok(result)
    }
}

/// Walk the frames of an in-memory log
///
/// A frame whose announced length fits in the file but fails its CRC is
/// skipped; a frame running past the end of the file marks the torn tail.
fn scan(bytes: &[u8]) -> (Vec<WalEntry>, RecoveryResult) {
    let mut entries = Vec::new();
    let mut result = RecoveryResult::default();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let remaining = bytes.len() - pos;
        if remaining < HEADER_SIZE {
            break;
        }

        let frame_len = HEADER_SIZE + frame_data_len(&bytes[pos..pos + HEADER_SIZE]);
        if remaining < frame_len {
            break;
        }

        match WalEntry::deserialize(&bytes[pos..pos + frame_len]) {
            Ok(entry) => {
                result.entries_recovered += 1;
                result.last_lsn = result.last_lsn.max(entry.lsn);
                entries.push(entry);
            }
            Err(e) => {
                result.entries_corrupted += 1;
                tracing::warn!(offset = pos, error = %e, "Skipping corrupted WAL entry");
            }
        }

        pos += frame_len;
        result.valid_len = pos as u64;
    }

    (entries, result)
}
