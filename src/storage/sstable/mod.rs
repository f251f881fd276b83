//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted record storage. Each file
//! is one segment of the value log; GC reclaims space by rewriting segments.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "DAKV" (4) | Version: u16 (2) | Count: u64 (8) │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Block (variable)                                   │
//! │   [KeyLen: u32][ValLen: u32][ExpiresAt: u64][Key][Value]│
//! │   ... repeated for each entry ...                       │
//! │   (ValLen = u32::MAX means tombstone, no value bytes)   │
//! │   (ExpiresAt = 0 means no expiry)                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block (variable)                                  │
//! │   [KeyLen: u32][Offset: u64][ValLen: u32]               │
//! │   [ExpiresAt: u64][Key]                                 │
//! │   ... repeated for each entry ...                       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                       │
//! │   IndexOffset: u64 (8) | DataCRC: u32 (4) |             │
//! │   IndexCRC: u32 (4)                                     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Files are written under a `.tmp` name and
//! renamed into place once complete, so a crash never exposes a partial file.

mod builder;
mod iterator;
mod reader;

use std::path::PathBuf;

pub use builder::SSTableBuilder;
pub(crate) use builder::sync_dir;
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Magic bytes identifying a dakv SSTable file
pub(crate) const MAGIC: &[u8; 4] = b"DAKV";

/// Current SSTable format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + EntryCount (8) = 14 bytes
pub(crate) const HEADER_SIZE: u64 = 14;

/// Footer size: IndexOffset (8) + DataCRC (4) + IndexCRC (4) = 16 bytes
pub(crate) const FOOTER_SIZE: u64 = 16;

/// Data entry header: KeyLen (4) + ValLen (4) + ExpiresAt (8)
pub(crate) const DATA_ENTRY_HEADER: u64 = 16;

/// Index entry header: KeyLen (4) + Offset (8) + ValLen (4) + ExpiresAt (8)
pub(crate) const INDEX_ENTRY_HEADER: usize = 24;

/// Sentinel value indicating a tombstone
pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

/// Suffix for files still being written
pub(crate) const TMP_SUFFIX: &str = "tmp";

// =============================================================================
// SSTable Metadata
// =============================================================================

/// Metadata returned when a builder finishes a file
#[derive(Debug, Clone)]
pub struct SSTable {
    /// Path to the SSTable file
    pub path: PathBuf,
    /// Number of entries in this SSTable
    pub entry_count: u64,
    /// Smallest key (for range filtering)
    pub min_key: Vec<u8>,
    /// Largest key (for range filtering)
    pub max_key: Vec<u8>,
    /// File size in bytes
    pub file_size: u64,
}

impl SSTable {
    /// Get the number of entries
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Quick check if a key might be in this SSTable (range check)
    pub fn might_contain(&self, key: &[u8]) -> bool {
        key >= self.min_key.as_slice() && key <= self.max_key.as_slice()
    }
}

/// In-memory index slot for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// File offset of the data entry
    pub offset: u64,
    /// Value length, `None` for a tombstone
    pub value_len: Option<u32>,
    /// Absolute expiry (unix millis)
    pub expires_at: Option<u64>,
}

impl IndexEntry {
    pub fn is_tombstone(&self) -> bool {
        self.value_len.is_none()
    }

    /// Bytes this entry occupies in the data block
    pub fn data_size(&self, key_len: usize) -> u64 {
        DATA_ENTRY_HEADER + key_len as u64 + self.value_len.unwrap_or(0) as u64
    }
}

// =============================================================================
// Little-endian helpers
// =============================================================================

pub(crate) fn le_u16(buf: &[u8]) -> u16 {
    let mut out = [0u8; 2];
    out.copy_from_slice(&buf[..2]);
    u16::from_le_bytes(out)
}

pub(crate) fn le_u32(buf: &[u8]) -> u32 {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[..4]);
    u32::from_le_bytes(out)
}

pub(crate) fn le_u64(buf: &[u8]) -> u64 {
    let mut out = [0u8; 8];
    out.copy_from_slice(&buf[..8]);
    u64::from_le_bytes(out)
}
