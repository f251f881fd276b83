//! SSTable Reader
//!
//! Opens SSTable files and provides O(log n) key lookups via in-memory index.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{DaError, Result};
use crate::record::{decode_expiry, Entry, Record};

use super::iterator::SSTableIterator;
use super::{
    le_u16, le_u32, le_u64, IndexEntry, DATA_ENTRY_HEADER, FOOTER_SIZE, HEADER_SIZE,
    INDEX_ENTRY_HEADER, MAGIC, TOMBSTONE_MARKER, VERSION,
};

/// Reader for SSTable files with in-memory index for O(log n) lookups
///
/// The file handle sits behind a Mutex so lookups only need `&self`, which
/// lets the storage manager serve reads under a shared lock.
pub struct SSTableReader {
    path: PathBuf,
    /// File handle for reading entries
    file: Mutex<BufReader<File>>,
    /// In-memory index: key → slot
    index: BTreeMap<Vec<u8>, IndexEntry>,
    entry_count: u64,
    /// Index block starting offset (end of data block)
    index_offset: u64,
    file_size: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Validates header, footer and both checksums, then loads the index into
    /// memory. Any inconsistency is reported as `SegmentCorruption`.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(corruption(path, format!("file too small ({} bytes)", file_size)));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(corruption(
                path,
                format!("invalid magic: expected DAKV, got {:?}", &header[0..4]),
            ));
        }

        let version = le_u16(&header[4..6]);
        if version != VERSION {
            return Err(corruption(path, format!("unsupported version {}", version)));
        }

        let entry_count = le_u64(&header[6..14]);

        file.seek(SeekFrom::Start(file_size - FOOTER_SIZE))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let index_offset = le_u64(&footer[0..8]);
        let data_crc = le_u32(&footer[8..12]);
        let index_crc = le_u32(&footer[12..16]);

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(corruption(path, format!("index offset {} out of bounds", index_offset)));
        }

        // Data block checksum
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = index_offset - HEADER_SIZE;
        let mut buf = vec![0u8; 64 * 1024];
        while remaining > 0 {
            let chunk = remaining.min(buf.len() as u64) as usize;
            file.read_exact(&mut buf[..chunk])?;
            hasher.update(&buf[..chunk]);
            remaining -= chunk as u64;
        }
        if hasher.finalize() != data_crc {
            return Err(corruption(path, "data block CRC mismatch".to_string()));
        }

        // Index block is positioned right after the data block
        let index_block_size = (file_size - FOOTER_SIZE - index_offset) as usize;
        let mut index_data = vec![0u8; index_block_size];
        file.read_exact(&mut index_data)?;
        if crc32fast::hash(&index_data) != index_crc {
            return Err(corruption(path, "index block CRC mismatch".to_string()));
        }

        let index = parse_index(path, &index_data, index_offset)?;
        if index.len() as u64 != entry_count {
            return Err(corruption(
                path,
                format!("header claims {} entries, index holds {}", entry_count, index.len()),
            ));
        }

        file.seek(SeekFrom::Start(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufReader::new(file)),
            index,
            entry_count,
            index_offset,
            file_size,
        })
    }

    /// Get the entry stored for a key — O(log n) lookup via in-memory index
    ///
    /// Returns:
    /// - `Ok(Some(Entry::Live(record)))` — key found with value
    /// - `Ok(Some(Entry::Tombstone))` — key found but is a tombstone
    /// - `Ok(None)` — key not in this SSTable
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        let slot = match self.index.get(key) {
            Some(slot) => *slot,
            None => return Ok(None),
        };

        let value_len = match slot.value_len {
            Some(len) => len as usize,
            None => return Ok(Some(Entry::Tombstone)),
        };

        let value_offset = slot.offset + DATA_ENTRY_HEADER + key.len() as u64;
        let mut value = vec![0u8; value_len];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(value_offset))?;
            file.read_exact(&mut value)?;
        }

        Ok(Some(Entry::Live(Record::new(value, slot.expires_at))))
    }

    /// Whether any version (live or tombstone) of the key lives here
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    /// Index slot for a key, without touching the file
    pub fn index_entry(&self, key: &[u8]) -> Option<&IndexEntry> {
        self.index.get(key)
    }

    /// All index slots in key order
    pub fn index_entries(&self) -> impl Iterator<Item = (&[u8], &IndexEntry)> {
        self.index.iter().map(|(k, v)| (k.as_slice(), v))
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Size of the file on disk
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes occupied by the data block
    pub fn data_size(&self) -> u64 {
        self.index_offset - HEADER_SIZE
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the minimum key in this SSTable (for range filtering)
    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.keys().next().map(|k| k.as_slice())
    }

    /// Get the maximum key in this SSTable (for range filtering)
    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.keys().next_back().map(|k| k.as_slice())
    }

    /// Quick check if a key might be in this SSTable (range check)
    /// Returns false only if the key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false, // Empty SSTable
        }
    }

    /// Create an iterator over all entries (for compaction, debugging)
    pub fn iter(&self) -> Result<SSTableIterator> {
        SSTableIterator::open(&self.path, self.index_offset)
    }
}

fn parse_index(path: &Path, data: &[u8], index_offset: u64) -> Result<BTreeMap<Vec<u8>, IndexEntry>> {
    let mut index = BTreeMap::new();
    let mut pos = 0;

    while pos < data.len() {
        if pos + INDEX_ENTRY_HEADER > data.len() {
            return Err(corruption(path, format!("truncated index entry at {}", pos)));
        }
        let key_len = le_u32(&data[pos..pos + 4]) as usize;
        let offset = le_u64(&data[pos + 4..pos + 12]);
        let val_len = le_u32(&data[pos + 12..pos + 16]);
        let expires_at = le_u64(&data[pos + 16..pos + 24]);
        pos += INDEX_ENTRY_HEADER;

        if pos + key_len > data.len() {
            return Err(corruption(path, format!("truncated index key at {}", pos)));
        }
        let key = data[pos..pos + key_len].to_vec();
        pos += key_len;

        let slot = IndexEntry {
            offset,
            value_len: (val_len != TOMBSTONE_MARKER).then_some(val_len),
            expires_at: decode_expiry(expires_at),
        };
        if offset < HEADER_SIZE || offset + slot.data_size(key_len) > index_offset {
            return Err(corruption(path, format!("index slot points outside data block: {}", offset)));
        }

        index.insert(key, slot);
    }

    Ok(index)
}

fn corruption(path: &Path, detail: String) -> DaError {
    DaError::SegmentCorruption(format!("{}: {}", path.display(), detail))
}
