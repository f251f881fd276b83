//! SSTable Iterator
//!
//! Sequential iteration over all entries in an SSTable.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{DaError, Result};
use crate::record::{decode_expiry, Entry, Record};

use super::{le_u32, le_u64, DATA_ENTRY_HEADER, HEADER_SIZE, TOMBSTONE_MARKER};

/// Iterator over SSTable entries in sorted key order
///
/// Owns a separate file handle, so point lookups on the same table are
/// never blocked by a running scan.
pub struct SSTableIterator {
    file: BufReader<File>,
    /// Stop reading when we reach this offset (start of index block)
    end_offset: u64,
    /// Current position in file
    current_offset: u64,
}

impl SSTableIterator {
    /// Create a new iterator starting from the data block
    pub(super) fn open(path: &Path, end_offset: u64) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        Ok(Self {
            file,
            end_offset,
            current_offset: HEADER_SIZE,
        })
    }

    fn read_entry(&mut self) -> Result<(Vec<u8>, Entry)> {
        let mut header = [0u8; DATA_ENTRY_HEADER as usize];
        self.file.read_exact(&mut header)?;

        let key_len = le_u32(&header[0..4]) as usize;
        let val_len = le_u32(&header[4..8]);
        let expires_at = decode_expiry(le_u64(&header[8..16]));

        let value_len = if val_len == TOMBSTONE_MARKER { 0 } else { val_len as u64 };
        let entry_size = DATA_ENTRY_HEADER + key_len as u64 + value_len;
        if self.current_offset + entry_size > self.end_offset {
            return Err(DaError::SegmentCorruption(format!(
                "entry at {} runs past data block",
                self.current_offset
            )));
        }

        let mut key = vec![0u8; key_len];
        self.file.read_exact(&mut key)?;

        let entry = if val_len == TOMBSTONE_MARKER {
            Entry::Tombstone
        } else {
            let mut value = vec![0u8; val_len as usize];
            self.file.read_exact(&mut value)?;
            Entry::Live(Record::new(value, expires_at))
        };

        self.current_offset += entry_size;
        Ok((key, entry))
    }
}

impl Iterator for SSTableIterator {
    type Item = Result<(Vec<u8>, Entry)>;

    fn next(&mut self) -> Option<Self::Item> {
        // Stop at index block
        if self.current_offset >= self.end_offset {
            return None;
        }

        match self.read_entry() {
            Ok(item) => Some(Ok(item)),
            Err(e) => {
                // Poison the iterator so a bad entry is reported once
                self.current_offset = self.end_offset;
                Some(Err(e))
            }
        }
    }
}
