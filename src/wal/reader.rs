//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{DaError, Result};

use super::entry::frame_data_len;
use super::{WalEntry, HEADER_SIZE};

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    position: u64,
    file_len: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at a clean end of log. A frame cut short by the end
    /// of the file, or one failing its CRC, is reported as `WalCorruption`.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let remaining = self.file_len - self.position;
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < HEADER_SIZE as u64 {
            return Err(DaError::WalCorruption(format!(
                "truncated header at offset {}",
                self.position
            )));
        }

        let mut header = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header)?;

        let data_len = frame_data_len(&header);
        if remaining < (HEADER_SIZE + data_len) as u64 {
            self.position = self.file_len;
            return Err(DaError::WalCorruption(format!(
                "truncated entry at offset {}: {} data bytes announced",
                self.file_len - remaining,
                data_len
            )));
        }

        let mut frame = Vec::with_capacity(HEADER_SIZE + data_len);
        frame.extend_from_slice(&header);
        frame.resize(HEADER_SIZE + data_len, 0);
        self.reader.read_exact(&mut frame[HEADER_SIZE..])?;
        self.position += frame.len() as u64;

        WalEntry::deserialize(&frame).map(Some)
    }

    /// Byte offset of the next frame
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Iterate over entries until the end of log or the first error
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
