//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use serde::{Deserialize, Serialize};

use crate::error::{DaError, Result};
use crate::record::now_millis;

/// Frame header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Upsert a record; `expires_at` is absolute unix millis
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
        expires_at: Option<u64>,
    },
}

impl WalEntry {
    /// Create an entry stamped with the current time
    pub fn new(lsn: u64, operation: Operation) -> Self {
        Self {
            lsn,
            operation,
            timestamp: now_millis(),
        }
    }

    /// Encode into a frame: `[LSN][CRC][Len][bincode(operation, timestamp)]`
    ///
    /// The CRC covers the LSN, the length field and the data.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = bincode::serialize(&(&self.operation, self.timestamp))?;
        let len = u32::try_from(data.len()).map_err(|_| {
            DaError::WalWrite(format!("entry of {} bytes exceeds frame limit", data.len()))
        })?;

        let lsn_bytes = self.lsn.to_le_bytes();
        let len_bytes = len.to_le_bytes();
        let crc = frame_crc(&lsn_bytes, &len_bytes, &data);

        let mut frame = Vec::with_capacity(HEADER_SIZE + data.len());
        frame.extend_from_slice(&lsn_bytes);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&len_bytes);
        frame.extend_from_slice(&data);
        Ok(frame)
    }

    /// Decode one frame from the start of `bytes`
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(DaError::WalCorruption(format!(
                "truncated header: {} of {} bytes",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let data_len = frame_data_len(bytes);
        if bytes.len() < HEADER_SIZE + data_len {
            return Err(DaError::WalCorruption(format!(
                "truncated entry: expected {} data bytes, got {}",
                data_len,
                bytes.len() - HEADER_SIZE
            )));
        }

        let lsn_bytes: [u8; 8] = read_array(&bytes[0..8]);
        let stored_crc = u32::from_le_bytes(read_array(&bytes[8..12]));
        let len_bytes: [u8; 4] = read_array(&bytes[12..16]);
        let data = &bytes[HEADER_SIZE..HEADER_SIZE + data_len];

        let crc = frame_crc(&lsn_bytes, &len_bytes, data);
        if crc != stored_crc {
            return Err(DaError::WalCorruption(format!(
                "CRC mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, crc
            )));
        }

        let (operation, timestamp): (Operation, u64) = bincode::deserialize(data)
            .map_err(|e| DaError::WalCorruption(format!("undecodable payload: {}", e)))?;

        Ok(Self {
            lsn: u64::from_le_bytes(lsn_bytes),
            operation,
            timestamp,
        })
    }

    /// Size of this entry once framed
    pub fn encoded_len(&self) -> Result<usize> {
        Ok(HEADER_SIZE + bincode::serialized_size(&(&self.operation, self.timestamp))? as usize)
    }
}

/// Data length announced by a frame header (caller guarantees `HEADER_SIZE` bytes)
pub(crate) fn frame_data_len(header: &[u8]) -> usize {
    u32::from_le_bytes(read_array(&header[12..16])) as usize
}

fn frame_crc(lsn: &[u8], len: &[u8], data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(lsn);
    hasher.update(len);
    hasher.update(data);
    hasher.finalize()
}

fn read_array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&slice[..N]);
    out
}
