//! Record types shared by the WAL, MemTable and SSTables.

use std::time::{SystemTime, UNIX_EPOCH};

/// Largest accepted key (64 KiB)
pub const MAX_KEY_SIZE: usize = 64 * 1024;

/// Largest accepted value; `u32::MAX` is reserved as the on-disk tombstone marker
pub const MAX_VALUE_SIZE: usize = (u32::MAX - 1) as usize;

/// A stored value plus its optional expiry (unix millis)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub value: Vec<u8>,
    pub expires_at: Option<u64>,
}

impl Record {
    pub fn new(value: Vec<u8>, expires_at: Option<u64>) -> Self {
        Self { value, expires_at }
    }

    /// A record with no expiry
    pub fn permanent(value: Vec<u8>) -> Self {
        Self::new(value, None)
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        is_expired(self.expires_at, now_ms)
    }
}

/// A versioned slot in an SSTable: a live record or a tombstone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Live(Record),
    Tombstone,
}

impl Entry {
    pub fn into_record(self) -> Option<Record> {
        match self {
            Entry::Live(record) => Some(record),
            Entry::Tombstone => None,
        }
    }
}

pub(crate) fn is_expired(expires_at: Option<u64>, now_ms: u64) -> bool {
    matches!(expires_at, Some(at) if at <= now_ms)
}

/// On-disk expiry encoding: 0 means "never"
pub(crate) fn encode_expiry(expires_at: Option<u64>) -> u64 {
    expires_at.unwrap_or(0)
}

pub(crate) fn decode_expiry(raw: u64) -> Option<u64> {
    if raw == 0 {
        None
    } else {
        Some(raw)
    }
}

/// Current wall-clock time in unix millis
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
