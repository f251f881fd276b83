//! Error types for dakv
//!
//! Two layers:
//! - [`DaError`]: unified error for engine internals (WAL, segments, network, ...)
//! - [`StorageError`]: the taxonomy surfaced by every `StorageService` backend

use thiserror::Error;

/// Result type alias using DaError
pub type Result<T> = std::result::Result<T, DaError>;

/// Unified error type for engine-level operations
#[derive(Debug, Error)]
pub enum DaError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("WAL write failed: {0}")]
    WalWrite(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Segment corruption detected: {0}")]
    SegmentCorruption(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Directory {0} is locked by another store handle")]
    Locked(String),

    #[error("Store handle is closed")]
    Closed,
}

impl From<bincode::Error> for DaError {
    fn from(e: bincode::Error) -> Self {
        DaError::Serialization(e.to_string())
    }
}

/// Failure taxonomy shared by every storage backend.
///
/// Composite callers rely on `NotFound` and `BackendUnavailable` staying
/// distinct: the first means "try another replica or accept expiry", the
/// second means "treat this replica as down".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// No live record exists for the key (never written, or expired)
    #[error("not found")]
    NotFound,

    /// The backend could not service the request (I/O failure, closed handle)
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Caller bug: malformed key or value
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Construction failed; there is no degraded open mode
    #[error("open failed: {0}")]
    OpenFailed(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound)
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::BackendUnavailable(_))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, StorageError::InvalidArgument(_))
    }
}

impl From<DaError> for StorageError {
    fn from(e: DaError) -> Self {
        match e {
            DaError::InvalidArgument(msg) => StorageError::InvalidArgument(msg),
            other => StorageError::BackendUnavailable(other.to_string()),
        }
    }
}
