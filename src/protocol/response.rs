//! Response definitions
//!
//! Represents responses to clients. Status codes mirror `StorageError`, so a
//! remote backend reports the same taxonomy as a local one.

use crate::error::StorageError;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    NotFound = 0x01,
    Unavailable = 0x02,
    InvalidArgument = 0x03,
}

impl Status {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Status::Ok),
            0x01 => Some(Status::NotFound),
            0x02 => Some(Status::Unavailable),
            0x03 => Some(Status::InvalidArgument),
            _ => None,
        }
    }
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Optional payload (value for READ, identity string, or error message)
    pub payload: Option<Vec<u8>>,
}

impl Response {
    /// Create an OK response with optional payload
    pub fn ok(payload: Option<Vec<u8>>) -> Self {
        Self {
            status: Status::Ok,
            payload,
        }
    }

    /// Create a NOT_FOUND response
    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            payload: None,
        }
    }

    /// Create an UNAVAILABLE response
    pub fn unavailable(message: &str) -> Self {
        Self {
            status: Status::Unavailable,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    /// Create an INVALID_ARGUMENT response
    pub fn invalid_argument(message: &str) -> Self {
        Self {
            status: Status::InvalidArgument,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    /// Map a backend failure onto the wire
    pub fn from_error(error: &StorageError) -> Self {
        match error {
            StorageError::NotFound => Self::not_found(),
            StorageError::InvalidArgument(msg) => Self::invalid_argument(msg),
            StorageError::BackendUnavailable(msg) | StorageError::OpenFailed(msg) => {
                Self::unavailable(msg)
            }
        }
    }

    /// Map the wire back onto the storage taxonomy; `Ok` yields the payload
    pub fn into_result(self) -> Result<Option<Vec<u8>>, StorageError> {
        if self.status == Status::Ok {
            return Ok(self.payload);
        }
        let message = self
            .payload
            .as_deref()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default();
        match self.status {
            Status::Ok | Status::NotFound => Err(StorageError::NotFound),
            Status::Unavailable => Err(StorageError::BackendUnavailable(message)),
            Status::InvalidArgument => Err(StorageError::InvalidArgument(message)),
        }
    }
}
