//! Protocol Module
//!
//! Defines the wire protocol spoken between `RemoteStorageService` and
//! `dakv-server`.
//!
//! ## Protocol Format (V1 - Simple Binary)
//!
//! ### Request Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Commands
//! - 0x01: READ     - Payload: key_len (4) + key
//! - 0x02: WRITE    - Payload: key_len (4) + key + timeout_secs (8) + value
//! - 0x03: SYNC     - Payload: empty
//! - 0x04: IDENTITY - Payload: empty
//! - 0x05: PING     - Payload: empty
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Status Codes
//! - 0x00: OK
//! - 0x01: NOT_FOUND
//! - 0x02: UNAVAILABLE         (payload: message)
//! - 0x03: INVALID_ARGUMENT    (payload: message)
//!
//! All integers are big-endian.

mod codec;
mod command;
mod response;

pub use codec::{
    decode_command, decode_response, encode_command, encode_response, read_command,
    read_response, write_command, write_response, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use command::{Command, CommandType};
pub use response::{Response, Status};
