//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Request (Command) Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Payload by Command Type
//! - READ:     key_len (4 bytes) + key
//! - WRITE:    key_len (4 bytes) + key + timeout_secs (8 bytes) + value
//! - SYNC:     empty
//! - IDENTITY: empty
//! - PING:     empty
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```

use std::io::{Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Command, CommandType, Response, Status};
use crate::error::{DaError, Result};

/// Header size: 1 byte command/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (64 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Format: cmd_type (1) + payload_len (4) + payload
pub fn encode_command(command: &Command) -> Bytes {
    let payload_len = match command {
        Command::Read { key } => 4 + key.len(),
        Command::Write { key, value, .. } => 4 + key.len() + 8 + value.len(),
        Command::Sync | Command::Identity | Command::Ping => 0,
    };

    let mut message = BytesMut::with_capacity(HEADER_SIZE + payload_len);
    message.put_u8(command.command_type() as u8);
    message.put_u32(payload_len as u32);

    match command {
        Command::Read { key } => {
            message.put_u32(key.len() as u32);
            message.put_slice(key);
        }
        Command::Write {
            key,
            value,
            timeout_secs,
        } => {
            message.put_u32(key.len() as u32);
            message.put_slice(key);
            message.put_u64(*timeout_secs);
            message.put_slice(value);
        }
        Command::Sync | Command::Identity | Command::Ping => {}
    }

    message.freeze()
}

/// Decode a command from a complete frame
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let (cmd_type, mut payload) = split_frame(bytes, "command")?;

    let command_type = CommandType::from_u8(cmd_type).ok_or_else(|| {
        DaError::Protocol(format!("Unknown command type: 0x{:02x}", cmd_type))
    })?;

    match command_type {
        CommandType::Read => {
            let key = read_key(&mut payload, "READ")?;
            if payload.has_remaining() {
                return Err(DaError::Protocol(format!(
                    "READ command: {} trailing bytes",
                    payload.remaining()
                )));
            }
            Ok(Command::Read { key })
        }
        CommandType::Write => {
            let key = read_key(&mut payload, "WRITE")?;
            if payload.remaining() < 8 {
                return Err(DaError::Protocol(
                    "WRITE command: missing timeout".to_string(),
                ));
            }
            let timeout_secs = payload.get_u64();
            let value = payload.to_vec();
            Ok(Command::Write {
                key,
                value,
                timeout_secs,
            })
        }
        CommandType::Sync => expect_empty(payload, "SYNC").map(|_| Command::Sync),
        CommandType::Identity => expect_empty(payload, "IDENTITY").map(|_| Command::Identity),
        CommandType::Ping => expect_empty(payload, "PING").map(|_| Command::Ping),
    }
}

/// Read `key_len (4) + key` off the front of a payload
fn read_key(payload: &mut &[u8], name: &str) -> Result<Vec<u8>> {
    if payload.remaining() < 4 {
        return Err(DaError::Protocol(format!("{} command: missing key length", name)));
    }
    let key_len = payload.get_u32() as usize;

    if payload.remaining() < key_len {
        return Err(DaError::Protocol(format!(
            "{} command: incomplete key (expected {}, got {})",
            name,
            key_len,
            payload.remaining()
        )));
    }

    let key = payload[..key_len].to_vec();
    payload.advance(key_len);
    Ok(key)
}

fn expect_empty(payload: &[u8], name: &str) -> Result<()> {
    if !payload.is_empty() {
        return Err(DaError::Protocol(format!(
            "{} command: unexpected payload of {} bytes",
            name,
            payload.len()
        )));
    }
    Ok(())
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: status (1) + payload_len (4) + payload
pub fn encode_response(response: &Response) -> Bytes {
    let payload = response.payload.as_deref().unwrap_or(&[]);

    let mut message = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    message.put_u8(response.status as u8);
    message.put_u32(payload.len() as u32);
    message.put_slice(payload);

    message.freeze()
}

/// Decode a response from a complete frame
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let (status_byte, payload) = split_frame(bytes, "response")?;

    let status = Status::from_u8(status_byte).ok_or_else(|| {
        DaError::Protocol(format!("Unknown response status: 0x{:02x}", status_byte))
    })?;

    let payload = if payload.is_empty() {
        None
    } else {
        Some(payload.to_vec())
    };

    Ok(Response { status, payload })
}

/// Validate a frame's header and return (type byte, payload)
fn split_frame<'a>(bytes: &'a [u8], what: &str) -> Result<(u8, &'a [u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(DaError::Protocol(format!(
            "Incomplete {} header: expected {} bytes, got {}",
            what,
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let mut header = &bytes[..HEADER_SIZE];
    let kind = header.get_u8();
    let payload_len = check_payload_len(header.get_u32(), what)?;

    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(DaError::Protocol(format!(
            "Incomplete {} payload: expected {} bytes, got {}",
            what,
            total_len,
            bytes.len()
        )));
    }

    Ok((kind, &bytes[HEADER_SIZE..total_len]))
}

fn check_payload_len(len: u32, what: &str) -> Result<usize> {
    if len > MAX_PAYLOAD_SIZE {
        return Err(DaError::Protocol(format!(
            "{} payload too large: {} bytes (max {})",
            what, len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(len as usize)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one frame (header + payload) from a stream
fn read_frame<R: Read>(reader: &mut R, what: &str) -> Result<BytesMut> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let payload_len = check_payload_len(
        u32::from_be_bytes([header[1], header[2], header[3], header[4]]),
        what,
    )?;

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload_len);
    frame.put_slice(&header);
    frame.resize(HEADER_SIZE + payload_len, 0);
    reader.read_exact(&mut frame[HEADER_SIZE..])?;

    Ok(frame)
}

/// Read a complete command from a stream
///
/// Blocks until a complete command is received or an error occurs
pub fn read_command<R: Read>(reader: &mut R) -> Result<Command> {
    let frame = read_frame(reader, "command")?;
    decode_command(&frame)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    writer.write_all(&encode_command(command))?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let frame = read_frame(reader, "response")?;
    decode_response(&frame)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    writer.write_all(&encode_response(response))?;
    writer.flush()?;
    Ok(())
}
