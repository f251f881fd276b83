//! Command definitions
//!
//! Represents requests from clients.

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Read = 0x01,
    Write = 0x02,
    Sync = 0x03,
    Identity = 0x04,
    Ping = 0x05,
}

impl CommandType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(CommandType::Read),
            0x02 => Some(CommandType::Write),
            0x03 => Some(CommandType::Sync),
            0x04 => Some(CommandType::Identity),
            0x05 => Some(CommandType::Ping),
            _ => None,
        }
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read the live value for a key
    Read { key: Vec<u8> },

    /// Upsert a record with a relative retention timeout
    Write {
        key: Vec<u8>,
        value: Vec<u8>,
        timeout_secs: u64,
    },

    /// Durability barrier
    Sync,

    /// Describe the backend behind the server
    Identity,

    /// Ping (health check)
    Ping,
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Read { .. } => CommandType::Read,
            Command::Write { .. } => CommandType::Write,
            Command::Sync => CommandType::Sync,
            Command::Identity => CommandType::Identity,
            Command::Ping => CommandType::Ping,
        }
    }
}
