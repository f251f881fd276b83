//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append log entries before any mutation
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for ordering
//! - Crash recovery and replay
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Entry 1                                  │
//! │ ┌─────────┬─────────┬─────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │ Len (4) │ Data   │ │
//! │ └─────────┴─────────┴─────────┴────────┘ │
//! ├──────────────────────────────────────────┤
//! │ Entry 2                                  │
//! │ ┌─────────┬─────────┬─────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │ Len (4) │ Data   │ │
//! │ └─────────┴─────────┴─────────┴────────┘ │
//! └──────────────────────────────────────────┘
//! ```
//!
//! `Data` is the bincode encoding of `(Operation, timestamp)`. The CRC covers
//! LSN, Len and Data, all little-endian.

mod entry;
mod reader;
mod recovery;
mod writer;

pub use entry::{Operation, WalEntry, HEADER_SIZE};
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;
