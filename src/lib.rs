//! # dakv
//!
//! Storage layer for data-availability blobs:
//! - A uniform `StorageService` contract over local, remote and composite backends
//! - An embedded log-structured engine with Write-Ahead Logging and crash recovery
//! - Per-record retention with background space reclamation (value-log GC)
//! - Cancellation-driven shutdown that closes every handle exactly once
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        StorageService (read / write / sync / identity)      │
//! │   DbStorageService · RemoteStorageService · Redundant(..)   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Engine                               │
//! │            (Single Writer / Multi Reader)                   │
//! └───────┬─────────────────────────────────────────▲───────────┘
//!         │                                         │
//!    ┌────┴────────────────┐                 ┌──────┴──────┐
//!    ▼                     ▼                 │   GC loop   │
//! ┌─────────────┐   ┌─────────────┐          │ (dakv-gc,   │
//! │     WAL     │   │  MemTable   │          │  ticks until│
//! │  (Append)   │   │  (RwLock)   │          │  cancelled) │
//! └─────────────┘   └──────┬──────┘          └──────┬──────┘
//!                          │ flush                  │ reclaim
//!                          ▼                        ▼
//!                   ┌──────────────────────────────────────┐
//!                   │        Storage (SSTable segments)    │
//!                   └──────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod record;

pub mod engine;
pub mod gc;
pub mod lifecycle;
pub mod memtable;
pub mod storage;
pub mod wal;

pub mod network;
pub mod protocol;
pub mod service;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, WalSyncStrategy};
pub use engine::{Engine, EngineStats};
pub use error::{DaError, Result, StorageError};
pub use gc::{GcCycleReport, GcState};
pub use lifecycle::CancellationToken;
pub use record::{Entry, Record};
pub use service::{
    DbStorageService, RedundantStorageService, RemoteStorageService, ServiceResult,
    StorageService,
};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of dakv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
