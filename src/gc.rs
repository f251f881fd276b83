//! GC Module
//!
//! Background retention loop for an open engine.
//!
//! ```text
//!            tick                       no garbage / error / cancel
//! Running ─────────────▶ Compacting ─────────────────────────────▶ Running
//!    │
//!    │ cancel
//!    ▼
//! Stopped   (engine closed exactly once, thread exits)
//! ```
//!
//! Each tick drains: one reclamation pass after another until a pass finds
//! nothing to reclaim, fails, or cancellation is observed. Cancellation is
//! checked before every pass, so shutdown waits for at most one pass.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel;
use parking_lot::Mutex;

use crate::engine::Engine;
use crate::error::Result;
use crate::lifecycle::CancellationToken;

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcState {
    /// Waiting for the next tick
    Running,
    /// Draining reclaimable segments
    Compacting,
    /// Cancelled; the engine has been closed
    Stopped,
}

impl GcState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => GcState::Running,
            1 => GcState::Compacting,
            _ => GcState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            GcState::Running => 0,
            GcState::Compacting => 1,
            GcState::Stopped => 2,
        }
    }
}

/// Summary of one drain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcCycleReport {
    /// Passes that reclaimed a segment
    pub passes: u64,
    pub segments_rewritten: u64,
    pub segments_removed: u64,
    pub bytes_reclaimed: u64,
    /// Stopped early because of cancellation
    pub cancelled: bool,
    /// The pass error that ended the drain, if any
    pub error: Option<String>,
}

/// Run reclamation passes until nothing qualifies, a pass fails, or the
/// token fires. Errors end the drain; they are never fatal.
pub fn drain(engine: &Engine, discard_ratio: f64, token: &CancellationToken) -> GcCycleReport {
    let mut report = GcCycleReport::default();

    loop {
        if token.is_cancelled() {
            report.cancelled = true;
            break;
        }

        match engine.run_value_log_gc(discard_ratio) {
            Ok(Some(outcome)) => {
                report.passes += 1;
                report.bytes_reclaimed += outcome.bytes_reclaimed();
                if outcome.removed {
                    report.segments_removed += 1;
                } else {
                    report.segments_rewritten += 1;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "GC pass failed, ending drain");
                report.error = Some(e.to_string());
                break;
            }
        }
    }

    report
}

/// Handle to the background GC thread
///
/// `state` is readable at any time, including while another caller is
/// blocked in `join`.
pub struct GcLoop {
    state: Arc<AtomicU8>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl GcLoop {
    /// Spawn the loop. It owns closing `engine` once `token` fires.
    pub fn spawn(
        engine: Arc<Engine>,
        interval: Duration,
        discard_ratio: f64,
        token: CancellationToken,
    ) -> Result<Self> {
        let state = Arc::new(AtomicU8::new(GcState::Running.as_u8()));
        let thread_state = Arc::clone(&state);

        let handle = thread::Builder::new()
            .name("dakv-gc".to_string())
            .spawn(move || run(&engine, interval, discard_ratio, &token, &thread_state))?;

        Ok(Self {
            state,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn state(&self) -> GcState {
        GcState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Wait for the thread to exit. Returns `false` if it panicked.
    ///
    /// Only meaningful after the token has been cancelled. Concurrent callers
    /// wait for the same exit; joining again returns `true` immediately.
    pub fn join(&self) -> bool {
        let mut slot = self.handle.lock();
        match slot.take() {
            Some(handle) => handle.join().is_ok(),
            None => true,
        }
    }
}

fn run(
    engine: &Engine,
    interval: Duration,
    discard_ratio: f64,
    token: &CancellationToken,
    state: &AtomicU8,
) {
    tracing::debug!(?interval, discard_ratio, "GC loop started");
    let ticker = channel::tick(interval);

    loop {
        crossbeam::select! {
            recv(ticker) -> _ => {
                state.store(GcState::Compacting.as_u8(), Ordering::SeqCst);
                let started = Instant::now();
                let report = drain(engine, discard_ratio, token);
                state.store(GcState::Running.as_u8(), Ordering::SeqCst);

                if report.passes > 0 {
                    tracing::info!(
                        passes = report.passes,
                        rewritten = report.segments_rewritten,
                        removed = report.segments_removed,
                        reclaimed = report.bytes_reclaimed,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "GC cycle"
                    );
                }
            }
            recv(token.receiver()) -> _ => break,
        }
    }

    state.store(GcState::Stopped.as_u8(), Ordering::SeqCst);

    // Shutdown is unconditional: close errors are reported, never raised
    if let Err(e) = engine.close() {
        tracing::error!(error = %e, "Engine close failed during shutdown");
    }
    tracing::debug!("GC loop stopped");
}
