//! Tests for value-log GC
//!
//! These tests verify:
//! - Single passes through the engine, with counters
//! - Discard-ratio validation
//! - Durability of synced data across a reclamation and a power loss
//! - Reclamation alongside live writers and readers
//! - The background loop closing the engine on cancellation

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dakv::config::WalSyncStrategy;
use dakv::engine::Engine;
use dakv::gc::{self, GcLoop, GcState};
use dakv::record::now_millis;
use dakv::{CancellationToken, DaError};
use tempfile::TempDir;

use crate::{setup_discarding_engine, setup_temp_engine, test_config};

/// Two flushed generations of the same keys; the older one is all garbage
fn write_overwritten_generations(engine: &Engine) {
    for generation in 0..2 {
        for i in 0..10 {
            let key = format!("key{}", i);
            let value = format!("gen{}-{}", generation, i);
            engine.put(key.as_bytes(), value.as_bytes(), 0).unwrap();
        }
        engine.flush().unwrap();
    }
}

#[test]
fn test_gc_removes_shadowed_segment() {
    let (_temp, engine) = setup_temp_engine();
    write_overwritten_generations(&engine);
    assert_eq!(engine.sstable_count(), 2);

    let outcome = engine.run_value_log_gc(0.7).unwrap().unwrap();

    assert!(outcome.removed);
    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(engine.get(b"key3").unwrap(), Some(b"gen1-3".to_vec()));
    assert_eq!(engine.run_value_log_gc(0.7).unwrap(), None);

    let stats = engine.stats();
    assert_eq!(stats.gc_passes, 2);
    assert_eq!(stats.gc_segments_removed, 1);
    assert_eq!(stats.gc_segments_rewritten, 0);
    assert_eq!(stats.gc_bytes_reclaimed, outcome.bytes_reclaimed());
}

#[test]
fn test_gc_reclaims_expired_records() {
    let (_temp, engine) = setup_discarding_engine(Duration::from_secs(3600));
    let now = now_millis();

    engine.put_with_expiry(b"short", &[0u8; 512], Some(now + 1_000)).unwrap();
    engine.put(b"long", b"v", 0).unwrap();
    engine.flush().unwrap();

    // Not yet expired
    assert_eq!(engine.run_value_log_gc_at(0.5, now).unwrap(), None);

    let outcome = engine.run_value_log_gc_at(0.5, now + 2_000).unwrap().unwrap();

    assert!(!outcome.removed);
    assert_eq!(outcome.entries_after, 1);
    assert_eq!(engine.get_record(b"short").unwrap(), None);
    assert_eq!(engine.get(b"long").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_gc_keeps_expired_records_without_discard() {
    let (_temp, engine) = setup_temp_engine();

    engine.put_with_expiry(b"short", &[0u8; 512], Some(1)).unwrap();
    engine.flush().unwrap();

    assert_eq!(engine.run_value_log_gc(0.1).unwrap(), None);
    assert_eq!(engine.get(b"short").unwrap(), Some(vec![0u8; 512]));
}

/// Copy what a power loss would leave behind: every segment, and the WAL only
/// up to its last fsync. The WAL here never holds more than the writes since
/// the last flush, so an incomplete sync loses all of it.
fn copy_durable_state(engine: &Engine, to: &Path) {
    let from = engine.data_dir();
    fs::create_dir_all(to.join("sstables")).unwrap();
    for entry in fs::read_dir(from.join("sstables")).unwrap() {
        let entry = entry.unwrap();
        fs::copy(entry.path(), to.join("sstables").join(entry.file_name())).unwrap();
    }

    let stats = engine.stats();
    let wal = fs::read(from.join("wal.log")).unwrap();
    let durable = if stats.synced_lsn + 1 == stats.next_lsn {
        wal.len()
    } else {
        0
    };
    fs::write(to.join("wal.log"), &wal[..durable]).unwrap();
}

#[test]
fn test_gc_never_drops_synced_data_for_unsynced_writes() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir)
        .wal_sync_strategy(WalSyncStrategy::EveryNEntries { count: 100 })
        .build();
    let engine = Engine::open(config).unwrap();

    engine.put(b"k", b"v1", 0).unwrap();
    engine.flush().unwrap();
    engine.sync().unwrap();

    // Same key again; only in the page cache for now
    engine.put(b"k", b"v2", 0).unwrap();

    let outcome = engine.run_value_log_gc(0.7).unwrap().unwrap();
    assert!(outcome.removed);
    assert_eq!(engine.stats().synced_lsn + 1, engine.stats().next_lsn);

    let crashed = TempDir::new().unwrap();
    copy_durable_state(&engine, crashed.path());
    drop(engine);

    let recovered = Engine::open(test_config(&crashed).build()).unwrap();
    assert_eq!(recovered.get(b"k").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn test_gc_alongside_writers_and_readers() {
    const WRITERS: usize = 2;
    const KEYS: usize = 50;
    const ROUNDS: usize = 20;

    let temp_dir = TempDir::new().unwrap();
    let config = || {
        test_config(&temp_dir)
            .wal_sync_strategy(WalSyncStrategy::EveryNEntries { count: 64 })
            .memtable_size_limit(4 * 1024)
            .build()
    };
    let engine = Arc::new(Engine::open(config()).unwrap());
    let shared: &Engine = &engine;
    let key = |writer: usize, i: usize| format!("w{}-k{:03}", writer, i);
    let value = |writer: usize, i: usize, round: usize| {
        format!("{}-{}-{}-{}", writer, i, round, "x".repeat(64))
    };

    let done = AtomicBool::new(false);
    let done = &done;
    thread::scope(|s| {
        let gc = s.spawn(move || {
            let mut passes = 0u64;
            loop {
                shared.run_value_log_gc(0.3).unwrap();
                passes += 1;
                if done.load(Ordering::SeqCst) {
                    break passes;
                }
            }
        });

        let readers: Vec<_> = (0..2)
            .map(|_| {
                s.spawn(move || {
                    let mut i = 0;
                    while !done.load(Ordering::SeqCst) {
                        i = (i + 7) % KEYS;
                        for writer in 0..WRITERS {
                            if let Some(found) = shared.get(key(writer, i).as_bytes()).unwrap() {
                                let prefix = format!("{}-{}-", writer, i);
                                assert!(found.starts_with(prefix.as_bytes()));
                            }
                        }
                    }
                })
            })
            .collect();

        let writers: Vec<_> = (0..WRITERS)
            .map(|writer| {
                s.spawn(move || {
                    for round in 0..ROUNDS {
                        for i in 0..KEYS {
                            shared
                                .put(key(writer, i).as_bytes(), value(writer, i, round).as_bytes(), 0)
                                .unwrap();
                        }
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::SeqCst);
        for reader in readers {
            reader.join().unwrap();
        }
        assert!(gc.join().unwrap() > 0);
    });

    let report = gc::drain(shared, 0.3, &CancellationToken::new());
    assert_eq!(report.error, None);
    let stats = engine.stats();
    assert!(stats.gc_segments_removed + stats.gc_segments_rewritten > 0);

    let latest = |engine: &Engine| {
        for writer in 0..WRITERS {
            for i in 0..KEYS {
                assert_eq!(
                    engine.get(key(writer, i).as_bytes()).unwrap(),
                    Some(value(writer, i, ROUNDS - 1).into_bytes())
                );
            }
        }
    };
    latest(shared);

    engine.close().unwrap();
    let reopened = Engine::open(config()).unwrap();
    latest(&reopened);
}

#[test]
fn test_gc_rejects_bad_ratio() {
    let (_temp, engine) = setup_temp_engine();

    for ratio in [0.0, -0.5, 1.5, f64::NAN] {
        assert!(matches!(
            engine.run_value_log_gc(ratio),
            Err(DaError::InvalidArgument(_))
        ));
    }
    assert!(engine.run_value_log_gc(1.0).is_ok());
}

#[test]
fn test_drain_runs_until_clean() {
    let (_temp, engine) = setup_temp_engine();
    write_overwritten_generations(&engine);
    write_overwritten_generations(&engine);
    assert_eq!(engine.sstable_count(), 4);

    let report = gc::drain(&engine, 0.7, &CancellationToken::new());

    assert_eq!(report.passes, 3);
    assert_eq!(report.segments_removed, 3);
    assert!(!report.cancelled);
    assert_eq!(report.error, None);
    assert_eq!(engine.sstable_count(), 1);
}

#[test]
fn test_drain_stops_when_cancelled() {
    let (_temp, engine) = setup_temp_engine();
    write_overwritten_generations(&engine);
    let token = CancellationToken::new();
    token.cancel();

    let report = gc::drain(&engine, 0.7, &token);

    assert!(report.cancelled);
    assert_eq!(report.passes, 0);
    assert_eq!(engine.sstable_count(), 2);
}

#[test]
fn test_drain_reports_errors() {
    let (_temp, engine) = setup_temp_engine();
    engine.close().unwrap();

    let report = gc::drain(&engine, 0.7, &CancellationToken::new());

    assert!(report.error.is_some());
    assert_eq!(report.passes, 0);
}

#[test]
fn test_gc_loop_reclaims_then_closes_engine_on_cancel() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(Engine::open(test_config(&temp_dir).build()).unwrap());
    write_overwritten_generations(&engine);

    let token = CancellationToken::new();
    let gc_loop = GcLoop::spawn(
        Arc::clone(&engine),
        Duration::from_millis(20),
        0.7,
        token.clone(),
    )
    .unwrap();
    assert_ne!(gc_loop.state(), GcState::Stopped);

    let deadline = Instant::now() + Duration::from_secs(10);
    while engine.stats().gc_segments_removed == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(engine.sstable_count(), 1);

    token.cancel();
    assert!(gc_loop.join());

    assert_eq!(gc_loop.state(), GcState::Stopped);
    assert!(!engine.is_open());
    // Directory is free again
    let reopened = Engine::open(test_config(&temp_dir).build()).unwrap();
    assert_eq!(reopened.get(b"key9").unwrap(), Some(b"gen1-9".to_vec()));
}

#[test]
fn test_gc_loop_stops_promptly() {
    let (_temp, engine) = setup_temp_engine();
    let engine = Arc::new(engine);
    let token = CancellationToken::new();
    let gc_loop =
        GcLoop::spawn(Arc::clone(&engine), Duration::from_secs(3600), 0.7, token.clone()).unwrap();

    let started = Instant::now();
    token.cancel();
    assert!(gc_loop.join());

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!engine.is_open());
}

#[test]
fn test_gc_state_readable_while_join_waits() {
    let (_temp, engine) = setup_temp_engine();
    let token = CancellationToken::new();
    let gc_loop =
        GcLoop::spawn(Arc::new(engine), Duration::from_secs(3600), 0.7, token.clone()).unwrap();

    thread::scope(|s| {
        let joiner = s.spawn(|| gc_loop.join());
        thread::sleep(Duration::from_millis(50));

        // The joiner is parked until cancellation; state must not wait on it
        let started = Instant::now();
        assert_eq!(gc_loop.state(), GcState::Running);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!joiner.is_finished());

        token.cancel();
        assert!(joiner.join().unwrap());
    });

    assert_eq!(gc_loop.state(), GcState::Stopped);
    assert!(gc_loop.join());
}
