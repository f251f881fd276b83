//! Tests for retention
//!
//! These tests verify:
//! - How write timeouts become absolute expiries
//! - Expired records read as absent only when discarding is enabled

use std::time::Duration;

use dakv::record::now_millis;
use dakv::DaError;

use crate::{setup_discarding_engine, setup_temp_engine};

#[test]
fn test_expiry_without_discard() {
    let (_temp, engine) = setup_temp_engine();

    assert_eq!(engine.expiry_for(0, 1_000), None);
    assert_eq!(engine.expiry_for(5, 1_000), Some(6_000));
}

#[test]
fn test_expiry_with_discard_uses_default_retention() {
    let (_temp, engine) = setup_discarding_engine(Duration::from_secs(10));

    assert_eq!(engine.expiry_for(0, 1_000), Some(11_000));
    assert_eq!(engine.expiry_for(2, 1_000), Some(3_000));
}

#[test]
fn test_zero_expiry_is_rejected() {
    let (_temp, engine) = setup_discarding_engine(Duration::from_secs(0));

    assert!(matches!(
        engine.put_with_expiry(b"key", b"v", Some(0)),
        Err(DaError::InvalidArgument(_))
    ));
    assert_eq!(engine.get_record(b"key").unwrap(), None);
    assert_eq!(engine.stats().next_lsn, 1);

    // A computed expiry never lands on 0 either
    assert_eq!(engine.expiry_for(0, 0), Some(1));
}

#[test]
fn test_expired_record_hidden_when_discarding() {
    let (_temp, engine) = setup_discarding_engine(Duration::from_secs(3600));
    let past = now_millis() - 1;

    engine.put_with_expiry(b"old", b"v", Some(past)).unwrap();
    engine.put(b"fresh", b"v", 0).unwrap();

    assert_eq!(engine.get(b"old").unwrap(), None);
    assert_eq!(engine.get(b"fresh").unwrap(), Some(b"v".to_vec()));
    // The record is still stored until GC reclaims it
    assert!(engine.get_record(b"old").unwrap().is_some());

    // Same after a flush to SSTable
    engine.flush().unwrap();
    assert_eq!(engine.get(b"old").unwrap(), None);
}

#[test]
fn test_expired_record_kept_without_discard() {
    let (_temp, engine) = setup_temp_engine();

    engine.put_with_expiry(b"old", b"v", Some(now_millis() - 1)).unwrap();

    assert_eq!(engine.get(b"old").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn test_overwrite_resets_expiry() {
    let (_temp, engine) = setup_discarding_engine(Duration::from_secs(3600));

    engine.put_with_expiry(b"key", b"v1", Some(now_millis() - 1)).unwrap();
    engine.flush().unwrap();
    engine.put(b"key", b"v2", 60).unwrap();

    assert_eq!(engine.get(b"key").unwrap(), Some(b"v2".to_vec()));
}
