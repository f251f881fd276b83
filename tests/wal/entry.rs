//! Tests for WalEntry framing

use dakv::wal::{Operation, WalEntry, HEADER_SIZE};
use dakv::DaError;

fn sample() -> WalEntry {
    WalEntry::new(
        7,
        Operation::Put {
            key: b"blob-hash".to_vec(),
            value: vec![0xAB; 300],
            expires_at: Some(1_700_000_000_000),
        },
    )
}

#[test]
fn test_serialize_round_trip_preserves_expiry() {
    let entry = sample();
    let frame = entry.serialize().unwrap();

    assert_eq!(frame.len(), entry.encoded_len().unwrap());
    assert_eq!(&frame[0..8], &7u64.to_le_bytes());

    let decoded = WalEntry::deserialize(&frame).unwrap();
    assert_eq!(decoded, entry);
}

#[test]
fn test_flipped_data_byte_fails_crc() {
    let mut frame = sample().serialize().unwrap();
    let last = frame.len() - 1;
    frame[last] ^= 0xFF;

    match WalEntry::deserialize(&frame) {
        Err(DaError::WalCorruption(msg)) => assert!(msg.contains("CRC")),
        other => panic!("expected CRC failure, got {:?}", other),
    }
}

#[test]
fn test_flipped_lsn_fails_crc() {
    let mut frame = sample().serialize().unwrap();
    frame[0] ^= 0x01;

    assert!(matches!(
        WalEntry::deserialize(&frame),
        Err(DaError::WalCorruption(_))
    ));
}

#[test]
fn test_truncated_frames_are_rejected() {
    let frame = sample().serialize().unwrap();

    assert!(matches!(
        WalEntry::deserialize(&frame[..HEADER_SIZE - 1]),
        Err(DaError::WalCorruption(_))
    ));
    assert!(matches!(
        WalEntry::deserialize(&frame[..frame.len() - 1]),
        Err(DaError::WalCorruption(_))
    ));
}
