//! Tests for RemoteStorageService against a live server
//!
//! These tests verify:
//! - The contract holds across the wire, including the error taxonomy
//! - Identity and ping
//! - Reconnecting after the server drops an idle connection
//! - Connection limits and unreachable servers

use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use dakv::service::{RemoteStorageService, StorageService};
use dakv::StorageError;

use crate::TestServer;

#[test]
fn test_remote_write_read_sync() {
    let server = TestServer::start();
    let client = RemoteStorageService::new(server.addr.clone());

    client.write(b"k1", b"v1", 0).unwrap();
    client.sync().unwrap();
    client.sync().unwrap();

    assert_eq!(client.read(b"k1").unwrap(), b"v1".to_vec());
    // Visible through the local handle as well
    assert_eq!(server.store.read(b"k1").unwrap(), b"v1".to_vec());
}

#[test]
fn test_remote_preserves_error_taxonomy() {
    let server = TestServer::start();
    let client = RemoteStorageService::new(server.addr.clone());

    assert_eq!(client.read(b"missing"), Err(StorageError::NotFound));
    assert!(client.read(b"").unwrap_err().is_invalid_argument());
    assert!(client.write(b"", b"v", 0).unwrap_err().is_invalid_argument());
}

#[test]
fn test_remote_empty_value() {
    let server = TestServer::start();
    let client = RemoteStorageService::new(server.addr.clone());

    client.write(b"empty", b"", 0).unwrap();

    assert_eq!(client.read(b"empty").unwrap(), Vec::<u8>::new());
}

#[test]
fn test_remote_identity_and_ping() {
    let server = TestServer::start();
    let client = RemoteStorageService::new(server.addr.clone());

    client.ping().unwrap();
    assert_eq!(client.remote_identity().unwrap(), server.store.identity());
    assert_eq!(client.identity(), format!("RemoteStorage({})", server.addr));
    assert_eq!(client.addr(), server.addr);
}

#[test]
fn test_remote_reconnects_after_idle_close() {
    let server = TestServer::start();
    let client = RemoteStorageService::new(server.addr.clone());
    client.write(b"k", b"v", 0).unwrap();

    // Longer than the server's read timeout, so it hangs up on us
    thread::sleep(Duration::from_millis(800));

    assert_eq!(client.read(b"k").unwrap(), b"v".to_vec());
}

#[test]
fn test_remote_rejected_over_connection_limit() {
    let server = TestServer::start_with(|mut config| {
        config.max_connections = 1;
        config.read_timeout_ms = 2000;
        config
    });
    let first = RemoteStorageService::new(server.addr.clone());
    first.ping().unwrap();

    // Rejected either with an UNAVAILABLE frame or a reset, depending on timing
    let second = RemoteStorageService::new(server.addr.clone());
    assert!(second.ping().unwrap_err().is_unavailable());

    // The admitted client is unaffected
    first.ping().unwrap();
}

#[test]
fn test_remote_unreachable_is_unavailable() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let client = RemoteStorageService::with_timeout(addr.clone(), Duration::from_secs(1));

    match client.read(b"k") {
        Err(StorageError::BackendUnavailable(msg)) => assert!(msg.contains(&addr)),
        other => panic!("expected BackendUnavailable, got {:?}", other),
    }
    assert!(client.sync().unwrap_err().is_unavailable());
}

#[test]
fn test_remote_after_server_shutdown() {
    let mut server = TestServer::start();
    let client = RemoteStorageService::with_timeout(server.addr.clone(), Duration::from_secs(1));
    client.write(b"k", b"v", 0).unwrap();

    server.stop();

    assert!(client.read(b"k").unwrap_err().is_unavailable());
}
