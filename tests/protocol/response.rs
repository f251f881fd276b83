//! Tests for mapping responses to and from the storage error taxonomy

use dakv::protocol::{Response, Status};
use dakv::StorageError;

#[test]
fn test_errors_map_to_statuses() {
    assert_eq!(
        Response::from_error(&StorageError::NotFound).status,
        Status::NotFound
    );
    assert_eq!(
        Response::from_error(&StorageError::InvalidArgument("bad".into())),
        Response::invalid_argument("bad")
    );
    assert_eq!(
        Response::from_error(&StorageError::BackendUnavailable("io".into())),
        Response::unavailable("io")
    );
    // Open failures are the backend's problem from a client's point of view
    assert_eq!(
        Response::from_error(&StorageError::OpenFailed("locked".into())).status,
        Status::Unavailable
    );
}

#[test]
fn test_into_result() {
    assert_eq!(
        Response::ok(Some(b"v".to_vec())).into_result(),
        Ok(Some(b"v".to_vec()))
    );
    assert_eq!(Response::ok(None).into_result(), Ok(None));
    assert_eq!(Response::not_found().into_result(), Err(StorageError::NotFound));
    assert_eq!(
        Response::unavailable("disk gone").into_result(),
        Err(StorageError::BackendUnavailable("disk gone".to_string()))
    );
    assert_eq!(
        Response::invalid_argument("empty key").into_result(),
        Err(StorageError::InvalidArgument("empty key".to_string()))
    );
}

#[test]
fn test_status_codes_are_stable() {
    for (byte, status) in [
        (0x00, Status::Ok),
        (0x01, Status::NotFound),
        (0x02, Status::Unavailable),
        (0x03, Status::InvalidArgument),
    ] {
        assert_eq!(Status::from_u8(byte), Some(status));
        assert_eq!(status as u8, byte);
    }
    assert_eq!(Status::from_u8(0x04), None);
}
