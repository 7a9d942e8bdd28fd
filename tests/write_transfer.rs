//! Scenario tests for `WriteTransfer` driven end-to-end through `Manager`,
//! against the in-memory fake RPC service in `tests/support`.

mod support;

use std::thread;
use std::time::Duration;

use bytes::Bytes;
use support::{default_timeout, wait_until, FakeService};
use xfer_core::{Chunk, Manager, ManagerConfig, Status};

/// Single window, single chunk.
#[test]
fn write_single_window_single_chunk() {
    let service = FakeService::new();
    let manager = Manager::new(service.clone(), ManagerConfig::default());

    let handle = {
        let manager = manager.clone();
        thread::spawn(move || manager.write(7, Bytes::from_static(b"hello")))
    };

    wait_until(
        || !service.sent_write_chunks().is_empty(),
        default_timeout(),
    );
    assert_eq!(service.sent_write_chunks(), vec![Chunk::bare(7)]);

    service.deliver_write_chunk(
        Chunk::bare(7)
            .with_offset(0)
            .with_pending_bytes(5)
            .with_max_chunk_size_bytes(64),
    );

    wait_until(
        || service.sent_write_chunks().len() == 2,
        default_timeout(),
    );
    let sent = service.sent_write_chunks();
    assert_eq!(
        sent[1],
        Chunk::bare(7)
            .with_offset(0)
            .with_data(Bytes::from_static(b"hello"))
            .with_remaining_bytes(0)
    );

    service.deliver_write_chunk(Chunk::terminating(7, Status::Ok));
    assert_eq!(handle.join().unwrap(), Ok(()));
}

/// Window spans multiple chunks, all emitted from a single parameters update.
#[test]
fn write_multi_chunk_window() {
    let service = FakeService::new();
    let manager = Manager::new(service.clone(), ManagerConfig::default());

    let payload = Bytes::from(vec![0xAAu8; 10]);
    let handle = {
        let manager = manager.clone();
        let payload = payload.clone();
        thread::spawn(move || manager.write(1, payload))
    };

    wait_until(
        || !service.sent_write_chunks().is_empty(),
        default_timeout(),
    );

    service.deliver_write_chunk(
        Chunk::bare(1)
            .with_offset(0)
            .with_pending_bytes(10)
            .with_max_chunk_size_bytes(4),
    );

    wait_until(
        || service.sent_write_chunks().len() == 4,
        default_timeout(),
    );
    let sent = service.sent_write_chunks();
    assert_eq!(
        sent[1],
        Chunk::bare(1)
            .with_offset(0)
            .with_data(payload.slice(0..4))
    );
    assert_eq!(
        sent[2],
        Chunk::bare(1)
            .with_offset(4)
            .with_data(payload.slice(4..8))
    );
    assert_eq!(
        sent[3],
        Chunk::bare(1)
            .with_offset(8)
            .with_data(payload.slice(8..10))
            .with_remaining_bytes(0)
    );

    service.deliver_write_chunk(Chunk::terminating(1, Status::Ok));
    assert_eq!(handle.join().unwrap(), Ok(()));
}

/// Server rolls the offset back mid-transfer; client resumes from there.
#[test]
fn write_rollback() {
    let service = FakeService::new();
    let manager = Manager::new(service.clone(), ManagerConfig::default());

    let payload = Bytes::from(vec![0xAAu8; 10]);
    let handle = {
        let manager = manager.clone();
        let payload = payload.clone();
        thread::spawn(move || manager.write(1, payload))
    };

    wait_until(
        || !service.sent_write_chunks().is_empty(),
        default_timeout(),
    );

    // First window only covers the first 8 bytes, in two 4-byte chunks.
    service.deliver_write_chunk(
        Chunk::bare(1)
            .with_offset(0)
            .with_pending_bytes(8)
            .with_max_chunk_size_bytes(4),
    );
    wait_until(
        || service.sent_write_chunks().len() == 3,
        default_timeout(),
    );

    // Server asks the client to roll back to offset 4 instead of continuing at 8.
    service.deliver_write_chunk(
        Chunk::bare(1)
            .with_offset(4)
            .with_pending_bytes(6)
            .with_max_chunk_size_bytes(4),
    );
    wait_until(
        || service.sent_write_chunks().len() == 5,
        default_timeout(),
    );

    let sent = service.sent_write_chunks();
    assert_eq!(
        sent[3],
        Chunk::bare(1)
            .with_offset(4)
            .with_data(payload.slice(4..8))
    );
    assert_eq!(
        sent[4],
        Chunk::bare(1)
            .with_offset(8)
            .with_data(payload.slice(8..10))
            .with_remaining_bytes(0)
    );

    service.deliver_write_chunk(Chunk::terminating(1, Status::Ok));
    assert_eq!(handle.join().unwrap(), Ok(()));
}

/// Server asks for an offset past EOF; client rejects locally and on the wire.
#[test]
fn write_bad_offset_is_rejected() {
    let service = FakeService::new();
    let manager = Manager::new(service.clone(), ManagerConfig::default());

    let handle = {
        let manager = manager.clone();
        thread::spawn(move || manager.write(2, Bytes::from_static(b"hello")))
    };

    wait_until(
        || !service.sent_write_chunks().is_empty(),
        default_timeout(),
    );

    service.deliver_write_chunk(
        Chunk::bare(2)
            .with_offset(99)
            .with_pending_bytes(1)
            .with_max_chunk_size_bytes(1),
    );

    wait_until(
        || service.sent_write_chunks().len() == 2,
        default_timeout(),
    );
    assert_eq!(
        service.sent_write_chunks()[1],
        Chunk::terminating(2, Status::OutOfRange)
    );

    let result = handle.join().unwrap();
    assert_eq!(
        result,
        Err(xfer_core::Error::TransferFailed {
            id: 2,
            status: Status::OutOfRange
        })
    );
}

/// A write transfer that never hears back from the server times out locally.
#[test]
fn write_times_out_without_parameters() {
    let service = FakeService::new();
    let mut config = ManagerConfig::default();
    config.default_response_timeout = Duration::from_millis(50);
    let manager = Manager::new(service.clone(), config);

    let result = manager.write(9, Bytes::from_static(b"hi"));
    assert_eq!(
        result,
        Err(xfer_core::Error::TransferFailed {
            id: 9,
            status: Status::DeadlineExceeded
        })
    );
}
