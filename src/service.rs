//! The external RPC transfer service contract.
//!
//! This is the one genuinely external collaborator in the system: the
//! bidirectional streaming RPC transport that `Read` and `Write` chunks
//! travel over. Production code supplies a real implementation backed by an
//! RPC client; tests supply an in-memory fake (see `tests/support`).

use crate::chunk::{Chunk, Status};

/// A callback invoked once per inbound chunk on a stream. Called from
/// whatever thread the RPC runtime delivers chunks on — implementations must
/// not assume they run on the transfer scheduler's thread.
pub type ChunkCallback = Box<dyn Fn(Chunk) + Send + Sync>;

/// A callback invoked when a stream-level (not transfer-level) error occurs.
pub type StreamErrorCallback = Box<dyn Fn(Status) + Send + Sync>;

/// A single open bidirectional stream (either the `Read` or `Write` RPC).
pub trait TransferStream: Send + Sync {
    /// Sends a chunk on this stream. Errors here are stream-level; they are
    /// reported through the `on_error` callback passed to `open`, not through
    /// this method's return value, mirroring how the underlying RPC runtime
    /// reports send failures asynchronously via its own error channel.
    fn send(&self, chunk: Chunk);
}

/// The transfer RPC service: opens the two long-lived bidirectional streams
/// the manager multiplexes all transfers of each direction over.
pub trait TransferService: Send + Sync {
    fn open_read_stream(
        &self,
        on_chunk: ChunkCallback,
        on_error: StreamErrorCallback,
    ) -> Box<dyn TransferStream>;

    fn open_write_stream(
        &self,
        on_chunk: ChunkCallback,
        on_error: StreamErrorCallback,
    ) -> Box<dyn TransferStream>;
}
