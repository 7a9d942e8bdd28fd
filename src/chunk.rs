//! Wire message exchanged on a transfer stream, and status codes carried by it.

use bytes::Bytes;
use std::fmt;

/// Outcome of a transfer, as carried by a terminating [`Chunk`].
///
/// The wire only ever gives us an integer status code; the known values are
/// named here, and anything else survives as [`Status::Other`] rather than
/// being coerced into one of the named variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Cancelled,
    DeadlineExceeded,
    OutOfRange,
    FailedPrecondition,
    Internal,
    Other(i32),
}

impl Status {
    /// True only for [`Status::Ok`] — the sole non-error outcome.
    pub fn ok(self) -> bool {
        matches!(self, Status::Ok)
    }

    pub fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Cancelled => 1,
            Status::DeadlineExceeded => 4,
            Status::OutOfRange => 11,
            Status::FailedPrecondition => 9,
            Status::Internal => 13,
            Status::Other(code) => code,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Status::Ok,
            1 => Status::Cancelled,
            4 => Status::DeadlineExceeded,
            9 => Status::FailedPrecondition,
            11 => Status::OutOfRange,
            13 => Status::Internal,
            other => Status::Other(other),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Cancelled => write!(f, "CANCELLED"),
            Status::DeadlineExceeded => write!(f, "DEADLINE_EXCEEDED"),
            Status::OutOfRange => write!(f, "OUT_OF_RANGE"),
            Status::FailedPrecondition => write!(f, "FAILED_PRECONDITION"),
            Status::Internal => write!(f, "INTERNAL"),
            Status::Other(code) => write!(f, "status {code}"),
        }
    }
}

/// A chunk carried over a transfer stream, in either direction.
///
/// Every field but `transfer_id` is optional on the wire; which subset is
/// present determines the chunk's [`role`](Chunk::role). Builder-style
/// `with_*` setters keep construction sites readable without a field-by-field
/// struct literal at every call site.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    pub transfer_id: u32,
    pub offset: Option<u64>,
    pub data: Option<Bytes>,
    pub pending_bytes: Option<u32>,
    pub max_chunk_size_bytes: Option<u32>,
    pub min_delay_microseconds: Option<u32>,
    pub remaining_bytes: Option<u64>,
    pub status: Option<Status>,
}

/// The semantic role of an incoming or outgoing chunk, classified once on
/// ingress rather than re-probed at every call site that needs to know it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRole {
    /// Carries a terminal `status`; ends the transfer.
    Terminator,
    /// Carries a flow-control window (`pending_bytes` present, no `data`).
    Parameters,
    /// Carries a payload fragment.
    Data,
    /// Bare `{transfer_id}` announcing intent to begin a transfer.
    Start,
}

impl Chunk {
    pub fn bare(transfer_id: u32) -> Self {
        Chunk {
            transfer_id,
            ..Default::default()
        }
    }

    pub fn terminating(transfer_id: u32, status: Status) -> Self {
        Chunk {
            transfer_id,
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn role(&self) -> ChunkRole {
        if self.status.is_some() {
            ChunkRole::Terminator
        } else if self.data.is_some() {
            ChunkRole::Data
        } else if self.pending_bytes.is_some() {
            ChunkRole::Parameters
        } else {
            ChunkRole::Start
        }
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_data(mut self, data: Bytes) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_pending_bytes(mut self, pending_bytes: u32) -> Self {
        self.pending_bytes = Some(pending_bytes);
        self
    }

    pub fn with_max_chunk_size_bytes(mut self, max_chunk_size_bytes: u32) -> Self {
        self.max_chunk_size_bytes = Some(max_chunk_size_bytes);
        self
    }

    pub fn with_min_delay_microseconds(mut self, min_delay_microseconds: u32) -> Self {
        self.min_delay_microseconds = Some(min_delay_microseconds);
        self
    }

    pub fn with_remaining_bytes(mut self, remaining_bytes: u64) -> Self {
        self.remaining_bytes = Some(remaining_bytes);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_terminator_over_everything_else() {
        let chunk = Chunk::bare(1)
            .with_data(Bytes::from_static(b"x"))
            .with_offset(0);
        let terminator = Chunk {
            status: Some(Status::Ok),
            ..chunk
        };
        assert_eq!(terminator.role(), ChunkRole::Terminator);
    }

    #[test]
    fn classifies_parameters_vs_data_vs_start() {
        assert_eq!(Chunk::bare(1).role(), ChunkRole::Start);
        assert_eq!(
            Chunk::bare(1).with_pending_bytes(10).role(),
            ChunkRole::Parameters
        );
        assert_eq!(
            Chunk::bare(1).with_data(Bytes::from_static(b"ab")).role(),
            ChunkRole::Data
        );
    }

    #[test]
    fn status_ok_round_trips_through_code() {
        for status in [
            Status::Ok,
            Status::Cancelled,
            Status::DeadlineExceeded,
            Status::OutOfRange,
            Status::FailedPrecondition,
            Status::Internal,
        ] {
            assert_eq!(Status::from_code(status.code()), status);
        }
        assert!(Status::Ok.ok());
        assert!(!Status::Internal.ok());
        assert_eq!(Status::from_code(42), Status::Other(42));
    }
}
