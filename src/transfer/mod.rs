//! Per-transfer state machines.
//!
//! [`ReadTransfer`] and [`WriteTransfer`] both embed a [`TransferCore`], which
//! owns the bits every transfer needs regardless of direction: its id, its
//! final status, the one-shot channel that wakes the blocked caller, and its
//! response timer. The direction-specific logic lives entirely in
//! `read.rs`/`write.rs`.

pub mod read;
pub mod write;

pub use read::ReadTransfer;
pub use write::WriteTransfer;

use std::fmt;

use tokio::sync::oneshot;

use crate::error::Error;
use crate::timer::Timer;

/// Which of the manager's two registries a transfer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => write!(f, "read"),
            Direction::Write => write!(f, "write"),
        }
    }
}

/// State shared by every transfer, independent of direction.
///
/// `T` is the value the caller's `read`/`write` call resolves to on success
/// — `Bytes` for a read, `()` for a write.
pub(crate) struct TransferCore<T> {
    pub id: u32,
    pub status: crate::chunk::Status,
    pub done: bool,
    pub timer: Timer,
    done_tx: Option<oneshot::Sender<std::result::Result<T, Error>>>,
}

impl<T> TransferCore<T> {
    pub fn new(id: u32, done_tx: oneshot::Sender<std::result::Result<T, Error>>) -> Self {
        Self {
            id,
            status: crate::chunk::Status::Ok,
            done: false,
            timer: Timer::new(),
            done_tx: Some(done_tx),
        }
    }

    /// Finishes the transfer successfully. A no-op if already done — finish
    /// is called from more than one dispatch path (chunk handling, timer
    /// fire) and only the first call should take effect.
    pub fn finish_ok(&mut self, value: T) {
        if self.done {
            return;
        }
        self.done = true;
        self.status = crate::chunk::Status::Ok;
        self.timer.stop();
        if let Some(tx) = self.done_tx.take() {
            let _ = tx.send(Ok(value));
        }
    }

    pub fn finish_err(&mut self, status: crate::chunk::Status) {
        if self.done {
            return;
        }
        self.done = true;
        self.status = status;
        self.timer.stop();
        if let Some(tx) = self.done_tx.take() {
            let _ = tx.send(Err(Error::TransferFailed { id: self.id, status }));
        }
    }
}
