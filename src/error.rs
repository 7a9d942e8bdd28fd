//! Error types for the transfer manager.
//!
//! Callers only ever see one of the variants below: either the API rejected
//! the call synchronously (duplicate id, manager shutting down), or a
//! transfer ran and finished with a non-OK [`Status`].

use thiserror::Error;

use crate::chunk::Status;
use crate::transfer::Direction;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A transfer with this id and direction is already in flight.
    #[error("a {direction} transfer with id {id} is already in progress")]
    DuplicateTransfer { id: u32, direction: Direction },

    /// The transfer ran and finished with a non-OK status.
    #[error("transfer {id} failed: {status}")]
    TransferFailed { id: u32, status: Status },

    /// `read`/`write` was called after the manager began shutting down.
    #[error("the transfer manager is shutting down")]
    ManagerShuttingDown,
}

impl Error {
    /// The status this error carries, if any — `TransferFailed` carries one,
    /// the synchronous rejections don't.
    pub fn status(&self) -> Option<Status> {
        match self {
            Error::TransferFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}
