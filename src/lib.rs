//! Client-side bulk-data transfer manager.
//!
//! A [`Manager`] drives read and write transfers over a pair of long-lived
//! bidirectional RPC streams supplied by a [`TransferService`]. Callers use
//! the synchronous [`Manager::read`]/[`Manager::write`] API from whatever
//! thread they like; internally, a single dedicated thread runs the protocol
//! state machines one event at a time, so two transfers never advance
//! concurrently with each other.
//!
//! ```text
//! caller thread            scheduler thread
//! ------------              -----------------
//! Manager::read()  ---Command--->  Scheduler::run()
//!      |                                |
//!      |<--------oneshot::Receiver------|  (blocks until the transfer finishes)
//! ```

mod chunk;
mod config;
mod error;
mod manager;
mod service;
mod timer;
mod transfer;

pub use chunk::{Chunk, ChunkRole, Status};
pub use config::{ManagerConfig, ReadTransferParameters, WriteTransferParameters};
pub use error::{Error, Result};
pub use manager::Manager;
pub use service::{ChunkCallback, StreamErrorCallback, TransferService, TransferStream};
pub use transfer::Direction;
