//! The transfer manager: owns the two shared RPC streams, the two transfer
//! registries, and the single-threaded scheduler that drives every transfer.
//!
//! The public surface ([`Manager::read`], [`Manager::write`]) is synchronous
//! — callers block until their transfer completes — while everything that
//! actually drives the protocol runs on one dedicated OS thread hosting a
//! current-thread Tokio runtime. That split mirrors how a caller thread
//! blocks on a one-shot completion signal while a background thread owns an
//! event loop in the networking core this was modeled on; the difference is
//! that here the background thread owns its *own* runtime rather than
//! sharing the process's, since the public API must work for callers that
//! aren't already inside one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, trace};

use crate::chunk::{Chunk, ChunkRole, Status};
use crate::config::{ManagerConfig, ReadTransferParameters, WriteTransferParameters};
use crate::error::{Error, Result};
use crate::service::TransferService;
use crate::transfer::{Direction, ReadTransfer, WriteTransfer};
use crate::timer::Epoch;

/// Posted by a transfer's [`crate::timer::Timer`] when it fires.
pub(crate) enum SchedulerEvent {
    TimerFired {
        direction: Direction,
        id: u32,
        epoch: Epoch,
    },
}

enum Command {
    NewRead {
        id: u32,
        params: ReadTransferParameters,
        done_tx: oneshot::Sender<Result<Bytes>>,
    },
    NewWrite {
        id: u32,
        data: Bytes,
        params: WriteTransferParameters,
        done_tx: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

struct Shared {
    command_tx: mpsc::UnboundedSender<Command>,
    active_read_ids: Arc<Mutex<HashSet<u32>>>,
    active_write_ids: Arc<Mutex<HashSet<u32>>>,
    scheduler_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let _ = self.command_tx.send(Command::Shutdown);
        if let Some(handle) = self.scheduler_thread.lock().take() {
            let _ = handle.join();
        }
    }
}

/// A handle to a running transfer manager. Cheap to clone; the scheduler
/// thread is torn down when the last clone is dropped.
#[derive(Clone)]
pub struct Manager {
    shared: Arc<Shared>,
}

impl Manager {
    /// Starts the manager's scheduler thread against `service`.
    pub fn new(service: impl TransferService + 'static, config: ManagerConfig) -> Self {
        let service: Arc<dyn TransferService> = Arc::new(service);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (read_chunk_tx, read_chunk_rx) = mpsc::unbounded_channel();
        let (write_chunk_tx, write_chunk_rx) = mpsc::unbounded_channel();
        let (read_error_tx, read_error_rx) = mpsc::unbounded_channel();
        let (write_error_tx, write_error_rx) = mpsc::unbounded_channel();

        let active_read_ids = Arc::new(Mutex::new(HashSet::new()));
        let active_write_ids = Arc::new(Mutex::new(HashSet::new()));

        let scheduler = Scheduler {
            service,
            config,
            read_transfers: HashMap::new(),
            write_transfers: HashMap::new(),
            read_stream: None,
            write_stream: None,
            command_rx,
            timer_tx,
            timer_rx,
            read_chunk_tx,
            read_chunk_rx,
            write_chunk_tx,
            write_chunk_rx,
            read_error_tx,
            read_error_rx,
            write_error_tx,
            write_error_rx,
            active_read_ids: active_read_ids.clone(),
            active_write_ids: active_write_ids.clone(),
        };

        let scheduler_thread = thread::Builder::new()
            .name("xfer-scheduler".into())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .expect("failed to start the transfer scheduler's runtime");
                rt.block_on(scheduler.run());
            })
            .expect("failed to spawn the transfer scheduler thread");

        Self {
            shared: Arc::new(Shared {
                command_tx,
                active_read_ids,
                active_write_ids,
                scheduler_thread: Mutex::new(Some(scheduler_thread)),
            }),
        }
    }

    /// Reads `id` from the server using the manager's configured defaults.
    pub fn read(&self, id: u32) -> Result<Bytes> {
        self.read_with(id, ReadTransferParameters::default())
    }

    /// Reads `id`, overriding window/retry/timeout defaults for this call.
    pub fn read_with(&self, id: u32, params: ReadTransferParameters) -> Result<Bytes> {
        if !self.shared.active_read_ids.lock().insert(id) {
            return Err(Error::DuplicateTransfer {
                id,
                direction: Direction::Read,
            });
        }

        let (done_tx, done_rx) = oneshot::channel();
        if self
            .shared
            .command_tx
            .send(Command::NewRead { id, params, done_tx })
            .is_err()
        {
            self.shared.active_read_ids.lock().remove(&id);
            return Err(Error::ManagerShuttingDown);
        }

        done_rx
            .blocking_recv()
            .unwrap_or(Err(Error::ManagerShuttingDown))
    }

    /// Writes `data` to the server as transfer `id`.
    pub fn write(&self, id: u32, data: impl Into<Bytes>) -> Result<()> {
        self.write_with(id, data, WriteTransferParameters::default())
    }

    /// Writes `data`, overriding the response timeout for this call.
    pub fn write_with(
        &self,
        id: u32,
        data: impl Into<Bytes>,
        params: WriteTransferParameters,
    ) -> Result<()> {
        if !self.shared.active_write_ids.lock().insert(id) {
            return Err(Error::DuplicateTransfer {
                id,
                direction: Direction::Write,
            });
        }

        let (done_tx, done_rx) = oneshot::channel();
        if self
            .shared
            .command_tx
            .send(Command::NewWrite {
                id,
                data: data.into(),
                params,
                done_tx,
            })
            .is_err()
        {
            self.shared.active_write_ids.lock().remove(&id);
            return Err(Error::ManagerShuttingDown);
        }

        done_rx
            .blocking_recv()
            .unwrap_or(Err(Error::ManagerShuttingDown))
    }
}

/// Owns everything the scheduler thread touches. Never shared outside that
/// thread — the manager's public handle reaches it only through channels.
struct Scheduler {
    service: Arc<dyn TransferService>,
    config: ManagerConfig,

    read_transfers: HashMap<u32, ReadTransfer>,
    write_transfers: HashMap<u32, WriteTransfer>,

    read_stream: Option<Arc<dyn crate::service::TransferStream>>,
    write_stream: Option<Arc<dyn crate::service::TransferStream>>,

    command_rx: mpsc::UnboundedReceiver<Command>,

    timer_tx: mpsc::UnboundedSender<SchedulerEvent>,
    timer_rx: mpsc::UnboundedReceiver<SchedulerEvent>,

    read_chunk_tx: mpsc::UnboundedSender<Chunk>,
    read_chunk_rx: mpsc::UnboundedReceiver<Chunk>,
    write_chunk_tx: mpsc::UnboundedSender<Chunk>,
    write_chunk_rx: mpsc::UnboundedReceiver<Chunk>,

    read_error_tx: mpsc::UnboundedSender<Status>,
    read_error_rx: mpsc::UnboundedReceiver<Status>,
    write_error_tx: mpsc::UnboundedSender<Status>,
    write_error_rx: mpsc::UnboundedReceiver<Status>,

    active_read_ids: Arc<Mutex<HashSet<u32>>>,
    active_write_ids: Arc<Mutex<HashSet<u32>>>,
}

impl Scheduler {
    async fn run(mut self) {
        info!("transfer scheduler starting");

        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        Some(Command::NewRead { id, params, done_tx }) => {
                            self.start_read(id, params, done_tx).await;
                        }
                        Some(Command::NewWrite { id, data, params, done_tx }) => {
                            self.start_write(id, data, params, done_tx).await;
                        }
                        Some(Command::Shutdown) | None => {
                            info!("transfer scheduler shutting down");
                            self.finalize_all();
                            break;
                        }
                    }
                }

                Some(chunk) = self.read_chunk_rx.recv() => {
                    self.dispatch_chunk(Direction::Read, chunk).await;
                }

                Some(chunk) = self.write_chunk_rx.recv() => {
                    self.dispatch_chunk(Direction::Write, chunk).await;
                }

                Some(status) = self.read_error_rx.recv() => {
                    self.handle_stream_error(Direction::Read, status);
                }

                Some(status) = self.write_error_rx.recv() => {
                    self.handle_stream_error(Direction::Write, status);
                }

                Some(event) = self.timer_rx.recv() => {
                    self.dispatch_timer(event);
                }
            }
        }

        info!("transfer scheduler stopped");
    }

    fn ensure_read_stream(&mut self) -> Arc<dyn crate::service::TransferStream> {
        if let Some(stream) = &self.read_stream {
            return stream.clone();
        }
        let chunk_tx = self.read_chunk_tx.clone();
        let error_tx = self.read_error_tx.clone();
        let stream: Arc<dyn crate::service::TransferStream> = Arc::from(self.service.open_read_stream(
            Box::new(move |chunk| {
                let _ = chunk_tx.send(chunk);
            }),
            Box::new(move |status| {
                let _ = error_tx.send(status);
            }),
        ));
        self.read_stream = Some(stream.clone());
        stream
    }

    fn ensure_write_stream(&mut self) -> Arc<dyn crate::service::TransferStream> {
        if let Some(stream) = &self.write_stream {
            return stream.clone();
        }
        let chunk_tx = self.write_chunk_tx.clone();
        let error_tx = self.write_error_tx.clone();
        let stream: Arc<dyn crate::service::TransferStream> = Arc::from(self.service.open_write_stream(
            Box::new(move |chunk| {
                let _ = chunk_tx.send(chunk);
            }),
            Box::new(move |status| {
                let _ = error_tx.send(status);
            }),
        ));
        self.write_stream = Some(stream.clone());
        stream
    }

    async fn start_read(
        &mut self,
        id: u32,
        params: ReadTransferParameters,
        done_tx: oneshot::Sender<Result<Bytes>>,
    ) {
        let stream = self.ensure_read_stream();
        let mut transfer = ReadTransfer::new(id, params, &self.config, stream, self.timer_tx.clone(), done_tx);
        info!(transfer_id = id, "starting read transfer");
        transfer.begin().await;
        self.read_transfers.insert(id, transfer);
    }

    async fn start_write(
        &mut self,
        id: u32,
        data: Bytes,
        params: WriteTransferParameters,
        done_tx: oneshot::Sender<Result<()>>,
    ) {
        let stream = self.ensure_write_stream();
        let response_timeout = params
            .response_timeout
            .unwrap_or(self.config.default_response_timeout);
        let mut transfer = WriteTransfer::new(id, data, response_timeout, stream, self.timer_tx.clone(), done_tx);
        info!(transfer_id = id, "starting write transfer");
        transfer.begin().await;
        self.write_transfers.insert(id, transfer);
    }

    async fn dispatch_chunk(&mut self, direction: Direction, chunk: Chunk) {
        let role = chunk.role();
        trace!(transfer_id = chunk.transfer_id, %direction, ?role, "dispatching chunk");
        match direction {
            Direction::Read => {
                let Some(transfer) = self.read_transfers.get_mut(&chunk.transfer_id) else {
                    error!(transfer_id = chunk.transfer_id, "chunk for unknown read transfer dropped");
                    return;
                };
                match role {
                    ChunkRole::Terminator => transfer.finish(chunk.status.expect("terminator chunk carries a status")),
                    _ => transfer.handle_chunk(&chunk).await,
                }
                if transfer.is_done() {
                    info!(transfer_id = chunk.transfer_id, "read transfer finished");
                    self.read_transfers.remove(&chunk.transfer_id);
                    self.active_read_ids.lock().remove(&chunk.transfer_id);
                }
            }
            Direction::Write => {
                let Some(transfer) = self.write_transfers.get_mut(&chunk.transfer_id) else {
                    error!(transfer_id = chunk.transfer_id, "chunk for unknown write transfer dropped");
                    return;
                };
                match role {
                    ChunkRole::Terminator => transfer.finish(chunk.status.expect("terminator chunk carries a status")),
                    _ => transfer.handle_chunk(&chunk).await,
                }
                if transfer.is_done() {
                    info!(transfer_id = chunk.transfer_id, "write transfer finished");
                    self.write_transfers.remove(&chunk.transfer_id);
                    self.active_write_ids.lock().remove(&chunk.transfer_id);
                }
            }
        }
    }

    fn dispatch_timer(&mut self, event: SchedulerEvent) {
        let SchedulerEvent::TimerFired { direction, id, epoch } = event;
        match direction {
            Direction::Read => {
                if let Some(transfer) = self.read_transfers.get_mut(&id) {
                    if transfer.is_current_timer_epoch(epoch) {
                        transfer.on_timer_fire();
                        if transfer.is_done() {
                            self.read_transfers.remove(&id);
                            self.active_read_ids.lock().remove(&id);
                        }
                    }
                }
            }
            Direction::Write => {
                if let Some(transfer) = self.write_transfers.get_mut(&id) {
                    if transfer.is_current_timer_epoch(epoch) {
                        transfer.on_timer_fire();
                        if transfer.is_done() {
                            self.write_transfers.remove(&id);
                            self.active_write_ids.lock().remove(&id);
                        }
                    }
                }
            }
        }
    }

    /// Reopens the stream on a recoverable `FAILED_PRECONDITION`; any other
    /// error is treated as fatal for every transfer on that side.
    fn handle_stream_error(&mut self, direction: Direction, status: Status) {
        match direction {
            Direction::Read => {
                self.read_stream = None;
                if status == Status::FailedPrecondition {
                    info!("read stream reset (FAILED_PRECONDITION), reopening");
                    self.ensure_read_stream();
                } else {
                    error!(%status, "read stream failed, cancelling all read transfers");
                    for (id, mut transfer) in self.read_transfers.drain() {
                        transfer.finish(Status::Internal);
                        self.active_read_ids.lock().remove(&id);
                    }
                }
            }
            Direction::Write => {
                self.write_stream = None;
                if status == Status::FailedPrecondition {
                    info!("write stream reset (FAILED_PRECONDITION), reopening");
                    self.ensure_write_stream();
                } else {
                    error!(%status, "write stream failed, cancelling all write transfers");
                    for (id, mut transfer) in self.write_transfers.drain() {
                        transfer.finish(Status::Internal);
                        self.active_write_ids.lock().remove(&id);
                    }
                }
            }
        }
    }

    /// Finalizes every outstanding transfer on shutdown so no caller thread
    /// blocked on `read`/`write` is left waiting forever.
    fn finalize_all(&mut self) {
        for (id, mut transfer) in self.read_transfers.drain() {
            transfer.finish(Status::Cancelled);
            self.active_read_ids.lock().remove(&id);
        }
        for (id, mut transfer) in self.write_transfers.drain() {
            transfer.finish(Status::Cancelled);
            self.active_write_ids.lock().remove(&id);
        }
    }
}
