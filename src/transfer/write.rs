//! Client-to-server write transfer: the server tells us how much it's
//! willing to accept in each window, we push chunks until the window is
//! spent, and wait for the next window update.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc::UnboundedSender, oneshot};
use tracing::{debug, error, trace, warn};

use crate::chunk::{Chunk, Status};
use crate::error::Result;
use crate::manager::SchedulerEvent;
use crate::service::TransferStream;
use crate::transfer::{Direction, TransferCore};

pub struct WriteTransfer {
    core: TransferCore<()>,
    data: Bytes,
    offset: u64,
    max_bytes_to_send: u64,
    max_chunk_size: u32,
    chunk_delay_us: Option<u32>,
    response_timeout: Duration,
    stream: Arc<dyn TransferStream>,
    timer_tx: UnboundedSender<SchedulerEvent>,
}

impl WriteTransfer {
    pub fn new(
        id: u32,
        data: Bytes,
        response_timeout: Duration,
        stream: Arc<dyn TransferStream>,
        timer_tx: UnboundedSender<SchedulerEvent>,
        done_tx: oneshot::Sender<Result<()>>,
    ) -> Self {
        Self {
            core: TransferCore::new(id, done_tx),
            data,
            offset: 0,
            max_bytes_to_send: 0,
            max_chunk_size: 0,
            chunk_delay_us: None,
            response_timeout,
            stream,
            timer_tx,
        }
    }

    pub fn id(&self) -> u32 {
        self.core.id
    }

    pub fn is_done(&self) -> bool {
        self.core.done
    }

    /// Sends the bare announcement chunk that tells the server we want to
    /// write, then arms the response timer.
    pub async fn begin(&mut self) {
        self.stream.send(Chunk::bare(self.core.id));
        self.arm_timer();
    }

    /// Handles an incoming non-terminating (parameters) chunk.
    pub async fn handle_chunk(&mut self, chunk: &Chunk) {
        self.core.timer.stop();

        let new_offset = chunk.offset.unwrap_or(self.offset);
        if new_offset < self.offset {
            debug!(
                transfer_id = self.core.id,
                from = self.offset,
                to = new_offset,
                "write transfer rolling back offset"
            );
        }
        self.offset = new_offset;

        if self.offset > self.data.len() as u64 {
            error!(
                transfer_id = self.core.id,
                offset = self.offset,
                size = self.data.len(),
                "server requested invalid offset"
            );
            self.stream
                .send(Chunk::terminating(self.core.id, Status::OutOfRange));
            self.core.finish_err(Status::OutOfRange);
            return;
        }

        self.max_bytes_to_send = (chunk.pending_bytes.unwrap_or(0) as u64)
            .min(self.data.len() as u64 - self.offset);

        if let Some(max_chunk_size) = chunk.max_chunk_size_bytes {
            self.max_chunk_size = max_chunk_size;
        }
        if let Some(delay) = chunk.min_delay_microseconds {
            self.chunk_delay_us = Some(delay);
        }

        // A zero chunk size means the server hasn't told us a size yet (or
        // told us explicitly not to send); rather than divide by zero or
        // spin, we simply don't send until a future parameters chunk raises
        // it above zero.
        while self.max_bytes_to_send > 0 && self.max_chunk_size > 0 {
            let next = self.next_chunk();
            self.offset += next.data.as_ref().map(Bytes::len).unwrap_or(0) as u64;
            self.max_bytes_to_send = self
                .max_bytes_to_send
                .saturating_sub(next.data.as_ref().map(Bytes::len).unwrap_or(0) as u64);

            self.stream.send(next);

            if let Some(delay_us) = self.chunk_delay_us {
                if delay_us > 0 {
                    tokio::time::sleep(Duration::from_micros(delay_us as u64)).await;
                }
            }
        }

        self.arm_timer();
    }

    /// Builds the next outgoing data chunk, marking it final if the
    /// remaining tail fits within a single `max_chunk_size` chunk.
    fn next_chunk(&self) -> Chunk {
        let remaining_tail = self.data.len() as u64 - self.offset;
        let start = self.offset as usize;

        if remaining_tail <= self.max_chunk_size as u64 {
            Chunk::bare(self.core.id)
                .with_offset(self.offset)
                .with_data(self.data.slice(start..))
                .with_remaining_bytes(0)
        } else {
            let end = start + self.max_chunk_size as usize;
            Chunk::bare(self.core.id)
                .with_offset(self.offset)
                .with_data(self.data.slice(start..end))
        }
    }

    /// Invoked when the response timer fires: a write transfer has no retry
    /// policy of its own, it simply gives up.
    pub fn on_timer_fire(&mut self) {
        warn!(transfer_id = self.core.id, "write transfer timed out");
        self.core.finish_err(Status::DeadlineExceeded);
    }

    /// Called by the manager when the server sends a terminating chunk.
    pub fn finish(&mut self, status: Status) {
        if status.ok() {
            self.core.finish_ok(());
        } else {
            self.core.finish_err(status);
        }
    }

    /// Whether `epoch` still identifies this transfer's currently armed
    /// timer, or is a stale fire from a timer since stopped/restarted.
    pub fn is_current_timer_epoch(&self, epoch: crate::timer::Epoch) -> bool {
        self.core.timer.is_current(epoch)
    }

    fn arm_timer(&mut self) {
        let id = self.core.id;
        let tx = self.timer_tx.clone();
        trace!(transfer_id = id, timeout = ?self.response_timeout, "arming response timer");
        self.core.timer.start(self.response_timeout, tx, move |epoch| {
            SchedulerEvent::TimerFired {
                direction: Direction::Write,
                id,
                epoch,
            }
        });
    }
}
