//! Server-to-client read transfer: we advertise a window, the server streams
//! data chunks into it, and we request a new window once it's spent.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc::UnboundedSender, oneshot};
use tracing::{debug, trace, warn};

use crate::chunk::{Chunk, Status};
use crate::config::ReadTransferParameters;
use crate::error::Result;
use crate::manager::SchedulerEvent;
use crate::service::TransferStream;
use crate::transfer::{Direction, TransferCore};

pub struct ReadTransfer {
    core: TransferCore<Bytes>,
    data: BytesMut,
    offset: u64,
    pending_bytes: u32,
    max_bytes_to_receive: u32,
    max_chunk_size: u32,
    chunk_delay_us: Option<u32>,
    response_timeout: Duration,
    max_retries: u32,
    chunk_timeout_count: u32,
    remaining_transfer_size: Option<u64>,
    stream: Arc<dyn TransferStream>,
    timer_tx: UnboundedSender<SchedulerEvent>,
}

impl ReadTransfer {
    pub fn new(
        id: u32,
        params: ReadTransferParameters,
        defaults: &crate::config::ManagerConfig,
        stream: Arc<dyn TransferStream>,
        timer_tx: UnboundedSender<SchedulerEvent>,
        done_tx: oneshot::Sender<Result<Bytes>>,
    ) -> Self {
        let max_bytes_to_receive = params
            .max_bytes_to_receive
            .unwrap_or(defaults.default_max_bytes_to_receive);

        Self {
            core: TransferCore::new(id, done_tx),
            data: BytesMut::new(),
            offset: 0,
            pending_bytes: max_bytes_to_receive,
            max_bytes_to_receive,
            max_chunk_size: params.max_chunk_size.unwrap_or(defaults.default_max_chunk_size),
            chunk_delay_us: params.chunk_delay_us,
            response_timeout: params.response_timeout.unwrap_or(defaults.default_response_timeout),
            max_retries: params.max_retries.unwrap_or(defaults.default_max_retries),
            chunk_timeout_count: 0,
            remaining_transfer_size: None,
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

    /// Sends the initial transfer-parameters chunk, opening the first window.
    pub async fn begin(&mut self) {
        self.send_transfer_parameters();
    }

    /// Handles an incoming non-terminating (data) chunk.
    pub async fn handle_chunk(&mut self, chunk: &Chunk) {
        self.core.timer.stop();
        self.chunk_timeout_count = 0;

        let chunk_offset = chunk.offset.unwrap_or(0);
        if chunk_offset != self.offset {
            // Out-of-order/overlap: reject the window and re-request from
            // where we actually are.
            self.pending_bytes = 0;
            self.send_transfer_parameters();
            return;
        }

        let payload = chunk.data.clone().unwrap_or_default();
        self.data.extend_from_slice(&payload);
        self.pending_bytes = self.pending_bytes.saturating_sub(payload.len() as u32);
        self.offset += payload.len() as u64;

        if let Some(remaining) = chunk.remaining_bytes {
            if remaining == 0 {
                self.stream
                    .send(Chunk::terminating(self.core.id, Status::Ok));
                self.core.finish_ok(self.data.clone().freeze());
                return;
            }
            self.remaining_transfer_size = Some(remaining);
        }

        if self.pending_bytes == 0 {
            self.send_transfer_parameters();
        } else {
            self.arm_timer();
        }
    }

    /// Invoked when the response timer fires: resend parameters up to
    /// `max_retries` times before giving up.
    pub fn on_timer_fire(&mut self) {
        self.chunk_timeout_count += 1;
        if self.chunk_timeout_count > self.max_retries {
            warn!(
                transfer_id = self.core.id,
                retries = self.chunk_timeout_count,
                "read transfer exceeded retry budget"
            );
            self.core.finish_err(Status::DeadlineExceeded);
        } else {
            debug!(
                transfer_id = self.core.id,
                attempt = self.chunk_timeout_count,
                "read transfer timed out, retrying"
            );
            self.send_transfer_parameters();
        }
    }

    /// Called by the manager when the server sends a terminating chunk.
    pub fn finish(&mut self, status: Status) {
        if status.ok() {
            self.core.finish_ok(self.data.clone().freeze());
        } else {
            self.core.finish_err(status);
        }
    }

    pub fn is_current_timer_epoch(&self, epoch: crate::timer::Epoch) -> bool {
        self.core.timer.is_current(epoch)
    }

    /// The advisory remaining-size hint the server has most recently sent.
    /// Recorded for callers that want it; the transfer itself doesn't act on it.
    pub fn remaining_transfer_size(&self) -> Option<u64> {
        self.remaining_transfer_size
    }

    fn send_transfer_parameters(&mut self) {
        self.pending_bytes = self.max_bytes_to_receive;

        let mut chunk = Chunk::bare(self.core.id)
            .with_pending_bytes(self.pending_bytes)
            .with_max_chunk_size_bytes(self.max_chunk_size)
            .with_offset(self.offset);

        if let Some(delay) = self.chunk_delay_us {
            chunk = chunk.with_min_delay_microseconds(delay);
        }

        trace!(
            transfer_id = self.core.id,
            offset = self.offset,
            pending_bytes = self.pending_bytes,
            "sending transfer parameters"
        );
        self.stream.send(chunk);
        self.arm_timer();
    }

    fn arm_timer(&mut self) {
        let id = self.core.id;
        let tx = self.timer_tx.clone();
        trace!(transfer_id = id, timeout = ?self.response_timeout, "arming response timer");
        self.core.timer.start(self.response_timeout, tx, move |epoch| {
            SchedulerEvent::TimerFired {
                direction: Direction::Read,
                id,
                epoch,
            }
        });
    }
}
