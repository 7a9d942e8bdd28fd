//! In-memory fake of the RPC transfer service, used by every integration
//! test in this directory to drive both directions of the wire and inject
//! stream-level errors without a real transport.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use xfer_core::{Chunk, ChunkCallback, Status, StreamErrorCallback, TransferService, TransferStream};

#[derive(Default)]
struct ChannelState {
    sent: Vec<Chunk>,
    on_chunk: Option<ChunkCallback>,
    on_error: Option<StreamErrorCallback>,
    open_count: u32,
}

struct FakeStream {
    state: Arc<Mutex<ChannelState>>,
}

impl TransferStream for FakeStream {
    fn send(&self, chunk: Chunk) {
        self.state.lock().sent.push(chunk);
    }
}

/// A fake `Read`/`Write` RPC pair. Each side tracks what the client under
/// test has sent and lets the test act as the "server" — delivering chunks
/// and stream errors on whichever side it likes.
pub struct FakeService {
    read: Arc<Mutex<ChannelState>>,
    write: Arc<Mutex<ChannelState>>,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            read: Arc::new(Mutex::new(ChannelState::default())),
            write: Arc::new(Mutex::new(ChannelState::default())),
        })
    }

    pub fn read_open_count(&self) -> u32 {
        self.read.lock().open_count
    }

    pub fn write_open_count(&self) -> u32 {
        self.write.lock().open_count
    }

    pub fn sent_read_chunks(&self) -> Vec<Chunk> {
        self.read.lock().sent.clone()
    }

    pub fn sent_write_chunks(&self) -> Vec<Chunk> {
        self.write.lock().sent.clone()
    }

    pub fn deliver_read_chunk(&self, chunk: Chunk) {
        let guard = self.read.lock();
        if let Some(on_chunk) = &guard.on_chunk {
            on_chunk(chunk);
        } else {
            panic!("read stream not open yet");
        }
    }

    pub fn deliver_write_chunk(&self, chunk: Chunk) {
        let guard = self.write.lock();
        if let Some(on_chunk) = &guard.on_chunk {
            on_chunk(chunk);
        } else {
            panic!("write stream not open yet");
        }
    }

    pub fn fail_read_stream(&self, status: Status) {
        let guard = self.read.lock();
        if let Some(on_error) = &guard.on_error {
            on_error(status);
        } else {
            panic!("read stream not open yet");
        }
    }

    #[allow(dead_code)]
    pub fn fail_write_stream(&self, status: Status) {
        let guard = self.write.lock();
        if let Some(on_error) = &guard.on_error {
            on_error(status);
        } else {
            panic!("write stream not open yet");
        }
    }
}

impl TransferService for Arc<FakeService> {
    fn open_read_stream(&self, on_chunk: ChunkCallback, on_error: StreamErrorCallback) -> Box<dyn TransferStream> {
        let mut state = self.read.lock();
        state.on_chunk = Some(on_chunk);
        state.on_error = Some(on_error);
        state.open_count += 1;
        Box::new(FakeStream {
            state: self.read.clone(),
        })
    }

    fn open_write_stream(&self, on_chunk: ChunkCallback, on_error: StreamErrorCallback) -> Box<dyn TransferStream> {
        let mut state = self.write.lock();
        state.on_chunk = Some(on_chunk);
        state.on_error = Some(on_error);
        state.open_count += 1;
        Box::new(FakeStream {
            state: self.write.clone(),
        })
    }
}

/// Polls `condition` until it's true or `timeout` elapses, panicking on
/// timeout. Used to wait for the scheduler thread to catch up with an event
/// the test just injected, since the manager exposes no internal hook to
/// await that directly.
pub fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return;
        }
        if Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

pub fn default_timeout() -> Duration {
    Duration::from_secs(2)
}
