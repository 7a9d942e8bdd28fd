//! Configuration for the transfer manager and per-transfer overrides.

use std::time::Duration;

/// Manager-wide defaults, analogous to a `NetworkConfig` for a networking
/// service: everything here has a sensible default and can be overridden
/// per-call where the protocol allows it.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How long a transfer waits for a response before retrying or failing.
    pub default_response_timeout: Duration,
    /// How many times a read transfer resends parameters before giving up.
    pub default_max_retries: u32,
    /// Read-side window size offered to the server, in bytes.
    pub default_max_bytes_to_receive: u32,
    /// Largest chunk `data` the client is willing to receive, in bytes.
    pub default_max_chunk_size: u32,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_response_timeout: Duration::from_secs_f64(2.0),
            default_max_retries: 3,
            default_max_bytes_to_receive: 8192,
            default_max_chunk_size: 1024,
        }
    }
}

/// Per-call overrides for a read transfer. Any field left `None` falls back
/// to the corresponding [`ManagerConfig`] default.
#[derive(Debug, Clone, Default)]
pub struct ReadTransferParameters {
    pub max_bytes_to_receive: Option<u32>,
    pub max_chunk_size: Option<u32>,
    pub chunk_delay_us: Option<u32>,
    pub response_timeout: Option<Duration>,
    pub max_retries: Option<u32>,
}

/// Per-call overrides for a write transfer.
#[derive(Debug, Clone, Default)]
pub struct WriteTransferParameters {
    pub response_timeout: Option<Duration>,
}
