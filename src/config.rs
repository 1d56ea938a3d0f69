//! Connection tuning knobs.

use std::time::Duration;

/// Configuration for a single connection pipeline.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionConfig {
    /// How often the driver flushes staged packets to the transport.
    pub flush_interval: Duration,
    /// Capacity of the raw receive buffer; headers claiming a larger
    /// compressed payload are rejected as corrupt.
    pub max_batch_bytes: usize,
    /// Upper bound on the decoded size of one batch.
    pub max_decoded_bytes: usize,
    /// Capacity of the deferred packet queue; a full queue blocks the
    /// driver as backpressure.
    pub deferred_capacity: usize,
    /// zlib compression level (0-9) for the outbound stream.
    pub compression_level: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(500),
            max_batch_bytes: 4 * 1024 * 1024,
            max_decoded_bytes: 10 * 1024 * 1024,
            deferred_capacity: 4096,
            compression_level: 7,
        }
    }
}

impl ConnectionConfig {
    /// Override the periodic flush interval.
    #[must_use]
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Override the raw receive buffer capacity.
    #[must_use]
    pub fn max_batch_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_bytes = bytes;
        self
    }

    /// Override the decoded batch size limit.
    #[must_use]
    pub fn max_decoded_bytes(mut self, bytes: usize) -> Self {
        self.max_decoded_bytes = bytes;
        self
    }

    /// Override the deferred queue capacity. Values below one are raised
    /// to one.
    #[must_use]
    pub fn deferred_capacity(mut self, capacity: usize) -> Self {
        self.deferred_capacity = capacity;
        self
    }

    /// Override the outbound compression level (0-9).
    #[must_use]
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }
}
