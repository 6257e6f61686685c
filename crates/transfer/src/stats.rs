use std::time::{Duration, Instant};

/// Cumulative totals for a receiving server.
///
/// Process-lifetime state: created when the server starts, updated after
/// each successful connection, never persisted.
#[derive(Debug, Clone)]
pub struct ReceiverStats {
    files: u64,
    bytes: u64,
    started: Instant,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(started: Instant) -> Self {
        Self {
            files: 0,
            bytes: 0,
            started,
        }
    }

    /// Records one completed file of `bytes` bytes.
    pub fn record(&mut self, bytes: u64) {
        self.files += 1;
        self.bytes += bytes;
    }

    pub fn files(&self) -> u64 {
        self.files
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Average throughput since the server started, in bytes per second.
    pub fn average_bytes_per_sec(&self) -> f64 {
        let secs = self.uptime().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes as f64 / secs
    }
}

impl Default for ReceiverStats {
    fn default() -> Self {
        Self::new()
    }
}
