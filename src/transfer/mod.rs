//! Transfer buffers and host-side copy accounting

mod pool;
mod slot;

pub use pool::{BufferPool, SharedBufferPool};
pub use slot::{BufferSlot, SlotBuffers, SlotHandle, SlotState};

use std::time::Duration;

/// Direction of a host-side copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Block staged from the caller's input into a slot
    Upload,

    /// Result copied from a slot into the caller's output
    Download,
}

/// Transfer performance metrics
#[derive(Debug, Clone, Default)]
pub struct TransferMetrics {
    /// Total bytes transferred
    pub total_bytes: u64,

    /// Accumulated transfer duration
    pub transfer_time: Duration,

    /// Average bandwidth in MB/s
    pub bandwidth: f64,

    /// Number of transfers
    pub chunk_count: u64,
}

/// Transfer statistics collector
#[derive(Debug, Clone, Default)]
pub struct TransferStatistics {
    /// Accumulated metrics
    metrics: TransferMetrics,
}

impl TransferStatistics {
    /// Create a new statistics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transfer operation
    pub fn record_transfer(&mut self, bytes: u64, duration: Duration) {
        self.metrics.total_bytes += bytes;
        self.metrics.transfer_time += duration;
        self.metrics.chunk_count += 1;

        // Bandwidth over everything recorded so far (MB/s)
        let seconds = self.metrics.transfer_time.as_secs_f64();
        self.metrics.bandwidth = if seconds > 0.0 {
            (self.metrics.total_bytes as f64 / 1_000_000.0) / seconds
        } else {
            0.0
        };
    }

    /// Get current transfer metrics
    pub fn get_metrics(&self) -> &TransferMetrics {
        &self.metrics
    }

    /// Clear all recorded transfers
    pub fn reset(&mut self) {
        self.metrics = TransferMetrics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_statistics() {
        let mut stats = TransferStatistics::new();

        stats.record_transfer(1_000_000, Duration::from_millis(100));
        stats.record_transfer(1_000_000, Duration::from_millis(100));

        let metrics = stats.get_metrics();
        assert_eq!(metrics.total_bytes, 2_000_000);
        assert_eq!(metrics.chunk_count, 2);
        assert!((metrics.bandwidth - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_duration_bandwidth() {
        let mut stats = TransferStatistics::new();
        stats.record_transfer(64, Duration::ZERO);
        assert_eq!(stats.get_metrics().bandwidth, 0.0);

        stats.reset();
        assert_eq!(stats.get_metrics().total_bytes, 0);
    }
}
