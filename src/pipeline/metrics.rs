//! Performance metrics for the block pipeline

use std::fmt;
use std::time::Duration;

use crate::transfer::{TransferDirection, TransferMetrics, TransferStatistics};

/// Comprehensive performance metrics for one stream
#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    /// Blocks handed to the accelerator
    pub blocks_submitted: u64,

    /// Blocks copied to the output
    pub blocks_drained: u64,

    /// Blocks stored (or found) uncompressed
    pub stored_raw_blocks: u64,

    /// Bytes consumed from the input
    pub bytes_in: u64,

    /// Bytes produced, framing included
    pub bytes_out: u64,

    /// Output-to-input ratio
    pub compression_ratio: f32,

    /// Highest number of simultaneously outstanding submissions
    pub peak_in_flight: usize,

    /// Times a block waited for a free transfer buffer
    pub backpressure_events: u64,

    /// Times the scheduler suspended on a pending completion
    pub waits: u64,

    /// Completions observed per lane
    pub lane_completions: Vec<u64>,

    /// Wall time of the whole stream
    pub elapsed: Duration,

    upload: TransferStatistics,
    download: TransferStatistics,
}

impl PipelineMetrics {
    /// Create metrics for `lanes` lanes
    pub fn new(lanes: usize) -> Self {
        Self {
            lane_completions: vec![0; lanes],
            ..Self::default()
        }
    }

    /// Record a host-side copy
    pub fn record_transfer(&mut self, direction: TransferDirection, bytes: u64, duration: Duration) {
        match direction {
            TransferDirection::Upload => self.upload.record_transfer(bytes, duration),
            TransferDirection::Download => self.download.record_transfer(bytes, duration),
        }
    }

    /// Staging copies into transfer buffers
    pub fn upload(&self) -> &TransferMetrics {
        self.upload.get_metrics()
    }

    /// Result copies out of transfer buffers
    pub fn download(&self) -> &TransferMetrics {
        self.download.get_metrics()
    }

    /// Calculate compression ratio
    pub fn calculate_compression_ratio(&mut self) {
        self.compression_ratio = if self.bytes_in > 0 {
            self.bytes_out as f32 / self.bytes_in as f32
        } else {
            1.0
        };
    }
}

impl fmt::Display for PipelineMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pipeline Metrics:\n\
            Input: {} bytes\n\
            Output: {} bytes\n\
            Ratio: {:.2}\n\
            Blocks: {} submitted, {} drained, {} raw\n\
            Peak In-Flight: {}\n\
            Backpressure: {} events, {} waits\n\
            Upload: {} bytes ({:.2} MB/s)\n\
            Download: {} bytes ({:.2} MB/s)\n\
            Elapsed: {:?}",
            self.bytes_in,
            self.bytes_out,
            self.compression_ratio,
            self.blocks_submitted,
            self.blocks_drained,
            self.stored_raw_blocks,
            self.peak_in_flight,
            self.backpressure_events,
            self.waits,
            self.upload().total_bytes,
            self.upload().bandwidth,
            self.download().total_bytes,
            self.download().bandwidth,
            self.elapsed,
        )
    }
}
