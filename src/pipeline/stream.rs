//! Whole-stream compress and decompress entry points

use tracing::{debug, info, instrument};

use super::scheduler::{PipelineScheduler, Route, WorkItem};
use super::sink::{FramedSink, RegionSink};
use super::PipelineMetrics;
use crate::checksum::Checksum;
use crate::device::{Accelerator, Direction};
use crate::error::{PipelineError, PipelineResult};
use crate::frame::{self, StreamHeader};
use crate::guard::OutputGuard;
use crate::planner::BlockPlanner;
use crate::utils::{LogExt, Stopwatch};

/// Summary of one processed stream
#[derive(Debug, Clone)]
pub struct StreamReport {
    /// Bytes consumed
    pub bytes_in: u64,

    /// Bytes produced
    pub bytes_out: u64,

    /// Blocks in the stream
    pub blocks: u32,

    /// Blocks stored uncompressed
    pub stored_raw_blocks: u32,

    /// Checksum over the original bytes
    pub checksum: Checksum,

    /// Scheduler metrics for the stream
    pub metrics: PipelineMetrics,
}

/// Output bytes plus their report
#[derive(Debug, Clone)]
pub struct StreamOutput {
    /// Produced bytes
    pub data: Vec<u8>,

    /// What it took to produce them
    pub report: StreamReport,
}

impl<A: Accelerator> PipelineScheduler<A> {
    /// Compress `input` into a framed block stream
    ///
    /// Blocks the accelerator cannot shrink enough under the configured
    /// raw-store policy are written uncompressed.
    ///
    /// # Errors
    /// Any error of the underlying run; no partial stream is returned
    #[instrument(skip_all, fields(input_len = input.len()))]
    pub fn compress(&mut self, input: &[u8]) -> PipelineResult<StreamOutput> {
        let stopwatch = Stopwatch::start();
        let checksum = self.config.checksum;
        let planner = BlockPlanner::new(input.len() as u64, self.config.block_size)?;
        let header = StreamHeader {
            block_size: planner.block_size(),
            original_len: planner.input_len(),
            checksum,
        };

        let mut sink = FramedSink::new(header, input.len());
        let items = planner.plan().map(WorkItem::accelerated);
        let result = self.run(Direction::Compress, checksum, input, items, &mut sink, None);
        result.log_error("compress");
        let summary = result?;

        let data = sink.finish(summary.checksum.value);
        let report = self.finish_report(input.len(), data.len(), summary, stopwatch);
        info!(
            bytes_in = report.bytes_in,
            bytes_out = report.bytes_out,
            blocks = report.blocks,
            stored_raw = report.stored_raw_blocks,
            "stream compressed"
        );
        Ok(StreamOutput { data, report })
    }

    /// Decompress a framed block stream
    ///
    /// The header, every record length and the declared output size are
    /// validated before any output is allocated; raw records are copied on
    /// the host and never reach the accelerator.
    ///
    /// # Errors
    /// `ShortInput`, `LengthMismatch` or `InputValidationError` for a bad
    /// stream, `BombDetected` when the output would exceed
    /// `max_output_ratio` times the input, `CrcError` for a checksum mismatch
    #[instrument(skip_all, fields(input_len = input.len()))]
    pub fn decompress(&mut self, input: &[u8]) -> PipelineResult<StreamOutput> {
        let stopwatch = Stopwatch::start();
        let header = StreamHeader::decode(input)?;
        if header.block_size as usize > self.config.block_size {
            return Err(PipelineError::InputValidationError(format!(
                "stream block size {} exceeds the {} byte transfer buffers",
                header.block_size, self.config.block_size
            )));
        }

        let mut guard = OutputGuard::from_ratio(input.len() as u64, self.config.max_output_ratio);
        guard.ensure_within(header.original_len)?;

        let parsed = frame::parse_records(input, header)?;
        let expected = parsed.checksum;
        debug!(
            blocks = parsed.records.len(),
            original_len = header.original_len,
            "decompressing stream"
        );

        let items: Vec<WorkItem> = parsed
            .records
            .into_iter()
            .map(|record| WorkItem {
                route: if record.block.stored_raw {
                    Route::HostCopy
                } else {
                    Route::Accelerate
                },
                block: record.block,
                payload: record.payload,
            })
            .collect();

        let mut sink = RegionSink::new(header.original_len as usize);
        let result = self.run(
            Direction::Decompress,
            header.checksum,
            input,
            items,
            &mut sink,
            Some(&mut guard),
        );
        result.log_error("decompress");
        let summary = result?;

        if summary.checksum.value != expected {
            return Err(PipelineError::CrcError {
                expected,
                actual: summary.checksum.value,
            });
        }

        let data = sink.into_inner();
        let report = self.finish_report(input.len(), data.len(), summary, stopwatch);
        info!(
            bytes_in = report.bytes_in,
            bytes_out = report.bytes_out,
            blocks = report.blocks,
            "stream decompressed"
        );
        Ok(StreamOutput { data, report })
    }

    fn finish_report(
        &mut self,
        bytes_in: usize,
        bytes_out: usize,
        summary: super::RunSummary,
        stopwatch: Stopwatch,
    ) -> StreamReport {
        let metrics = &mut self.metrics;
        metrics.bytes_in = bytes_in as u64;
        metrics.bytes_out = bytes_out as u64;
        metrics.elapsed = stopwatch.stop();
        metrics.calculate_compression_ratio();

        StreamReport {
            bytes_in: bytes_in as u64,
            bytes_out: bytes_out as u64,
            blocks: summary.blocks,
            stored_raw_blocks: summary.stored_raw_blocks,
            checksum: summary.checksum,
            metrics: metrics.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumKind;
    use crate::config::PipelineConfig;
    use crate::device::{InlineAccelerator, PassthroughCodec, RunLengthCodec};

    fn scheduler<C: crate::device::BlockCodec>(codec: C) -> PipelineScheduler<InlineAccelerator<C>> {
        let config = PipelineConfig::default().with_block_size_bytes(32).with_lanes(2, 2);
        PipelineScheduler::new(config, InlineAccelerator::new(codec, 2)).unwrap()
    }

    #[test]
    fn test_compress_layout() -> PipelineResult<()> {
        let input = vec![5u8; 40];
        let out = scheduler(RunLengthCodec).compress(&input)?;

        let header = StreamHeader::decode(&out.data)?;
        assert_eq!(header.block_size, 32);
        assert_eq!(header.original_len, 40);
        assert_eq!(header.checksum, ChecksumKind::Crc32);

        // Two compressed records of one run each
        assert_eq!(out.data.len(), frame::HEADER_LEN + 2 * (4 + 2) + frame::TRAILER_LEN);
        assert_eq!(out.report.blocks, 2);
        assert_eq!(out.report.stored_raw_blocks, 0);
        assert_eq!(out.report.checksum.value, crc32fast::hash(&input));
        Ok(())
    }

    #[test]
    fn test_round_trip_mixed_blocks() -> PipelineResult<()> {
        let mut input = vec![0u8; 64];
        input.extend((0..64u8).map(|b| b.wrapping_mul(37)));
        input.extend(vec![9u8; 10]);

        let mut pipeline = scheduler(RunLengthCodec);
        let compressed = pipeline.compress(&input)?;
        assert!(compressed.report.stored_raw_blocks >= 2);

        let restored = pipeline.decompress(&compressed.data)?;
        assert_eq!(restored.data, input);
        assert_eq!(restored.report.checksum, compressed.report.checksum);
        Ok(())
    }

    #[test]
    fn test_empty_stream() -> PipelineResult<()> {
        let mut pipeline = scheduler(PassthroughCodec);
        let compressed = pipeline.compress(&[])?;
        assert_eq!(compressed.report.blocks, 1);
        assert_eq!(compressed.report.stored_raw_blocks, 1);

        let restored = pipeline.decompress(&compressed.data)?;
        assert!(restored.data.is_empty());
        Ok(())
    }

    #[test]
    fn test_corrupt_trailer_is_crc_error() -> PipelineResult<()> {
        let mut pipeline = scheduler(RunLengthCodec);
        let mut stream = pipeline.compress(&[1u8; 100])?.data;
        let last = stream.len() - 1;
        stream[last] ^= 0xff;

        let err = pipeline.decompress(&stream).unwrap_err();
        assert!(matches!(err, PipelineError::CrcError { .. }));
        assert!(pipeline.pool().is_idle());
        Ok(())
    }

    #[test]
    fn test_stream_block_size_must_fit_buffers() -> PipelineResult<()> {
        let big = PipelineConfig::default().with_block_size_bytes(64).with_lanes(1, 1);
        let mut producer = PipelineScheduler::new(big, InlineAccelerator::new(RunLengthCodec, 1))?;
        let stream = producer.compress(&[1u8; 100])?.data;

        let err = scheduler(RunLengthCodec).decompress(&stream).unwrap_err();
        assert!(matches!(err, PipelineError::InputValidationError(_)));
        Ok(())
    }
}
