//! Bounded fill/drain scheduler over accelerator lanes

use std::collections::BTreeMap;
use std::iter::Peekable;
use std::ops::Range;
use std::time::Instant;

use tracing::{debug, trace, warn};

use super::lane::{LaneQueue, PendingSubmission};
use super::metrics::PipelineMetrics;
use super::sink::{BlockSink, OutputOrdering};
use crate::checksum::{BlockChecksum, Checksum, ChecksumAggregator, ChecksumKind};
use crate::config::PipelineConfig;
use crate::device::{
    Accelerator, CompletionResult, CompletionStatus, Direction, Job, LaneId, WaitOutcome,
};
use crate::error::{PipelineError, PipelineResult};
use crate::guard::OutputGuard;
use crate::planner::Block;
use crate::transfer::{BufferPool, SlotHandle, TransferDirection};
use crate::utils::Stopwatch;

/// Where a block's bytes are transformed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Staged into a transfer buffer and submitted to a lane
    Accelerate,

    /// Copied straight from the input on the host
    HostCopy,
}

/// One block scheduled for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Block descriptor
    pub block: Block,

    /// Location of the block's input bytes in the source
    pub payload: Range<usize>,

    /// How the block is processed
    pub route: Route,
}

impl WorkItem {
    /// Submit `block`'s original bytes to the accelerator
    pub fn accelerated(block: Block) -> Self {
        Self {
            payload: block.orig_range(),
            block,
            route: Route::Accelerate,
        }
    }
}

/// Totals of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Blocks written to the sink
    pub blocks: u32,

    /// Blocks written uncompressed
    pub stored_raw_blocks: u32,

    /// Payload bytes written to the sink, framing excluded
    pub bytes_written: u64,

    /// Checksum over every block's original bytes
    pub checksum: Checksum,
}

#[derive(Debug)]
enum ReadySource {
    Slot(SlotHandle),
    Host(Range<usize>),
}

#[derive(Debug)]
struct ReadyBlock {
    block: Block,
    source: ReadySource,

    /// Checksum reported by the accelerator
    partial: Option<u32>,
}

struct RunState<'g> {
    direction: Direction,
    checksum: ChecksumKind,
    ordering: OutputOrdering,
    aggregator: ChecksumAggregator,
    guard: Option<&'g mut OutputGuard>,

    /// Completed blocks not yet written, by index
    ready: BTreeMap<u32, ReadyBlock>,

    /// Next index a strict sink expects
    next_drain: u32,
    drained: u32,
    stored_raw: u32,
    bytes_written: u64,
}

/// Drives blocks through a bounded set of transfer buffers and accelerator
/// lanes
///
/// Each lane holds at most `buffers_per_lane` outstanding submissions, so no
/// more than `lanes * buffers_per_lane` blocks are ever in flight. Filling
/// and draining interleave: the scheduler tops up every lane, collects
/// whatever has finished, and only suspends on a single pending completion
/// when neither step made progress.
pub struct PipelineScheduler<A: Accelerator> {
    pub(super) config: PipelineConfig,
    pub(super) accelerator: A,
    pool: BufferPool,
    lanes: Vec<LaneQueue>,
    cursor: usize,
    seq: u64,
    pub(super) metrics: PipelineMetrics,
}

impl<A: Accelerator> PipelineScheduler<A> {
    /// Create a scheduler for `accelerator`
    ///
    /// # Errors
    /// `ConfigError` for an invalid configuration or when the accelerator
    /// has fewer lanes than configured
    pub fn new(config: PipelineConfig, accelerator: A) -> PipelineResult<Self> {
        config.validate()?;
        if accelerator.lanes() < config.lanes {
            return Err(PipelineError::ConfigError(format!(
                "accelerator {} has {} lanes, {} configured",
                accelerator.name(),
                accelerator.lanes(),
                config.lanes
            )));
        }

        let pool = BufferPool::new(config.pool_size(), config.block_size)?;
        let lanes = (0..config.lanes)
            .map(|_| LaneQueue::new(config.buffers_per_lane))
            .collect();
        debug!(
            accelerator = accelerator.name(),
            lanes = config.lanes,
            buffers_per_lane = config.buffers_per_lane,
            block_size = config.block_size,
            "pipeline scheduler ready"
        );

        Ok(Self {
            metrics: PipelineMetrics::new(config.lanes),
            config,
            accelerator,
            pool,
            lanes,
            cursor: 0,
            seq: 0,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Underlying accelerator
    pub fn accelerator(&self) -> &A {
        &self.accelerator
    }

    /// Underlying accelerator, mutably
    pub fn accelerator_mut(&mut self) -> &mut A {
        &mut self.accelerator
    }

    /// Transfer buffer pool
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Metrics of the most recent run
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Submissions currently outstanding across all lanes
    pub fn in_flight(&self) -> usize {
        self.lanes.iter().map(LaneQueue::len).sum()
    }

    /// Push every item through the accelerator into `sink`
    ///
    /// Items must come in index order, starting at 0. The run either writes
    /// every block exactly once or fails; on failure every transfer buffer
    /// is back in the pool before the error is returned.
    ///
    /// # Errors
    /// The first error raised by staging, the accelerator, validation of a
    /// completion, the output guard or the sink
    pub fn run<I, S>(
        &mut self,
        direction: Direction,
        checksum: ChecksumKind,
        source: &[u8],
        items: I,
        sink: &mut S,
        guard: Option<&mut OutputGuard>,
    ) -> PipelineResult<RunSummary>
    where
        I: IntoIterator<Item = WorkItem>,
        I::IntoIter: ExactSizeIterator,
        S: BlockSink,
    {
        let items = items.into_iter();
        let total = u32::try_from(items.len()).map_err(|_| {
            PipelineError::InputValidationError(format!("{} blocks exceed the block index range", items.len()))
        })?;

        self.metrics = PipelineMetrics::new(self.lanes.len());
        let mut run = RunState {
            direction,
            checksum,
            ordering: sink.ordering(),
            aggregator: ChecksumAggregator::new(checksum, total),
            guard,
            ready: BTreeMap::new(),
            next_drain: 0,
            drained: 0,
            stored_raw: 0,
            bytes_written: 0,
        };

        if let Err(err) = self.drive(&mut run, source, items, sink) {
            warn!(error = %err, in_flight = self.in_flight(), "run failed, reclaiming buffers");
            self.abort(&mut run);
            return Err(err);
        }

        debug_assert!(self.lanes.iter().all(LaneQueue::is_empty));
        debug_assert!(self.pool.is_idle());
        debug_assert_eq!(run.drained, total);
        Ok(RunSummary {
            blocks: run.drained,
            stored_raw_blocks: run.stored_raw,
            bytes_written: run.bytes_written,
            checksum: run.aggregator.finalize(),
        })
    }

    fn drive<I, S>(&mut self, run: &mut RunState<'_>, source: &[u8], items: I, sink: &mut S) -> PipelineResult<()>
    where
        I: Iterator<Item = WorkItem>,
        S: BlockSink,
    {
        let mut items = items.peekable();

        while items.peek().is_some() {
            let filled = self.fill(run, source, &mut items)?;
            let collected = self.collect_completions(run)?;
            let drained = self.drain_ready(run, source, sink)?;
            if filled == 0 && collected == 0 && drained == 0 {
                self.wait_for_progress(run)?;
                self.drain_ready(run, source, sink)?;
            }
        }

        // Whatever is still in flight completes one submission per wait
        let remaining = self.in_flight();
        trace!(remaining, "draining leftover submissions");
        for _ in 0..remaining {
            self.wait_for_progress(run)?;
            self.drain_ready(run, source, sink)?;
        }
        self.drain_ready(run, source, sink)?;

        debug_assert!(run.ready.is_empty());
        Ok(())
    }

    /// Next lane with room, round-robin
    fn next_lane(&mut self) -> Option<LaneId> {
        let count = self.lanes.len();
        for step in 0..count {
            let lane = (self.cursor + step) % count;
            if self.lanes[lane].has_room() {
                self.cursor = (lane + 1) % count;
                return Some(lane);
            }
        }
        None
    }

    fn fill<I>(&mut self, run: &mut RunState<'_>, source: &[u8], items: &mut Peekable<I>) -> PipelineResult<usize>
    where
        I: Iterator<Item = WorkItem>,
    {
        let mut filled = 0;
        loop {
            if run.ready.len() >= self.pool.total() {
                break;
            }
            if let Some(item) = items.next_if(|item| item.route == Route::HostCopy) {
                trace!(block_index = item.block.index, "block routed to host copy");
                run.ready.insert(
                    item.block.index,
                    ReadyBlock {
                        block: item.block,
                        source: ReadySource::Host(item.payload),
                        partial: None,
                    },
                );
                filled += 1;
                continue;
            }

            let Some(item) = items.peek() else { break };
            let needed = item.payload.len();
            if needed > self.pool.slot_capacity() {
                return Err(PipelineError::InputValidationError(format!(
                    "block {} needs {} bytes, transfer buffers hold {}",
                    item.block.index,
                    needed,
                    self.pool.slot_capacity()
                )));
            }
            let Some(lane) = self.next_lane() else { break };
            let Some(slot) = self.pool.acquire(needed) else {
                self.metrics.backpressure_events += 1;
                debug!(needed, "no free transfer buffer");
                break;
            };
            let Some(item) = items.next() else {
                self.pool.release(slot);
                break;
            };
            self.submit(run, lane, slot, item, source)?;
            filled += 1;
        }
        Ok(filled)
    }

    fn submit(
        &mut self,
        run: &RunState<'_>,
        lane: LaneId,
        slot: SlotHandle,
        item: WorkItem,
        source: &[u8],
    ) -> PipelineResult<()> {
        let WorkItem { block, payload, .. } = item;
        let bytes = source.get(payload.clone()).ok_or(PipelineError::ShortInput {
            needed: payload.end as u64,
            available: source.len() as u64,
        });
        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(err) => {
                self.pool.release(slot);
                return Err(err);
            }
        };

        let stopwatch = Stopwatch::start();
        if let Err(err) = self.pool.stage(slot, bytes) {
            self.pool.release(slot);
            return Err(err);
        }
        self.metrics
            .record_transfer(TransferDirection::Upload, bytes.len() as u64, stopwatch.stop());

        let job = Job {
            block_index: block.index,
            direction: run.direction,
            checksum: run.checksum,
            buffers: self.pool.submit(slot),
            input_len: bytes.len(),
            output_capacity: block.orig_len as usize,
        };
        let submit_time = Instant::now();
        let handle = match self.accelerator.submit(lane, job) {
            Ok(handle) => handle,
            Err(err) => {
                // The job and its buffers are gone with the failed submit
                self.pool.abandon(slot);
                return Err(err);
            }
        };

        debug!(lane, block_index = block.index, len = bytes.len(), "block submitted");
        self.lanes[lane].push(PendingSubmission {
            lane,
            slot,
            block,
            handle,
            submit_time,
            seq: self.seq,
        });
        self.seq += 1;
        self.metrics.blocks_submitted += 1;
        self.metrics.peak_in_flight = self.metrics.peak_in_flight.max(self.in_flight());
        Ok(())
    }

    /// Collect every finished submission at the head of a lane
    fn collect_completions(&mut self, run: &mut RunState<'_>) -> PipelineResult<usize> {
        let limit = self.config.submission_deadline;
        let mut collected = 0;
        for lane in 0..self.lanes.len() {
            while let Some(head) = self.lanes[lane].front() {
                match self.accelerator.poll(&head.handle) {
                    Some(outcome) => {
                        if let Some(pending) = self.lanes[lane].pop_front() {
                            self.on_completion(run, pending, outcome)?;
                            collected += 1;
                        }
                    }
                    None if head.is_expired(limit) => {
                        if let Some(pending) = self.lanes[lane].pop_front() {
                            self.on_completion(run, pending, WaitOutcome::TimedOut)?;
                        }
                    }
                    None => {
                        self.pool.mark_computing(head.slot);
                        break;
                    }
                }
            }
        }
        Ok(collected)
    }

    /// Lane whose head the scheduler should suspend on
    fn wait_target(&self, run: &RunState<'_>) -> Option<LaneId> {
        if run.ordering == OutputOrdering::Strict {
            let next = self
                .lanes
                .iter()
                .position(|lane| lane.front().map(|p| p.block.index) == Some(run.next_drain));
            if next.is_some() {
                return next;
            }
        }
        self.lanes
            .iter()
            .enumerate()
            .filter_map(|(lane, queue)| queue.front().map(|p| (p.seq, lane)))
            .min()
            .map(|(_, lane)| lane)
    }

    /// Suspend until the chosen lane head completes, then collect it
    fn wait_for_progress(&mut self, run: &mut RunState<'_>) -> PipelineResult<()> {
        let lane = match self.wait_target(run) {
            Some(lane) => lane,
            None => panic!("pipeline stalled with nothing in flight"),
        };
        let outcome = match self.lanes[lane].front() {
            Some(head) => match self.accelerator.poll(&head.handle) {
                Some(outcome) => outcome,
                None => {
                    trace!(lane, block_index = head.block.index, "waiting for completion");
                    self.metrics.waits += 1;
                    head.handle.wait(head.deadline(self.config.submission_deadline))
                }
            },
            None => return Ok(()),
        };
        match self.lanes[lane].pop_front() {
            Some(pending) => self.on_completion(run, pending, outcome),
            None => Ok(()),
        }
    }

    /// Validate a completion and park the block until it can be drained
    fn on_completion(
        &mut self,
        run: &mut RunState<'_>,
        pending: PendingSubmission,
        outcome: WaitOutcome,
    ) -> PipelineResult<()> {
        let PendingSubmission {
            lane,
            slot,
            mut block,
            submit_time,
            ..
        } = pending;

        let completion = match outcome {
            WaitOutcome::Completed(completion) => completion,
            WaitOutcome::TimedOut => {
                warn!(lane, block_index = block.index, "submission deadline passed");
                self.pool.abandon(slot);
                return Err(PipelineError::TimeoutError {
                    block_index: block.index,
                    lane,
                });
            }
            WaitOutcome::Lost => {
                self.pool.abandon(slot);
                return Err(PipelineError::AcceleratorError {
                    block_index: block.index,
                    status: CompletionStatus::DeviceFault,
                });
            }
        };
        self.metrics.lane_completions[lane] += 1;

        let CompletionResult {
            encoded_len,
            checksum_partial,
            status,
        } = completion.result;
        let capacity = self.pool.slot_capacity();

        if completion.block_index != block.index {
            self.pool.complete(slot, completion.buffers, 0);
            self.discard(slot);
            warn!(lane, expected = block.index, actual = completion.block_index, "completion for the wrong block");
            return Err(PipelineError::AcceleratorError {
                block_index: block.index,
                status: CompletionStatus::DeviceFault,
            });
        }
        if encoded_len as usize > capacity {
            self.pool.complete(slot, completion.buffers, 0);
            self.discard(slot);
            return Err(PipelineError::CapacityExceeded {
                block_index: block.index,
                encoded_len,
                capacity,
            });
        }
        self.pool.complete(slot, completion.buffers, encoded_len as usize);

        if status.is_fatal(run.direction) {
            self.discard(slot);
            return Err(PipelineError::AcceleratorError {
                block_index: block.index,
                status,
            });
        }

        match run.direction {
            Direction::Compress => {
                let stored_raw = status == CompletionStatus::Incompressible
                    || self.config.raw_store.store_raw(block.orig_len, encoded_len);
                block.record_completion(encoded_len, stored_raw);
            }
            Direction::Decompress => {
                if encoded_len != block.orig_len {
                    self.discard(slot);
                    return Err(PipelineError::LengthMismatch {
                        block_index: block.index,
                        expected: u64::from(block.orig_len),
                        actual: u64::from(encoded_len),
                    });
                }
            }
        }

        debug!(
            lane,
            block_index = block.index,
            encoded_len,
            stored_raw = block.stored_raw,
            latency = ?submit_time.elapsed(),
            "block completed"
        );
        run.ready.insert(
            block.index,
            ReadyBlock {
                block,
                source: ReadySource::Slot(slot),
                partial: Some(checksum_partial),
            },
        );
        Ok(())
    }

    fn discard(&mut self, slot: SlotHandle) {
        self.pool.begin_drain(slot);
        self.pool.release(slot);
    }

    /// Write every parked block the sink can take now
    fn drain_ready<S: BlockSink>(&mut self, run: &mut RunState<'_>, source: &[u8], sink: &mut S) -> PipelineResult<usize> {
        let mut drained = 0;
        loop {
            let ready = match run.ordering {
                OutputOrdering::Strict => match run.ready.remove(&run.next_drain) {
                    Some(ready) => {
                        run.next_drain += 1;
                        ready
                    }
                    None => break,
                },
                OutputOrdering::DisjointRegions => match run.ready.pop_first() {
                    Some((_, ready)) => ready,
                    None => break,
                },
            };
            self.drain_one(run, source, sink, ready)?;
            drained += 1;
        }
        Ok(drained)
    }

    fn drain_one<S: BlockSink>(
        &mut self,
        run: &mut RunState<'_>,
        source: &[u8],
        sink: &mut S,
        ready: ReadyBlock,
    ) -> PipelineResult<()> {
        let ReadyBlock {
            block,
            source: from,
            partial,
        } = ready;

        let stopwatch = Stopwatch::start();
        let written = self.copy_out(run, source, sink, &block, &from);
        if let ReadySource::Slot(slot) = &from {
            self.pool.release(*slot);
        }
        let written = written?;
        self.metrics
            .record_transfer(TransferDirection::Download, written, stopwatch.stop());

        let partial = match partial {
            Some(value) => BlockChecksum {
                value,
                len: u64::from(block.orig_len),
            },
            // Host copies are raw, so the input bytes are the original bytes
            None => match &from {
                ReadySource::Host(range) => run.checksum.compute(&source[range.clone()]),
                ReadySource::Slot(_) => run.checksum.empty(),
            },
        };
        run.aggregator.update(block.index, partial);

        run.drained += 1;
        run.bytes_written += written;
        self.metrics.blocks_drained += 1;
        if block.stored_raw {
            run.stored_raw += 1;
            self.metrics.stored_raw_blocks += 1;
        }
        trace!(block_index = block.index, written, stored_raw = block.stored_raw, "block drained");
        Ok(())
    }

    /// Reserve against the guard and copy one block into the sink
    fn copy_out<S: BlockSink>(
        &mut self,
        run: &mut RunState<'_>,
        source: &[u8],
        sink: &mut S,
        block: &Block,
        from: &ReadySource,
    ) -> PipelineResult<u64> {
        let bytes: &[u8] = match from {
            ReadySource::Host(range) => &source[range.clone()],
            ReadySource::Slot(slot) => {
                let result = self.pool.begin_drain(*slot);
                if run.direction == Direction::Compress && block.stored_raw {
                    &source[block.orig_range()]
                } else {
                    result
                }
            }
        };

        if let Some(guard) = run.guard.as_deref_mut() {
            guard.check_and_reserve(bytes.len() as u64)?;
        }
        sink.write_block(block, bytes)?;
        Ok(bytes.len() as u64)
    }

    /// Return every slot of a failed run to the pool
    fn abort(&mut self, run: &mut RunState<'_>) {
        for (_, ready) in std::mem::take(&mut run.ready) {
            if let ReadySource::Slot(slot) = ready.source {
                self.pool.release(slot);
            }
        }
        for lane in self.lanes.iter_mut() {
            while let Some(pending) = lane.pop_front() {
                match pending.handle.poll() {
                    Some(WaitOutcome::Completed(completion)) => {
                        self.pool.complete(pending.slot, completion.buffers, 0);
                        self.pool.release(pending.slot);
                    }
                    _ => self.pool.abandon(pending.slot),
                }
            }
        }
        debug_assert!(self.pool.is_idle());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{InlineAccelerator, PassthroughCodec, RunLengthCodec};
    use crate::pipeline::RegionSink;
    use crate::planner::BlockPlanner;

    fn config() -> PipelineConfig {
        PipelineConfig::default()
            .with_block_size_bytes(16)
            .with_lanes(2, 2)
    }

    /// Sink that records the order blocks arrive in
    struct OrderSink {
        ordering: OutputOrdering,
        seen: Vec<u32>,
        out: Vec<u8>,
    }

    impl BlockSink for OrderSink {
        fn ordering(&self) -> OutputOrdering {
            self.ordering
        }

        fn write_block(&mut self, block: &Block, bytes: &[u8]) -> PipelineResult<()> {
            self.seen.push(block.index);
            self.out.extend_from_slice(bytes);
            Ok(())
        }
    }

    fn order_sink(ordering: OutputOrdering) -> OrderSink {
        OrderSink {
            ordering,
            seen: Vec::new(),
            out: Vec::new(),
        }
    }

    fn items(len: usize, block_size: usize) -> Vec<WorkItem> {
        BlockPlanner::new(len as u64, block_size)
            .unwrap()
            .plan()
            .map(WorkItem::accelerated)
            .collect()
    }

    #[test]
    fn test_accelerator_needs_enough_lanes() {
        let accel = InlineAccelerator::new(PassthroughCodec, 1);
        let err = PipelineScheduler::new(config(), accel).err().unwrap();
        assert!(matches!(err, PipelineError::ConfigError(_)));
    }

    #[test]
    fn test_strict_run_preserves_order() -> PipelineResult<()> {
        let input: Vec<u8> = (0..100u8).collect();
        let mut scheduler = PipelineScheduler::new(config(), InlineAccelerator::new(PassthroughCodec, 2))?;
        let mut sink = order_sink(OutputOrdering::Strict);

        let summary = scheduler.run(
            Direction::Compress,
            ChecksumKind::Crc32,
            &input,
            items(input.len(), 16),
            &mut sink,
            None,
        )?;

        assert_eq!(sink.seen, (0..7).collect::<Vec<_>>());
        // Passthrough never saves anything, so every block is stored raw
        assert_eq!(summary.stored_raw_blocks, 7);
        assert_eq!(sink.out, input);
        assert_eq!(summary.checksum.value, crc32fast::hash(&input));
        assert!(scheduler.pool().is_idle());
        assert!(scheduler.metrics().peak_in_flight <= 4);
        Ok(())
    }

    #[test]
    fn test_compressible_blocks_use_slot_output() -> PipelineResult<()> {
        let input = vec![3u8; 64];
        let mut scheduler = PipelineScheduler::new(config(), InlineAccelerator::new(RunLengthCodec, 2))?;
        let mut sink = order_sink(OutputOrdering::Strict);

        let summary = scheduler.run(
            Direction::Compress,
            ChecksumKind::Adler32,
            &input,
            items(input.len(), 16),
            &mut sink,
            None,
        )?;

        assert_eq!(summary.stored_raw_blocks, 0);
        assert_eq!(summary.bytes_written, 8);
        assert_eq!(sink.out, [16, 3, 16, 3, 16, 3, 16, 3]);
        assert_eq!(summary.checksum.value, ChecksumKind::Adler32.compute(&input).value);
        Ok(())
    }

    #[test]
    fn test_host_copy_bypasses_accelerator() -> PipelineResult<()> {
        let source = b"rawbytes".to_vec();
        let item = WorkItem {
            block: Block::decoded(0, 0, 8, 8, true),
            payload: 0..8,
            route: Route::HostCopy,
        };
        let mut scheduler = PipelineScheduler::new(config(), InlineAccelerator::new(PassthroughCodec, 2))?;
        let mut sink = RegionSink::new(8);

        let summary = scheduler.run(
            Direction::Decompress,
            ChecksumKind::Crc32,
            &source,
            vec![item],
            &mut sink,
            None,
        )?;

        assert_eq!(scheduler.metrics().blocks_submitted, 0);
        assert_eq!(summary.checksum.value, crc32fast::hash(b"rawbytes"));
        assert_eq!(sink.into_inner(), source);
        Ok(())
    }

    #[test]
    fn test_guard_stops_run_and_reclaims_slots() -> PipelineResult<()> {
        let input = vec![0u8; 64];
        let mut scheduler = PipelineScheduler::new(config(), InlineAccelerator::new(PassthroughCodec, 2))?;
        let mut sink = order_sink(OutputOrdering::DisjointRegions);
        let mut guard = OutputGuard::new(40);

        let err = scheduler
            .run(
                Direction::Compress,
                ChecksumKind::Crc32,
                &input,
                items(input.len(), 16),
                &mut sink,
                Some(&mut guard),
            )
            .unwrap_err();

        assert!(matches!(err, PipelineError::BombDetected(_)));
        assert!(sink.out.len() <= 40);
        assert!(scheduler.pool().is_idle());
        Ok(())
    }
}
