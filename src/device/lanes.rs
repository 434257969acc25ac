//! Software accelerators that run a `BlockCodec` per lane

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use tracing::{debug, trace, warn};

use super::{
    Accelerator, BlockCodec, Completion, CompletionResult, CompletionSender, CompletionStatus,
    Direction, Job, LaneId, SubmissionHandle,
};
use crate::error::{PipelineError, PipelineResult};

/// Run one job to completion on the calling thread
pub(crate) fn execute<C: BlockCodec + ?Sized>(codec: &C, job: Job) -> Completion {
    let Job {
        block_index,
        direction,
        checksum,
        mut buffers,
        input_len,
        output_capacity,
    } = job;

    let input_len = input_len.min(buffers.input.len());
    let output_capacity = output_capacity.min(buffers.output.len());
    let input = &buffers.input[..input_len];
    let output = &mut buffers.output[..output_capacity];

    let outcome = match direction {
        Direction::Compress => codec.encode(input, output),
        Direction::Decompress => codec.decode(input, output),
    };
    let (encoded_len, status) = match outcome {
        Ok(len) => (len, CompletionStatus::Ok),
        Err(CompletionStatus::Incompressible) => (input_len, CompletionStatus::Incompressible),
        Err(status) => (0, status),
    };

    // Partial checksums always cover the original bytes
    let checksum_partial = match (direction, status) {
        (Direction::Compress, _) => checksum.compute(input).value,
        (Direction::Decompress, CompletionStatus::Ok) => {
            checksum.compute(&buffers.output[..encoded_len]).value
        }
        _ => 0,
    };

    Completion {
        block_index,
        result: CompletionResult {
            encoded_len: encoded_len as u32,
            checksum_partial,
            status,
        },
        buffers,
    }
}

fn check_lane(lane: LaneId, lanes: usize) -> PipelineResult<()> {
    if lane >= lanes {
        return Err(PipelineError::InputValidationError(format!(
            "lane {} out of range, accelerator has {} lanes",
            lane, lanes
        )));
    }
    Ok(())
}

struct LaneWorker {
    tx: Option<Sender<(Job, CompletionSender)>>,
    thread: Option<JoinHandle<()>>,
}

/// Accelerator with one worker thread per lane
///
/// Each lane consumes its queue in order, so completions within a lane
/// arrive in submission order while lanes overtake each other freely.
pub struct LaneAccelerator<C: BlockCodec> {
    codec: Arc<C>,
    workers: Vec<LaneWorker>,
}

impl<C: BlockCodec> LaneAccelerator<C> {
    /// Start `lanes` workers running `codec`
    ///
    /// # Errors
    /// Returns `DeviceInitError` if a worker thread cannot be spawned
    pub fn new(codec: C, lanes: usize) -> PipelineResult<Self> {
        if lanes == 0 {
            return Err(PipelineError::DeviceInitError(
                "accelerator needs at least one lane".to_string(),
            ));
        }
        let codec = Arc::new(codec);
        let mut workers = Vec::with_capacity(lanes);
        for lane in 0..lanes {
            let (tx, rx) = crossbeam_channel::unbounded::<(Job, CompletionSender)>();
            let lane_codec = Arc::clone(&codec);
            let thread = thread::Builder::new()
                .name(format!("accel-lane-{}", lane))
                .spawn(move || {
                    for (job, done) in rx {
                        let block_index = job.block_index;
                        let completion = execute(&*lane_codec, job);
                        trace!(lane, block_index, status = ?completion.result.status, "lane finished block");
                        done.complete(completion);
                    }
                })
                .map_err(|e| {
                    PipelineError::DeviceInitError(format!("failed to start lane {}: {}", lane, e))
                })?;
            workers.push(LaneWorker {
                tx: Some(tx),
                thread: Some(thread),
            });
        }
        debug!(codec = codec.name(), lanes, "lane accelerator started");
        Ok(Self { codec, workers })
    }
}

impl<C: BlockCodec> Accelerator for LaneAccelerator<C> {
    fn name(&self) -> &str {
        self.codec.name()
    }

    fn lanes(&self) -> usize {
        self.workers.len()
    }

    fn submit(&mut self, lane: LaneId, job: Job) -> PipelineResult<SubmissionHandle> {
        check_lane(lane, self.workers.len())?;
        let (handle, done) = SubmissionHandle::channel(job.block_index, lane);
        let tx = self.workers[lane].tx.as_ref().ok_or_else(|| {
            PipelineError::DeviceInitError(format!("lane {} is shut down", lane))
        })?;
        tx.send((job, done))
            .map_err(|_| PipelineError::DeviceInitError(format!("lane {} worker has stopped", lane)))?;
        Ok(handle)
    }
}

impl<C: BlockCodec> Drop for LaneAccelerator<C> {
    fn drop(&mut self) {
        for worker in &mut self.workers {
            // Closing the queue ends the worker loop
            worker.tx.take();
        }
        for (lane, worker) in self.workers.iter_mut().enumerate() {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    warn!(lane, "lane worker panicked");
                }
            }
        }
    }
}

/// Accelerator that completes every job inside `submit`
///
/// Deterministic stand-in for a device, used to exercise the scheduler
/// without threads.
pub struct InlineAccelerator<C: BlockCodec> {
    codec: C,
    lanes: usize,
}

impl<C: BlockCodec> InlineAccelerator<C> {
    /// Create an inline accelerator reporting `lanes` lanes
    pub fn new(codec: C, lanes: usize) -> Self {
        Self {
            codec,
            lanes: lanes.max(1),
        }
    }
}

impl<C: BlockCodec> Accelerator for InlineAccelerator<C> {
    fn name(&self) -> &str {
        self.codec.name()
    }

    fn lanes(&self) -> usize {
        self.lanes
    }

    fn submit(&mut self, lane: LaneId, job: Job) -> PipelineResult<SubmissionHandle> {
        check_lane(lane, self.lanes)?;
        let (handle, done) = SubmissionHandle::channel(job.block_index, lane);
        done.complete(execute(&self.codec, job));
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumKind;
    use crate::device::{PassthroughCodec, RunLengthCodec, WaitOutcome};
    use crate::transfer::SlotBuffers;

    fn job(block_index: u32, direction: Direction, data: &[u8], capacity: usize) -> Job {
        let mut input = vec![0u8; capacity];
        input[..data.len()].copy_from_slice(data);
        Job {
            block_index,
            direction,
            checksum: ChecksumKind::Crc32,
            buffers: SlotBuffers {
                input,
                output: vec![0u8; capacity],
            },
            input_len: data.len(),
            output_capacity: capacity,
        }
    }

    fn completed(outcome: WaitOutcome) -> Completion {
        match outcome {
            WaitOutcome::Completed(c) => c,
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_execute_compress_checksums_input() {
        let data = [9u8; 300];
        let c = execute(&RunLengthCodec, job(0, Direction::Compress, &data, 300));
        assert_eq!(c.result.status, CompletionStatus::Ok);
        assert_eq!(c.result.encoded_len, 4);
        assert_eq!(c.result.checksum_partial, crc32fast::hash(&data));
    }

    #[test]
    fn test_execute_incompressible_reports_input_len() {
        let data: Vec<u8> = (0..100u8).collect();
        let c = execute(&RunLengthCodec, job(3, Direction::Compress, &data, 100));
        assert_eq!(c.result.status, CompletionStatus::Incompressible);
        assert_eq!(c.result.encoded_len, 100);
        assert_eq!(c.result.checksum_partial, crc32fast::hash(&data));
    }

    #[test]
    fn test_execute_decompress_checksums_output() {
        let c = execute(&RunLengthCodec, job(1, Direction::Decompress, &[4, b'x'], 16));
        assert_eq!(c.result.encoded_len, 4);
        assert_eq!(c.result.checksum_partial, crc32fast::hash(b"xxxx"));
    }

    #[test]
    fn test_inline_completes_immediately() -> PipelineResult<()> {
        let mut accel = InlineAccelerator::new(PassthroughCodec, 2);
        let handle = accel.submit(1, job(0, Direction::Compress, b"abc", 8))?;
        let c = completed(accel.poll(&handle).expect("already complete"));
        assert_eq!(&c.buffers.output[..3], b"abc");
        assert!(accel.submit(2, job(1, Direction::Compress, b"", 8)).is_err());
        Ok(())
    }

    #[test]
    fn test_lane_fifo_order() -> PipelineResult<()> {
        let mut accel = LaneAccelerator::new(PassthroughCodec, 2)?;
        let mut handles = Vec::new();
        for i in 0..8u32 {
            handles.push(accel.submit((i % 2) as usize, job(i, Direction::Compress, &[i as u8; 32], 64))?);
        }
        for (i, handle) in handles.iter().enumerate() {
            let c = completed(handle.wait(None));
            assert_eq!(c.block_index, i as u32);
            assert_eq!(&c.buffers.output[..32], &[i as u8; 32][..]);
        }
        Ok(())
    }

    #[test]
    fn test_zero_lanes_rejected() {
        assert!(LaneAccelerator::new(PassthroughCodec, 0).is_err());
    }
}
