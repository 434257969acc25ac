//! Accelerator abstraction for the block pipeline
//!
//! The pipeline never runs a codec itself. It hands each block to an
//! `Accelerator` lane together with a pair of transfer buffers and gets both
//! back, with the result length and checksum, through a one-shot completion
//! channel.

mod codec;
mod lanes;

pub use codec::{BlockCodec, PassthroughCodec, RunLengthCodec};
pub use lanes::{InlineAccelerator, LaneAccelerator};

use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};

use crate::checksum::ChecksumKind;
use crate::error::PipelineResult;
use crate::transfer::SlotBuffers;

/// Index of an accelerator lane
pub type LaneId = usize;

/// Transform applied to a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Original bytes in, encoded bytes out
    Compress,

    /// Encoded bytes in, original bytes out
    Decompress,
}

/// Status word reported by the accelerator for one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum CompletionStatus {
    /// Block transformed
    Ok = 0,

    /// Encoded form would not fit the output; the block is stored raw
    Incompressible = 1,

    /// Encoded input could not be decoded
    Malformed = 2,

    /// Decoded output would overflow the output buffer
    OutputOverflow = 3,

    /// Any other device failure
    DeviceFault = 4,
}

impl CompletionStatus {
    /// Decode a raw status word; unknown codes are device faults
    pub fn from_raw(code: u32) -> Self {
        FromPrimitive::from_u32(code).unwrap_or(CompletionStatus::DeviceFault)
    }

    /// Raw status word
    pub fn raw(self) -> u32 {
        self.to_u32().unwrap_or(CompletionStatus::DeviceFault as u32)
    }

    /// Whether the status fails the stream in `direction`
    pub fn is_fatal(self, direction: Direction) -> bool {
        match self {
            CompletionStatus::Ok => false,
            CompletionStatus::Incompressible => direction == Direction::Decompress,
            _ => true,
        }
    }
}

/// One block handed to an accelerator lane
#[derive(Debug)]
pub struct Job {
    /// Position of the block in the stream
    pub block_index: u32,

    /// Transform to apply
    pub direction: Direction,

    /// Checksum to compute over the block's original bytes
    pub checksum: ChecksumKind,

    /// Transfer buffers lent for the submission
    pub buffers: SlotBuffers,

    /// Valid bytes at the front of `buffers.input`
    pub input_len: usize,

    /// Bytes the accelerator may write into `buffers.output`
    pub output_capacity: usize,
}

/// Result of one submission, as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionResult {
    /// Bytes written to the output buffer
    pub encoded_len: u32,

    /// Checksum of the block's original bytes
    pub checksum_partial: u32,

    /// Status word
    pub status: CompletionStatus,
}

/// A finished submission: the device result plus the returned buffers
#[derive(Debug)]
pub struct Completion {
    /// Position of the block in the stream
    pub block_index: u32,

    /// Device result
    pub result: CompletionResult,

    /// Buffers lent by the submission
    pub buffers: SlotBuffers,
}

/// Outcome of waiting on a submission
#[derive(Debug)]
pub enum WaitOutcome {
    /// The submission completed
    Completed(Completion),

    /// The deadline passed first
    TimedOut,

    /// The accelerator dropped the submission without completing it
    Lost,
}

/// Receiving end of a single submission
#[derive(Debug)]
pub struct SubmissionHandle {
    block_index: u32,
    lane: LaneId,
    rx: Receiver<Completion>,
}

/// Sending end of a single submission, held by the accelerator
#[derive(Debug)]
pub struct CompletionSender {
    tx: Sender<Completion>,
}

impl CompletionSender {
    /// Deliver the completion; fires at most once
    pub fn complete(self, completion: Completion) {
        // A closed receiver means the stream was aborted
        let _ = self.tx.send(completion);
    }
}

impl SubmissionHandle {
    /// Create a connected handle and sender for one submission
    pub fn channel(block_index: u32, lane: LaneId) -> (Self, CompletionSender) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (
            Self {
                block_index,
                lane,
                rx,
            },
            CompletionSender { tx },
        )
    }

    /// Block the submission carries
    pub fn block_index(&self) -> u32 {
        self.block_index
    }

    /// Lane the submission was issued to
    pub fn lane(&self) -> LaneId {
        self.lane
    }

    /// Non-blocking check for completion
    pub fn poll(&self) -> Option<WaitOutcome> {
        match self.rx.try_recv() {
            Ok(completion) => Some(WaitOutcome::Completed(completion)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(WaitOutcome::Lost),
        }
    }

    /// Wait for completion until `deadline`, or forever without one
    pub fn wait(&self, deadline: Option<Instant>) -> WaitOutcome {
        let received = match deadline {
            Some(deadline) => self.rx.recv_deadline(deadline),
            None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(completion) => WaitOutcome::Completed(completion),
            Err(RecvTimeoutError::Timeout) => WaitOutcome::TimedOut,
            Err(RecvTimeoutError::Disconnected) => WaitOutcome::Lost,
        }
    }
}

/// Trait defining the interface for block transform accelerators
pub trait Accelerator {
    /// Human-readable accelerator name
    fn name(&self) -> &str;

    /// Number of independent lanes
    fn lanes(&self) -> usize;

    /// Submit a block to `lane` without blocking
    ///
    /// # Errors
    /// Returns `PipelineError` if the lane cannot accept work
    fn submit(&mut self, lane: LaneId, job: Job) -> PipelineResult<SubmissionHandle>;

    /// Check a submission for completion
    fn poll(&mut self, handle: &SubmissionHandle) -> Option<WaitOutcome> {
        handle.poll()
    }
}

impl<A: Accelerator + ?Sized> Accelerator for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn lanes(&self) -> usize {
        (**self).lanes()
    }

    fn submit(&mut self, lane: LaneId, job: Job) -> PipelineResult<SubmissionHandle> {
        (**self).submit(lane, job)
    }

    fn poll(&mut self, handle: &SubmissionHandle) -> Option<WaitOutcome> {
        (**self).poll(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_from_raw() {
        assert_eq!(CompletionStatus::from_raw(0), CompletionStatus::Ok);
        assert_eq!(CompletionStatus::from_raw(2), CompletionStatus::Malformed);
        assert_eq!(CompletionStatus::from_raw(0xdead), CompletionStatus::DeviceFault);
        assert_eq!(CompletionStatus::OutputOverflow.raw(), 3);
    }

    #[test]
    fn test_incompressible_only_fatal_when_decoding() {
        let status = CompletionStatus::Incompressible;
        assert!(!status.is_fatal(Direction::Compress));
        assert!(status.is_fatal(Direction::Decompress));
        assert!(CompletionStatus::Malformed.is_fatal(Direction::Compress));
    }

    #[test]
    fn test_handle_fires_once() {
        let (handle, sender) = SubmissionHandle::channel(5, 1);
        assert!(handle.poll().is_none());

        sender.complete(Completion {
            block_index: 5,
            result: CompletionResult {
                encoded_len: 0,
                checksum_partial: 0,
                status: CompletionStatus::Ok,
            },
            buffers: SlotBuffers::default(),
        });

        assert!(matches!(handle.poll(), Some(WaitOutcome::Completed(c)) if c.block_index == 5));
        // Sender is gone after the single completion
        assert!(matches!(handle.poll(), Some(WaitOutcome::Lost)));
    }

    #[test]
    fn test_wait_deadline() {
        let (handle, _sender) = SubmissionHandle::channel(0, 0);
        let deadline = Instant::now() + Duration::from_millis(10);
        assert!(matches!(handle.wait(Some(deadline)), WaitOutcome::TimedOut));
    }

    #[test]
    fn test_dropped_sender_is_lost() {
        let (handle, sender) = SubmissionHandle::channel(0, 0);
        drop(sender);
        assert!(matches!(handle.wait(None), WaitOutcome::Lost));
    }
}
