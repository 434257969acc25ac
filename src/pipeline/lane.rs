//! Per-lane bookkeeping of outstanding submissions

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::device::{LaneId, SubmissionHandle};
use crate::planner::Block;
use crate::transfer::SlotHandle;

/// A block handed to an accelerator lane and not yet collected
#[derive(Debug)]
pub(crate) struct PendingSubmission {
    pub lane: LaneId,
    pub slot: SlotHandle,
    pub block: Block,
    pub handle: SubmissionHandle,
    pub submit_time: Instant,

    /// Global submission order across lanes
    pub seq: u64,
}

impl PendingSubmission {
    /// Instant after which the submission counts as hung
    pub fn deadline(&self, limit: Option<Duration>) -> Option<Instant> {
        limit.map(|limit| self.submit_time + limit)
    }

    /// Whether `limit` has run out
    pub fn is_expired(&self, limit: Option<Duration>) -> bool {
        self.deadline(limit).map_or(false, |deadline| Instant::now() >= deadline)
    }
}

/// Outstanding submissions of one lane, oldest first
///
/// Completions are only collected from the front, which keeps the lane's
/// results in submission order whatever order the device finishes them in.
#[derive(Debug)]
pub(crate) struct LaneQueue {
    pending: VecDeque<PendingSubmission>,
    depth: usize,
}

impl LaneQueue {
    pub fn new(depth: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(depth),
            depth,
        }
    }

    /// Whether another submission fits under the lane's depth
    pub fn has_room(&self) -> bool {
        self.pending.len() < self.depth
    }

    pub fn push(&mut self, submission: PendingSubmission) {
        debug_assert!(self.has_room());
        self.pending.push_back(submission);
    }

    pub fn front(&self) -> Option<&PendingSubmission> {
        self.pending.front()
    }

    pub fn pop_front(&mut self) -> Option<PendingSubmission> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::BufferPool;

    fn submission(pool: &mut BufferPool, index: u32, seq: u64) -> PendingSubmission {
        let slot = pool.acquire(0).unwrap();
        let (handle, _done) = SubmissionHandle::channel(index, 0);
        PendingSubmission {
            lane: 0,
            slot,
            block: Block::new(index, 0, 0),
            handle,
            submit_time: Instant::now(),
            seq,
        }
    }

    #[test]
    fn test_depth_limit() {
        let mut pool = BufferPool::new(4, 8).unwrap();
        let mut lane = LaneQueue::new(2);
        assert!(lane.is_empty());

        lane.push(submission(&mut pool, 0, 0));
        lane.push(submission(&mut pool, 1, 1));
        assert!(!lane.has_room());
        assert_eq!(lane.len(), 2);

        let first = lane.pop_front().unwrap();
        assert_eq!(first.block.index, 0);
        assert_eq!(lane.front().map(|p| p.seq), Some(1));
        assert!(lane.has_room());
    }

    #[test]
    fn test_expiry() {
        let mut pool = BufferPool::new(1, 8).unwrap();
        let mut pending = submission(&mut pool, 0, 0);
        assert!(!pending.is_expired(None));
        assert!(!pending.is_expired(Some(Duration::from_secs(60))));

        pending.submit_time = Instant::now() - Duration::from_millis(50);
        assert!(pending.is_expired(Some(Duration::from_millis(10))));
    }
}
