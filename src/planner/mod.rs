//! Block planning and per-block bookkeeping

use std::ops::Range;

use tracing::debug;

use crate::config::RawStorePolicy;
use crate::error::{PipelineError, PipelineResult};

/// One block of the logical stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Position of the block in the stream
    pub index: u32,

    /// Offset of the block's first original byte
    pub offset: u64,

    /// Original (uncompressed) length
    pub orig_len: u32,

    /// Length reported by the accelerator
    pub encoded_len: u32,

    /// Whether the block is stored uncompressed
    pub stored_raw: bool,

    completed: bool,
}

impl Block {
    /// Create a block descriptor awaiting its accelerator result
    pub fn new(index: u32, offset: u64, orig_len: u32) -> Self {
        Self {
            index,
            offset,
            orig_len,
            encoded_len: 0,
            stored_raw: false,
            completed: false,
        }
    }

    /// Create a descriptor whose sizes are already known, as read back from
    /// a compressed stream
    pub fn decoded(index: u32, offset: u64, orig_len: u32, encoded_len: u32, stored_raw: bool) -> Self {
        Self {
            index,
            offset,
            orig_len,
            encoded_len,
            stored_raw,
            completed: true,
        }
    }

    /// Record the accelerator result
    ///
    /// # Panics
    /// Panics if the block was already completed.
    pub fn record_completion(&mut self, encoded_len: u32, stored_raw: bool) {
        assert!(!self.completed, "block {} completed twice", self.index);
        self.encoded_len = encoded_len;
        self.stored_raw = stored_raw;
        self.completed = true;
    }

    /// Whether the accelerator result has been recorded
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Number of bytes the block occupies in a compressed stream
    pub fn stored_len(&self) -> u32 {
        if self.stored_raw {
            self.orig_len
        } else {
            self.encoded_len
        }
    }

    /// Range of the block's original bytes
    pub fn orig_range(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.orig_len as usize
    }
}

/// Splits a stream of known length into fixed-size blocks
#[derive(Debug, Clone, Copy)]
pub struct BlockPlanner {
    input_len: u64,
    block_size: u32,
    block_count: u32,
}

impl BlockPlanner {
    /// Plan `input_len` bytes in blocks of `block_size`
    ///
    /// An empty input is planned as a single zero-length block so it still
    /// travels through the pipeline.
    ///
    /// # Errors
    /// Returns `InputValidationError` for a zero block size or a stream
    /// needing more than `u32::MAX` blocks
    pub fn new(input_len: u64, block_size: usize) -> PipelineResult<Self> {
        let block_size = u32::try_from(block_size)
            .ok()
            .filter(|&size| size > 0)
            .ok_or_else(|| {
                PipelineError::InputValidationError(format!("unusable block size {}", block_size))
            })?;

        let blocks = if input_len == 0 {
            1
        } else {
            (input_len - 1) / u64::from(block_size) + 1
        };
        let block_count = u32::try_from(blocks).map_err(|_| {
            PipelineError::InputValidationError(format!(
                "{} bytes need {} blocks of {} bytes, more than a stream can index",
                input_len, blocks, block_size
            ))
        })?;

        debug!(input_len, block_size, block_count, "planned stream");
        Ok(Self {
            input_len,
            block_size,
            block_count,
        })
    }

    /// Number of blocks in the stream
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// Block size in bytes
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Total input length
    pub fn input_len(&self) -> u64 {
        self.input_len
    }

    /// Descriptor of block `index`
    pub fn block(&self, index: u32) -> Option<Block> {
        if index >= self.block_count {
            return None;
        }
        let offset = u64::from(index) * u64::from(self.block_size);
        let orig_len = (self.input_len - offset).min(u64::from(self.block_size)) as u32;
        Some(Block::new(index, offset, orig_len))
    }

    /// Lazy sequence of every block, restartable by calling `plan` again
    pub fn plan(&self) -> BlockIter {
        BlockIter {
            planner: *self,
            next: 0,
        }
    }

    /// Classify a completed block and record the result on it
    pub fn classify(block: &mut Block, encoded_len: u32, policy: RawStorePolicy) {
        let stored_raw = policy.store_raw(block.orig_len, encoded_len);
        block.record_completion(encoded_len, stored_raw);
    }
}

/// Iterator over planned blocks
#[derive(Debug, Clone)]
pub struct BlockIter {
    planner: BlockPlanner,
    next: u32,
}

impl Iterator for BlockIter {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let block = self.planner.block(self.next)?;
        self.next += 1;
        Some(block)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.planner.block_count - self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for BlockIter {}
