//! Output sinks fed by the scheduler's drain step

use crate::error::{PipelineError, PipelineResult};
use crate::frame::{self, StreamHeader};
use crate::planner::Block;

/// How a sink needs blocks delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputOrdering {
    /// Blocks must arrive in index order; completed blocks wait for earlier ones
    Strict,

    /// Each block owns a fixed output region; any arrival order works
    DisjointRegions,
}

/// Destination for drained blocks
pub trait BlockSink {
    /// Ordering this sink requires
    fn ordering(&self) -> OutputOrdering;

    /// Copy one block's bytes into the output
    ///
    /// # Errors
    /// Returns `PipelineError` if the bytes do not fit the block's place
    fn write_block(&mut self, block: &Block, bytes: &[u8]) -> PipelineResult<()>;
}

/// Growable sink producing a framed compressed stream
#[derive(Debug)]
pub struct FramedSink {
    out: Vec<u8>,
}

impl FramedSink {
    /// Start a stream with `header`, reserving room for `size_hint` bytes
    pub fn new(header: StreamHeader, size_hint: usize) -> Self {
        let mut out = Vec::with_capacity(frame::HEADER_LEN + size_hint);
        header.encode(&mut out);
        Self { out }
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.out.len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    /// Append the trailer and return the stream
    pub fn finish(mut self, checksum: u32) -> Vec<u8> {
        frame::write_trailer(&mut self.out, checksum);
        self.out
    }
}

impl BlockSink for FramedSink {
    fn ordering(&self) -> OutputOrdering {
        OutputOrdering::Strict
    }

    fn write_block(&mut self, block: &Block, bytes: &[u8]) -> PipelineResult<()> {
        frame::write_record(&mut self.out, block, bytes);
        Ok(())
    }
}

/// Pre-sized sink where each block lands at its original offset
#[derive(Debug)]
pub struct RegionSink {
    out: Vec<u8>,
}

impl RegionSink {
    /// Allocate `len` bytes of output
    ///
    /// The caller bounds `len` (see `OutputGuard`) before calling this.
    pub fn new(len: usize) -> Self {
        Self { out: vec![0u8; len] }
    }

    /// Return the output buffer
    pub fn into_inner(self) -> Vec<u8> {
        self.out
    }
}

impl BlockSink for RegionSink {
    fn ordering(&self) -> OutputOrdering {
        OutputOrdering::DisjointRegions
    }

    fn write_block(&mut self, block: &Block, bytes: &[u8]) -> PipelineResult<()> {
        if bytes.len() != block.orig_len as usize {
            return Err(PipelineError::LengthMismatch {
                block_index: block.index,
                expected: u64::from(block.orig_len),
                actual: bytes.len() as u64,
            });
        }
        let available = self.out.len() as u64;
        let region = self
            .out
            .get_mut(block.orig_range())
            .ok_or(PipelineError::ShortInput {
                needed: block.offset + u64::from(block.orig_len),
                available,
            })?;
        region.copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumKind;

    #[test]
    fn test_framed_sink_layout() {
        let header = StreamHeader {
            block_size: 4,
            original_len: 6,
            checksum: ChecksumKind::Crc32,
        };
        let mut sink = FramedSink::new(header, 0);
        assert_eq!(sink.len(), frame::HEADER_LEN);

        let mut block = Block::new(0, 0, 4);
        block.record_completion(2, false);
        sink.write_block(&block, b"zz").unwrap();

        let out = sink.finish(7);
        assert_eq!(out.len(), frame::HEADER_LEN + 4 + 2 + 4);
        assert_eq!(&out[out.len() - 4..], &7u32.to_le_bytes());
    }

    #[test]
    fn test_region_sink_places_blocks() {
        let mut sink = RegionSink::new(6);
        sink.write_block(&Block::decoded(1, 4, 2, 2, true), b"ef").unwrap();
        sink.write_block(&Block::decoded(0, 0, 4, 3, false), b"abcd").unwrap();
        assert_eq!(sink.into_inner(), b"abcdef");
    }

    #[test]
    fn test_region_sink_rejects_wrong_length() {
        let mut sink = RegionSink::new(4);
        let err = sink
            .write_block(&Block::decoded(0, 0, 4, 2, false), b"abc")
            .unwrap_err();
        assert!(matches!(err, PipelineError::LengthMismatch { expected: 4, actual: 3, .. }));
    }

    #[test]
    fn test_region_sink_rejects_out_of_range() {
        let mut sink = RegionSink::new(4);
        assert!(sink.write_block(&Block::decoded(1, 4, 2, 2, true), b"xy").is_err());
    }
}
