//! Block stream framing
//!
//! ```text
//! header   magic "XBLK" | version | checksum kind | block size code | reserved
//!          | block size (u32 LE) | original length (u64 LE)
//! record   word (u32 LE: bit 31 = stored raw, bits 0..31 = stored length)
//!          | payload
//! trailer  stream checksum (u32 LE)
//! ```
//!
//! There is one record per planned block, so the record count follows from
//! the header and needs no end marker.

use std::ops::Range;

use num_traits::FromPrimitive;
use tracing::debug;

use crate::checksum::ChecksumKind;
use crate::config::{constants::MAX_BLOCK_SIZE, BlockSize};
use crate::error::{PipelineError, PipelineResult};
use crate::planner::{Block, BlockPlanner};

/// Stream magic bytes
pub const MAGIC: [u8; 4] = *b"XBLK";

/// Current format version
pub const VERSION: u8 = 1;

/// Encoded header length
pub const HEADER_LEN: usize = 20;

/// Encoded record word length
pub const RECORD_WORD_LEN: usize = 4;

/// Encoded trailer length
pub const TRAILER_LEN: usize = 4;

const RAW_FLAG: u32 = 1 << 31;

/// Stream header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Original bytes per block
    pub block_size: u32,

    /// Total original length
    pub original_len: u64,

    /// Checksum carried in the trailer
    pub checksum: ChecksumKind,
}

impl StreamHeader {
    /// Append the encoded header to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        let code = BlockSize::from_bytes(self.block_size as usize).map_or(0, BlockSize::code);
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.push(self.checksum as u8);
        out.push(code);
        out.push(0);
        out.extend_from_slice(&self.block_size.to_le_bytes());
        out.extend_from_slice(&self.original_len.to_le_bytes());
    }

    /// Decode and validate a header from the front of `input`
    ///
    /// # Errors
    /// `ShortInput` if the header is truncated, `InputValidationError` for a
    /// foreign or inconsistent header
    pub fn decode(input: &[u8]) -> PipelineResult<Self> {
        let header = input.get(..HEADER_LEN).ok_or(PipelineError::ShortInput {
            needed: HEADER_LEN as u64,
            available: input.len() as u64,
        })?;

        if header[..4] != MAGIC {
            return Err(PipelineError::InputValidationError(
                "not a block stream (bad magic)".to_string(),
            ));
        }
        if header[4] != VERSION {
            return Err(PipelineError::InputValidationError(format!(
                "unsupported stream version {}",
                header[4]
            )));
        }
        let checksum = ChecksumKind::from_u8(header[5]).ok_or_else(|| {
            PipelineError::InputValidationError(format!("unknown checksum kind {}", header[5]))
        })?;

        let block_size = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        if block_size == 0 || block_size as usize > MAX_BLOCK_SIZE {
            return Err(PipelineError::InputValidationError(format!(
                "invalid block size {}",
                block_size
            )));
        }
        let code = header[6];
        if code != 0 && BlockSize::from_code(code).map(BlockSize::bytes) != Some(block_size as usize) {
            return Err(PipelineError::InputValidationError(format!(
                "block size code {} disagrees with block size {}",
                code, block_size
            )));
        }

        let mut len = [0u8; 8];
        len.copy_from_slice(&header[12..20]);
        Ok(Self {
            block_size,
            original_len: u64::from_le_bytes(len),
            checksum,
        })
    }
}

/// Encode a record word
pub fn record_word(stored_raw: bool, stored_len: u32) -> [u8; 4] {
    debug_assert!(stored_len & RAW_FLAG == 0);
    let flag = if stored_raw { RAW_FLAG } else { 0 };
    (flag | stored_len).to_le_bytes()
}

/// Append one block record to `out`
pub fn write_record(out: &mut Vec<u8>, block: &Block, payload: &[u8]) {
    out.extend_from_slice(&record_word(block.stored_raw, payload.len() as u32));
    out.extend_from_slice(payload);
}

/// Append the stream trailer to `out`
pub fn write_trailer(out: &mut Vec<u8>, checksum: u32) {
    out.extend_from_slice(&checksum.to_le_bytes());
}

/// A block record located in an encoded stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    /// Block descriptor with its stored sizes
    pub block: Block,

    /// Location of the payload in the encoded stream
    pub payload: Range<usize>,
}

/// Every record of a stream plus its trailer checksum
#[derive(Debug)]
pub struct ParsedStream {
    /// Decoded header
    pub header: StreamHeader,

    /// Records in block order
    pub records: Vec<BlockRecord>,

    /// Checksum carried in the trailer
    pub checksum: u32,
}

fn take(input: &[u8], pos: usize, len: usize) -> PipelineResult<&[u8]> {
    input.get(pos..pos + len).ok_or(PipelineError::ShortInput {
        needed: (pos + len) as u64,
        available: input.len() as u64,
    })
}

/// Locate and validate every record of `input`
///
/// All lengths are checked here, before any block is decoded.
///
/// # Errors
/// `ShortInput` for truncation, `LengthMismatch` for records whose stored
/// length contradicts the block plan or for bytes past the trailer
pub fn parse_records(input: &[u8], header: StreamHeader) -> PipelineResult<ParsedStream> {
    let planner = BlockPlanner::new(header.original_len, header.block_size as usize)?;
    let mut records = Vec::new();
    let mut pos = HEADER_LEN;

    for block in planner.plan() {
        let word = take(input, pos, RECORD_WORD_LEN)?;
        let word = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        pos += RECORD_WORD_LEN;

        let stored_raw = word & RAW_FLAG != 0;
        let stored_len = word & !RAW_FLAG;
        let valid = if stored_raw {
            stored_len == block.orig_len
        } else {
            stored_len < block.orig_len
        };
        if !valid {
            return Err(PipelineError::LengthMismatch {
                block_index: block.index,
                expected: u64::from(block.orig_len),
                actual: u64::from(stored_len),
            });
        }

        take(input, pos, stored_len as usize)?;
        let payload = pos..pos + stored_len as usize;
        pos += stored_len as usize;

        records.push(BlockRecord {
            block: Block::decoded(block.index, block.offset, block.orig_len, stored_len, stored_raw),
            payload,
        });
    }

    let trailer = take(input, pos, TRAILER_LEN)?;
    let checksum = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    pos += TRAILER_LEN;
    if pos != input.len() {
        return Err(PipelineError::LengthMismatch {
            block_index: planner.block_count(),
            expected: pos as u64,
            actual: input.len() as u64,
        });
    }

    debug!(blocks = records.len(), "stream framing validated");
    Ok(ParsedStream {
        header,
        records,
        checksum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(original_len: u64) -> StreamHeader {
        StreamHeader {
            block_size: 8,
            original_len,
            checksum: ChecksumKind::Crc32,
        }
    }

    fn stream(original_len: u64, records: &[(bool, &[u8])], checksum: u32) -> Vec<u8> {
        let mut out = Vec::new();
        header(original_len).encode(&mut out);
        for (raw, payload) in records {
            out.extend_from_slice(&record_word(*raw, payload.len() as u32));
            out.extend_from_slice(payload);
        }
        write_trailer(&mut out, checksum);
        out
    }

    #[test]
    fn test_header_layout() -> PipelineResult<()> {
        let hdr = StreamHeader {
            block_size: 64 * 1024,
            original_len: 1 << 40,
            checksum: ChecksumKind::Adler32,
        };
        let mut out = Vec::new();
        hdr.encode(&mut out);
        assert_eq!(out.len(), HEADER_LEN);
        assert_eq!(&out[..4], b"XBLK");
        assert_eq!(out[6], BlockSize::Kb64.code());
        assert_eq!(StreamHeader::decode(&out)?, hdr);
        Ok(())
    }

    #[test]
    fn test_header_rejections() {
        let mut out = Vec::new();
        header(10).encode(&mut out);

        assert!(matches!(
            StreamHeader::decode(&out[..10]),
            Err(PipelineError::ShortInput { needed: 20, available: 10 })
        ));

        let mut bad = out.clone();
        bad[0] = b'Z';
        assert!(StreamHeader::decode(&bad).is_err());

        let mut bad = out.clone();
        bad[5] = 9;
        assert!(StreamHeader::decode(&bad).is_err());

        let mut bad = out.clone();
        bad[6] = BlockSize::Mb1.code();
        assert!(StreamHeader::decode(&bad).is_err());

        let mut bad = out;
        bad[8..12].copy_from_slice(&0u32.to_le_bytes());
        assert!(StreamHeader::decode(&bad).is_err());
    }

    #[test]
    fn test_parse_records() -> PipelineResult<()> {
        let input = stream(12, &[(false, b"abc"), (true, b"wxyz")], 0xfeed);
        let parsed = parse_records(&input, StreamHeader::decode(&input)?)?;
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.checksum, 0xfeed);

        let first = &parsed.records[0];
        assert!(!first.block.stored_raw);
        assert_eq!(first.block.orig_len, 8);
        assert_eq!(&input[first.payload.clone()], b"abc");

        let second = &parsed.records[1];
        assert!(second.block.stored_raw);
        assert_eq!(second.block.offset, 8);
        assert_eq!(&input[second.payload.clone()], b"wxyz");
        Ok(())
    }

    #[test]
    fn test_raw_record_length_must_match() {
        let input = stream(8, &[(true, b"short")], 0);
        let err = parse_records(&input, header(8)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::LengthMismatch { block_index: 0, expected: 8, actual: 5 }
        ));
    }

    #[test]
    fn test_compressed_record_must_shrink() {
        let input = stream(8, &[(false, b"12345678")], 0);
        assert!(matches!(
            parse_records(&input, header(8)),
            Err(PipelineError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_payload() {
        let input = stream(16, &[(false, b"abc"), (false, b"de")], 0);
        let cut = &input[..input.len() - 6];
        assert!(matches!(
            parse_records(cut, header(16)),
            Err(PipelineError::ShortInput { .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut input = stream(4, &[(true, b"abcd")], 0);
        input.push(0);
        assert!(matches!(
            parse_records(&input, header(4)),
            Err(PipelineError::LengthMismatch { block_index: 1, .. })
        ));
    }

    #[test]
    fn test_empty_stream_has_one_empty_raw_record() -> PipelineResult<()> {
        let input = stream(0, &[(true, b"")], 0);
        let parsed = parse_records(&input, header(0))?;
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].block.orig_len, 0);
        Ok(())
    }
}
