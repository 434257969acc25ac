//! Stream checksums and out-of-order aggregation
//!
//! Each block carries a partial checksum over its original bytes together
//! with its length. Partials are combined in block-index order no matter in
//! which order the lanes deliver them.

use std::collections::BTreeMap;

use num_derive::{FromPrimitive, ToPrimitive};
use tracing::trace;

/// Largest prime below 2^16, the Adler-32 modulus
const ADLER_BASE: u64 = 65_521;

/// Supported stream checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum ChecksumKind {
    /// CRC-32 (IEEE), as used by gzip
    Crc32 = 0,

    /// Adler-32, as used by zlib
    Adler32 = 1,
}

/// Checksum of a contiguous byte range, with the range length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockChecksum {
    /// Checksum value
    pub value: u32,

    /// Number of bytes covered
    pub len: u64,
}

/// Final checksum of a whole stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checksum {
    /// Algorithm that produced the value
    pub kind: ChecksumKind,

    /// Checksum value
    pub value: u32,
}

impl ChecksumKind {
    /// Checksum of zero bytes
    pub fn empty(self) -> BlockChecksum {
        let value = match self {
            ChecksumKind::Crc32 => 0,
            ChecksumKind::Adler32 => 1,
        };
        BlockChecksum { value, len: 0 }
    }

    /// Compute the checksum of `data`
    pub fn compute(self, data: &[u8]) -> BlockChecksum {
        let value = match self {
            ChecksumKind::Crc32 => crc32fast::hash(data),
            ChecksumKind::Adler32 => adler32(1, data),
        };
        BlockChecksum {
            value,
            len: data.len() as u64,
        }
    }

    /// Checksum of `first` immediately followed by `second`
    pub fn combine(self, first: BlockChecksum, second: BlockChecksum) -> BlockChecksum {
        let value = match self {
            ChecksumKind::Crc32 => {
                let mut hasher = crc32fast::Hasher::new_with_initial_len(first.value, first.len);
                hasher.combine(&crc32fast::Hasher::new_with_initial_len(second.value, second.len));
                hasher.finalize()
            }
            ChecksumKind::Adler32 => adler32_combine(first.value, second.value, second.len),
        };
        BlockChecksum {
            value,
            len: first.len + second.len,
        }
    }
}

/// Continue an Adler-32 over `data`
pub fn adler32(adler: u32, data: &[u8]) -> u32 {
    // 5552 is the largest run that cannot overflow the u32 sums
    const NMAX: usize = 5552;

    let mut a = adler & 0xffff;
    let mut b = adler >> 16;
    for chunk in data.chunks(NMAX) {
        for &byte in chunk {
            a += u32::from(byte);
            b += a;
        }
        a %= ADLER_BASE as u32;
        b %= ADLER_BASE as u32;
    }
    (b << 16) | a
}

/// Adler-32 of `A || B` from the Adler-32s of `A` and `B` and `len(B)`
pub fn adler32_combine(adler1: u32, adler2: u32, len2: u64) -> u32 {
    let rem = len2 % ADLER_BASE;
    let a1 = u64::from(adler1 & 0xffff);
    let b1 = u64::from(adler1 >> 16);
    let a2 = u64::from(adler2 & 0xffff);
    let b2 = u64::from(adler2 >> 16);

    let mut sum1 = a1 + a2 + ADLER_BASE - 1;
    let mut sum2 = (rem * a1) % ADLER_BASE;
    sum2 += b1 + b2 + ADLER_BASE - rem;

    if sum1 >= ADLER_BASE {
        sum1 -= ADLER_BASE;
    }
    if sum1 >= ADLER_BASE {
        sum1 -= ADLER_BASE;
    }
    if sum2 >= ADLER_BASE << 1 {
        sum2 -= ADLER_BASE << 1;
    }
    if sum2 >= ADLER_BASE {
        sum2 -= ADLER_BASE;
    }
    ((sum2 << 16) | sum1) as u32
}

/// Combines per-block partial checksums arriving in any order
///
/// The contiguous prefix `0..next_index` is folded as soon as it is
/// available; later blocks wait in `parked` until the gap closes. Memory is
/// therefore bounded by the reordering depth of the pipeline, and the final
/// value depends only on the set of updates, never on their order.
#[derive(Debug)]
pub struct ChecksumAggregator {
    kind: ChecksumKind,
    expected_blocks: u32,
    folded: BlockChecksum,
    next_index: u32,
    parked: BTreeMap<u32, BlockChecksum>,
}

impl ChecksumAggregator {
    /// Create an aggregator expecting `expected_blocks` updates
    pub fn new(kind: ChecksumKind, expected_blocks: u32) -> Self {
        Self {
            kind,
            expected_blocks,
            folded: kind.empty(),
            next_index: 0,
            parked: BTreeMap::new(),
        }
    }

    /// Record the partial checksum of block `block_index`
    ///
    /// # Panics
    /// Panics if the index is out of range or was already recorded; both mean
    /// the pipeline processed a block twice or invented one.
    pub fn update(&mut self, block_index: u32, partial: BlockChecksum) {
        assert!(
            block_index < self.expected_blocks,
            "checksum update for block {} but stream has {} blocks",
            block_index,
            self.expected_blocks
        );
        assert!(
            block_index >= self.next_index && !self.parked.contains_key(&block_index),
            "duplicate checksum update for block {}",
            block_index
        );

        self.parked.insert(block_index, partial);
        while let Some(next) = self.parked.remove(&self.next_index) {
            self.folded = self.kind.combine(self.folded, next);
            self.next_index += 1;
        }
        trace!(
            block_index,
            folded = self.next_index,
            parked = self.parked.len(),
            "checksum partial recorded"
        );
    }

    /// Whether every expected block has been recorded
    pub fn is_complete(&self) -> bool {
        self.next_index == self.expected_blocks
    }

    /// Number of blocks recorded so far
    pub fn recorded(&self) -> u32 {
        self.next_index + self.parked.len() as u32
    }

    /// Algorithm in use
    pub fn kind(&self) -> ChecksumKind {
        self.kind
    }

    /// Produce the stream checksum
    ///
    /// # Panics
    /// Panics if called before every block was recorded.
    pub fn finalize(self) -> Checksum {
        assert!(
            self.is_complete(),
            "checksum finalized early: {} of {} blocks recorded",
            self.recorded(),
            self.expected_blocks
        );
        Checksum {
            kind: self.kind,
            value: self.folded.value,
        }
    }
}
