//! Pipeline configuration

use std::time::Duration;

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};

use crate::checksum::ChecksumKind;
use crate::error::{PipelineError, PipelineResult};

/// Configuration constants
pub mod constants {
    /// Default block size (64 KiB)
    pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

    /// Largest block size a record header can describe
    pub const MAX_BLOCK_SIZE: usize = 64 * 1024 * 1024;

    /// Default number of parallel accelerator lanes
    pub const DEFAULT_LANES: usize = 2;

    /// Default overlap depth per lane
    pub const DEFAULT_BUFFERS_PER_LANE: usize = 2;

    /// Default minimum saving before a block is kept compressed
    pub const DEFAULT_RAW_STORE_PCT: u8 = 10;

    /// Default decompression bound as a multiple of the input size
    pub const DEFAULT_MAX_OUTPUT_RATIO: u32 = 10;
}

/// Standard block sizes and their one-byte stream header codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum BlockSize {
    /// 64 KiB blocks
    Kb64 = 4,

    /// 256 KiB blocks
    Kb256 = 5,

    /// 1 MiB blocks
    Mb1 = 6,

    /// 4 MiB blocks
    Mb4 = 7,
}

impl BlockSize {
    /// Block size in bytes
    pub fn bytes(self) -> usize {
        match self {
            BlockSize::Kb64 => 64 * 1024,
            BlockSize::Kb256 => 256 * 1024,
            BlockSize::Mb1 => 1024 * 1024,
            BlockSize::Mb4 => 4 * 1024 * 1024,
        }
    }

    /// Decode a stream header code
    pub fn from_code(code: u8) -> Option<Self> {
        FromPrimitive::from_u8(code)
    }

    /// Stream header code of this size
    pub fn code(self) -> u8 {
        self.to_u8().unwrap_or(0)
    }

    /// Match a byte count against the standard sizes
    pub fn from_bytes(bytes: usize) -> Option<Self> {
        [BlockSize::Kb64, BlockSize::Kb256, BlockSize::Mb1, BlockSize::Mb4]
            .into_iter()
            .find(|size| size.bytes() == bytes)
    }
}

/// Rule deciding whether a compressed block is kept or stored raw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawStorePolicy {
    /// Keep the compressed form only if it saves at least this percentage
    MinSavingsPct(u8),

    /// Keep the compressed form if it is smaller and `orig*10/encoded >= 10`
    SourceRatio,
}

impl Default for RawStorePolicy {
    fn default() -> Self {
        RawStorePolicy::MinSavingsPct(constants::DEFAULT_RAW_STORE_PCT)
    }
}

impl RawStorePolicy {
    /// Whether a block of `orig_len` bytes compressed to `encoded_len`
    /// should be stored raw
    pub fn store_raw(self, orig_len: u32, encoded_len: u32) -> bool {
        if encoded_len >= orig_len {
            return true;
        }
        let orig = u64::from(orig_len);
        let encoded = u64::from(encoded_len);
        match self {
            RawStorePolicy::MinSavingsPct(pct) => (orig - encoded) * 100 < orig * u64::from(pct),
            RawStorePolicy::SourceRatio => encoded == 0 || orig * 10 / encoded < 10,
        }
    }
}

/// Configuration for the block pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Uncompressed bytes per block, and capacity of every transfer buffer
    pub block_size: usize,

    /// Number of parallel accelerator instances
    pub lanes: usize,

    /// Maximum in-flight submissions per lane
    pub buffers_per_lane: usize,

    /// Raw-versus-compressed decision rule
    pub raw_store: RawStorePolicy,

    /// Decompressed output bound as a multiple of the compressed input size
    pub max_output_ratio: u32,

    /// Stream checksum algorithm used when compressing
    pub checksum: ChecksumKind,

    /// Optional deadline for each submission
    pub submission_deadline: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_size: constants::DEFAULT_BLOCK_SIZE,
            lanes: constants::DEFAULT_LANES,
            buffers_per_lane: constants::DEFAULT_BUFFERS_PER_LANE,
            raw_store: RawStorePolicy::default(),
            max_output_ratio: constants::DEFAULT_MAX_OUTPUT_RATIO,
            checksum: ChecksumKind::Crc32,
            submission_deadline: None,
        }
    }
}

impl PipelineConfig {
    /// Use one of the standard block sizes
    pub fn with_block_size(mut self, size: BlockSize) -> Self {
        self.block_size = size.bytes();
        self
    }

    /// Use an arbitrary block size in bytes
    pub fn with_block_size_bytes(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    /// Set the lane count and overlap depth
    pub fn with_lanes(mut self, lanes: usize, buffers_per_lane: usize) -> Self {
        self.lanes = lanes;
        self.buffers_per_lane = buffers_per_lane;
        self
    }

    /// Set the raw-store rule
    pub fn with_raw_store(mut self, policy: RawStorePolicy) -> Self {
        self.raw_store = policy;
        self
    }

    /// Set the decompression bound ratio
    pub fn with_max_output_ratio(mut self, ratio: u32) -> Self {
        self.max_output_ratio = ratio;
        self
    }

    /// Set the checksum algorithm
    pub fn with_checksum(mut self, kind: ChecksumKind) -> Self {
        self.checksum = kind;
        self
    }

    /// Fail submissions that do not complete within `deadline`
    pub fn with_submission_deadline(mut self, deadline: Duration) -> Self {
        self.submission_deadline = Some(deadline);
        self
    }

    /// Total number of transfer buffers
    pub fn pool_size(&self) -> usize {
        self.lanes * self.buffers_per_lane
    }

    /// Validate configuration values
    ///
    /// # Errors
    /// Returns `PipelineError::ConfigError` naming the first invalid value
    pub fn validate(&self) -> PipelineResult<()> {
        if self.block_size == 0 || self.block_size > constants::MAX_BLOCK_SIZE {
            return Err(PipelineError::ConfigError(format!(
                "block_size must be in 1..={} bytes, got {}",
                constants::MAX_BLOCK_SIZE,
                self.block_size
            )));
        }
        if self.lanes == 0 {
            return Err(PipelineError::ConfigError("lanes must be > 0".to_string()));
        }
        if self.buffers_per_lane == 0 {
            return Err(PipelineError::ConfigError(
                "buffers_per_lane must be > 0".to_string(),
            ));
        }
        if let RawStorePolicy::MinSavingsPct(pct) = self.raw_store {
            if pct > 100 {
                return Err(PipelineError::ConfigError(format!(
                    "raw_store percentage must be <= 100, got {}",
                    pct
                )));
            }
        }
        if self.max_output_ratio == 0 {
            return Err(PipelineError::ConfigError(
                "max_output_ratio must be > 0".to_string(),
            ));
        }
        if self.submission_deadline == Some(Duration::ZERO) {
            return Err(PipelineError::ConfigError(
                "submission_deadline must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
