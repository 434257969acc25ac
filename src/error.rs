//! Error handling for the block pipeline driver

use thiserror::Error;

use crate::device::CompletionStatus;
use crate::guard::BombDetected;

/// Comprehensive error enum for the block pipeline driver
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Accelerator or lane initialization errors
    #[error("Device initialization failed: {0}")]
    DeviceInitError(String),

    /// Invalid pipeline configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Input validation errors
    #[error("Invalid input: {0}")]
    InputValidationError(String),

    /// No free transfer buffer; resolved by waiting for a completion
    #[error("Buffer pool exhausted")]
    PoolExhausted,

    /// The accelerator reported a failure on a specific block
    #[error("Accelerator failed on block {block_index}: {status:?}")]
    AcceleratorError {
        /// Index of the failing block in the stream
        block_index: u32,
        /// Status word reported by the accelerator
        status: CompletionStatus,
    },

    /// Decompressed output would exceed the configured bound
    #[error(transparent)]
    BombDetected(#[from] BombDetected),

    /// Stream ended before a declared structure was complete
    #[error("Short input: needed {needed} bytes, {available} available")]
    ShortInput {
        /// Bytes required to continue parsing
        needed: u64,
        /// Bytes actually present
        available: u64,
    },

    /// Block or stream length bookkeeping is inconsistent
    #[error("Length mismatch on block {block_index}: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Index of the inconsistent block
        block_index: u32,
        /// Length the bookkeeping expects
        expected: u64,
        /// Length actually observed
        actual: u64,
    },

    /// Accelerator produced more bytes than the slot can hold
    #[error("Block {block_index} produced {encoded_len} bytes, slot capacity is {capacity}")]
    CapacityExceeded {
        /// Index of the offending block
        block_index: u32,
        /// Length reported by the accelerator
        encoded_len: u32,
        /// Capacity of the slot that received it
        capacity: usize,
    },

    /// A submission outlived its deadline
    #[error("Submission of block {block_index} on lane {lane} timed out")]
    TimeoutError {
        /// Index of the block that never completed
        block_index: u32,
        /// Lane the block was submitted to
        lane: usize,
    },

    /// Stream checksum verification errors
    #[error("Checksum verification failed: expected {expected:#010x}, computed {actual:#010x}")]
    CrcError {
        /// Checksum carried by the stream
        expected: u32,
        /// Checksum computed over the decoded bytes
        actual: u32,
    },
}

/// Error extension trait for additional error handling capabilities
pub trait ErrorExt {
    /// Determines if the error is potentially recoverable
    fn is_recoverable(&self) -> bool;

    /// Provides a detailed error context
    fn context(&self) -> Option<&str>;
}

impl ErrorExt for PipelineError {
    fn is_recoverable(&self) -> bool {
        match self {
            PipelineError::PoolExhausted => true,
            PipelineError::TimeoutError { .. } => true,
            PipelineError::DeviceInitError(_) => false,
            PipelineError::ConfigError(_) => false,
            PipelineError::InputValidationError(_) => false,
            PipelineError::AcceleratorError { .. } => false,
            PipelineError::BombDetected(_) => false,
            PipelineError::ShortInput { .. } => false,
            PipelineError::LengthMismatch { .. } => false,
            PipelineError::CapacityExceeded { .. } => false,
            PipelineError::CrcError { .. } => false,
        }
    }

    fn context(&self) -> Option<&str> {
        match self {
            PipelineError::DeviceInitError(ctx) => Some(ctx),
            PipelineError::ConfigError(ctx) => Some(ctx),
            PipelineError::InputValidationError(ctx) => Some(ctx),
            _ => None,
        }
    }
}

/// Convenience result type using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;
