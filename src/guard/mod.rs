//! Bounded-output guard for decompression
//!
//! Block size fields in a compressed stream are controlled by whoever wrote
//! the stream. Every copy into the output is reserved here first, so a forged
//! or corrupted size can never drive the output past
//! `max_output_ratio × input_len`.

use thiserror::Error;
use tracing::error;

/// Raised when decoded output would cross the configured bound
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "ZIP BOMB: decompressed output would reach {attempted} bytes, over the {limit} byte bound; \
     raise max_output_ratio (currently {max_ratio}) to allow it"
)]
pub struct BombDetected {
    /// Maximum number of output bytes allowed
    pub limit: u64,

    /// Running total the rejected reservation would have produced
    pub attempted: u64,

    /// Ratio the limit was derived from
    pub max_ratio: u32,
}

/// Running output budget for one decompression stream
#[derive(Debug, Clone)]
pub struct OutputGuard {
    /// Maximum number of bytes the stream may produce
    max_output_bytes: u64,

    /// Bytes reserved so far
    reserved: u64,

    /// Ratio used to derive the bound (reported back to the user)
    max_ratio: u32,
}

impl OutputGuard {
    /// Create a guard with an absolute byte bound
    pub fn new(max_output_bytes: u64) -> Self {
        Self {
            max_output_bytes,
            reserved: 0,
            max_ratio: 0,
        }
    }

    /// Create a guard bounding output to `max_ratio × input_len`
    pub fn from_ratio(input_len: u64, max_ratio: u32) -> Self {
        Self {
            max_output_bytes: input_len.saturating_mul(u64::from(max_ratio)),
            reserved: 0,
            max_ratio,
        }
    }

    /// Check that `total` bytes would fit, without reserving anything
    ///
    /// # Errors
    /// Returns `BombDetected` if `total` exceeds the bound
    pub fn ensure_within(&self, total: u64) -> Result<(), BombDetected> {
        if total > self.max_output_bytes {
            return Err(self.detected(total));
        }
        Ok(())
    }

    /// Reserve room for `additional_bytes` more output
    ///
    /// Must be called before the corresponding copy. A failed reservation
    /// leaves the running total untouched.
    ///
    /// # Errors
    /// Returns `BombDetected` if the running total would exceed the bound
    pub fn check_and_reserve(&mut self, additional_bytes: u64) -> Result<(), BombDetected> {
        let attempted = self.reserved.saturating_add(additional_bytes);
        if attempted > self.max_output_bytes {
            let err = self.detected(attempted);
            error!(
                limit = err.limit,
                attempted = err.attempted,
                "ZIP BOMB: output bound exceeded, aborting stream"
            );
            return Err(err);
        }
        self.reserved = attempted;
        Ok(())
    }

    /// Bytes reserved so far
    pub fn reserved(&self) -> u64 {
        self.reserved
    }

    /// Bytes still available under the bound
    pub fn remaining(&self) -> u64 {
        self.max_output_bytes - self.reserved
    }

    /// The absolute bound
    pub fn limit(&self) -> u64 {
        self.max_output_bytes
    }

    fn detected(&self, attempted: u64) -> BombDetected {
        BombDetected {
            limit: self.max_output_bytes,
            attempted,
            max_ratio: self.max_ratio,
        }
    }
}
