//! Utility functions and helpers for the block pipeline

use crate::error::PipelineError;
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// Utility for timing operations
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    /// Create and start a new stopwatch
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Stop the stopwatch and return elapsed time
    pub fn stop(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Logging and tracing utilities
pub trait LogExt {
    /// Log an error with context
    fn log_error(&self, context: &str);

    /// Log a warning
    fn log_warning(&self, message: &str);
}

impl<T> LogExt for Result<T, PipelineError> {
    fn log_error(&self, context: &str) {
        if let Err(e) = self {
            error!(context, error = %e, "operation failed");
        }
    }

    fn log_warning(&self, message: &str) {
        if let Err(e) = self {
            warn!(error = %e, "{}", message);
        }
    }
}
