//! Block pipeline: scheduling, draining and whole-stream operations
//!
//! A stream is planned into fixed-size blocks, each block is staged into a
//! pooled transfer buffer and submitted to one of the accelerator's lanes,
//! and completed blocks are drained into a sink. Compression drains through
//! a `FramedSink` in strict block order; decompression drains through a
//! `RegionSink` where every block owns a disjoint output region.

mod lane;
mod metrics;
mod scheduler;
mod sink;
mod stream;

pub use metrics::PipelineMetrics;
pub use scheduler::{PipelineScheduler, Route, RunSummary, WorkItem};
pub use sink::{BlockSink, FramedSink, OutputOrdering, RegionSink};
pub use stream::{StreamOutput, StreamReport};
