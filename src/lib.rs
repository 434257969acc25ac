//! Accelerator block pipeline
//!
//! Streams data through a block transform accelerator: the input is split
//! into fixed-size blocks, staged through a bounded pool of transfer
//! buffers, submitted across the accelerator's lanes and collected back in
//! order, with per-block checksums folded into a stream checksum and a
//! guard bounding decompressed output.

// Expose public modules
pub mod checksum;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod guard;
pub mod pipeline;
pub mod planner;
pub mod transfer;
pub mod utils;

// Prelude for convenient imports
pub mod prelude {
    pub use crate::checksum::{Checksum, ChecksumKind};
    pub use crate::config::{BlockSize, PipelineConfig, RawStorePolicy};
    pub use crate::device::{
        Accelerator, BlockCodec, Direction, InlineAccelerator, LaneAccelerator, PassthroughCodec,
        RunLengthCodec,
    };
    pub use crate::error::{ErrorExt, PipelineError, PipelineResult};
    pub use crate::guard::{BombDetected, OutputGuard};
    pub use crate::pipeline::{PipelineMetrics, PipelineScheduler, StreamOutput, StreamReport};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
