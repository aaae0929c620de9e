//! # romsampler-rust: adaptive incremental-SVD sampling for reduced-order models
//!
//! Builds a compact orthonormal basis of a high-dimensional state sequence
//! while a time-stepping simulation runs. The [`IncrementalSvdSampler`]
//! decides at each step whether the current basis still represents the
//! state well enough and, if not, how far the simulation may advance before
//! the next snapshot must be folded into the basis.
//!
//! The basis is piecewise in time: a new decomposition (time interval)
//! starts whenever the engine restarts accumulation. [`TimeIntervals`]
//! locates the interval owning a query time, both for the live sampler and
//! for the offline [`BasisReader`].

pub mod comm; // Process-group context (rank, size, all-reduce)
pub mod config; // Sampler options and TOML loading
pub mod database; // Structured basis / engine-state records
pub mod interval;
pub mod linalg; // Projection residuals and norms over partitioned vectors
pub mod reader;
pub mod sampler;
pub mod svd; // Incremental SVD engines (standard and fast-update)
pub mod writer;

// Re-export commonly used types and traits
pub use comm::{Communicator, SingleProcess, ThreadComm, ThreadGroup};
pub use config::{ConfigError, SamplerOptions};
pub use database::{
    BasisFileRecord, BasisFileRecordRef, DatabaseError, DatabaseFormat, IntervalCount,
    IntervalRecord, MatlabMatrixRecord, MatrixRecord, rank_file_name,
};
pub use interval::TimeIntervals;
pub use reader::BasisReader;
pub use sampler::{BasisSource, IncrementalSvdSampler};
pub use svd::{
    IncrementalSvd, IncrementalSvdFastUpdate, IncrementalSvdOptions, IncrementalSvdStandard,
    new_incremental_svd,
};
pub use writer::{BasisWriter, CountEncoding};

// Re-export external dependencies for convenience
pub use nalgebra::{DMatrix, DVector};
