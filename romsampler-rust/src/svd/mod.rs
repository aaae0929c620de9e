//! Incremental SVD engines
//!
//! An engine maintains a running low-rank decomposition `U · diag(S) · Wᵗ`
//! of the samples folded into the current time interval. Two variants share
//! one rank-one update algorithm and differ only in how `U` is kept:
//!
//! - [`IncrementalSvdStandard`]: rotates `U` in place on every sample
//! - [`IncrementalSvdFastUpdate`]: appends columns to `U` and accumulates the
//!   rotations in a small `Up`; the spatial basis `U · Up` is formed lazily
//!
//! The sampler selects a variant once through [`new_incremental_svd`] and only
//! talks to the [`IncrementalSvd`] trait afterwards.

mod common;
mod fast_update;
mod standard;

pub use fast_update::IncrementalSvdFastUpdate;
pub use standard::IncrementalSvdStandard;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::comm::Communicator;
use crate::database::{DatabaseError, DatabaseFormat, EngineStateRecord};
use crate::interval::TimeIntervals;

/// Common contract of the incremental SVD engines
pub trait IncrementalSvd {
    /// Number of rows of this rank's slice of the state
    fn dim(&self) -> usize;

    /// Samples folded into the current time interval
    fn num_samples(&self) -> usize;

    /// Number of basis columns
    fn rank(&self) -> usize;

    /// Fold `u` (this rank's slice) into the decomposition
    ///
    /// Collective: every rank must call this with the same `time` and
    /// `add_without_increase`.
    ///
    /// # Returns
    /// `false` if the sample was rejected (zero initial sample, or a
    /// linearly dependent sample while skipping those), `true` otherwise
    fn take_sample(
        &mut self,
        comm: &dyn Communicator,
        u: &[f64],
        time: f64,
        add_without_increase: bool,
    ) -> bool;

    /// Current spatial basis (`dim × rank`), valid until the next mutation
    fn spatial_basis(&mut self) -> &DMatrix<f64>;

    /// Current temporal basis, tracked only when right singular vectors are
    /// updated
    fn temporal_basis(&self) -> Option<&DMatrix<f64>>;

    /// Current singular values, descending
    fn singular_values(&self) -> &[f64];

    /// True if the next sample starts a new time interval
    fn is_new_time_interval(&self) -> bool;

    fn time_intervals(&self) -> &TimeIntervals;

    /// Snapshot for save/restore
    fn state_record(&mut self) -> EngineStateRecord;

    /// Write the engine state to its state file now
    fn save_state(&mut self) -> Result<(), DatabaseError>;
}

/// Construction inputs shared by both engine variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementalSvdOptions {
    pub dim: usize,
    pub linearity_tol: f64,
    pub skip_linearly_dependent: bool,
    pub max_basis_dimension: usize,
    pub samples_per_time_interval: usize,
    pub basis_file_name: Option<String>,
    pub save_state: bool,
    pub restore_state: bool,
    pub update_right_sv: bool,
    pub debug_algorithm: bool,
    pub format: DatabaseFormat,
}

impl IncrementalSvdOptions {
    /// Options for a `dim`-row slice with everything else at its default
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            linearity_tol: 1e-7,
            skip_linearly_dependent: false,
            max_basis_dimension: usize::MAX,
            samples_per_time_interval: usize::MAX,
            basis_file_name: None,
            save_state: false,
            restore_state: false,
            update_right_sv: false,
            debug_algorithm: false,
            format: DatabaseFormat::Binary,
        }
    }

    /// First violated construction precondition, if any
    pub fn precondition_violation(&self) -> Option<String> {
        let checks = [
            (self.dim > 0, "dim must be positive"),
            (self.linearity_tol > 0.0, "linearity_tol must be positive"),
            (self.max_basis_dimension > 0, "max_basis_dimension must be positive"),
            (
                self.samples_per_time_interval > 0,
                "samples_per_time_interval must be positive",
            ),
            (
                !(self.save_state || self.restore_state)
                    || self.basis_file_name.as_deref().is_some_and(|name| !name.is_empty()),
                "save/restore of engine state requires a non-empty basis file name",
            ),
        ];
        checks
            .iter()
            .find(|(ok, _)| !ok)
            .map(|(_, msg)| msg.to_string())
    }

    /// Assert the construction preconditions
    ///
    /// # Panics
    /// Panics on the first violated precondition
    pub fn validate(&self) {
        if let Some(msg) = self.precondition_violation() {
            panic!("{}", msg);
        }
    }

    /// Name of this rank's engine state file
    pub(crate) fn state_file_name(&self, rank: usize) -> Option<String> {
        self.basis_file_name
            .as_deref()
            .map(|base| crate::database::rank_file_name(&format!("{}.state", base), rank))
    }
}

/// Create an engine, selecting the fast-update variant when `fast_update`
///
/// Restores the saved state first when `options.restore_state` is set.
pub fn new_incremental_svd(
    options: IncrementalSvdOptions,
    fast_update: bool,
    comm: &dyn Communicator,
) -> Result<Box<dyn IncrementalSvd>, DatabaseError> {
    if fast_update {
        Ok(Box::new(IncrementalSvdFastUpdate::new(options, comm)?))
    } else {
        Ok(Box::new(IncrementalSvdStandard::new(options, comm)?))
    }
}
