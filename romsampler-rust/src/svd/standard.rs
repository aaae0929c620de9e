//! Incremental SVD that rotates the spatial basis on every sample

use log::warn;
use nalgebra::DMatrix;

use super::common::{sample_vector, SampleUpdate, SvdCore};
use super::{IncrementalSvd, IncrementalSvdOptions};
use crate::comm::Communicator;
use crate::database::{DatabaseError, EngineStateRecord};
use crate::interval::TimeIntervals;
use crate::linalg::orthogonalize;

/// Incremental SVD keeping `U` explicitly up to date
///
/// Each sample costs one `dim × r × r` product. Prefer
/// [`IncrementalSvdFastUpdate`](super::IncrementalSvdFastUpdate) when
/// samples are frequent and the basis is read rarely.
pub struct IncrementalSvdStandard {
    core: SvdCore,
    u: DMatrix<f64>,
}

impl IncrementalSvdStandard {
    /// Create an engine, restoring saved state when requested
    ///
    /// # Panics
    /// Panics if `options` violates a construction precondition
    pub fn new(options: IncrementalSvdOptions, comm: &dyn Communicator) -> Result<Self, DatabaseError> {
        let mut core = SvdCore::new(options, comm);
        let u = match core.restore()? {
            // A fast-update engine saves its basis factored as U · Up
            Some(record) => match &record.up {
                Some(up) => record.u.to_matrix() * up.to_matrix(),
                None => record.u.to_matrix(),
            },
            None => DMatrix::zeros(core.options.dim, 0),
        };
        Ok(Self { core, u })
    }
}

impl IncrementalSvd for IncrementalSvdStandard {
    fn dim(&self) -> usize {
        self.core.options.dim
    }

    fn num_samples(&self) -> usize {
        self.core.num_samples
    }

    fn rank(&self) -> usize {
        self.u.ncols()
    }

    fn take_sample(
        &mut self,
        comm: &dyn Communicator,
        u: &[f64],
        time: f64,
        add_without_increase: bool,
    ) -> bool {
        let sample = sample_vector(&self.core.options, u, time);
        match self
            .core
            .fold(comm, &self.u, &sample, time, add_without_increase)
        {
            SampleUpdate::Rejected => return false,
            SampleUpdate::Initial(u0) => self.u = u0,
            SampleUpdate::SameRank(a) => self.u = &self.u * a,
            SampleUpdate::NewColumn(j, a) => {
                let r = self.u.ncols();
                let mut extended = self.u.clone().insert_column(r, 0.0);
                extended.set_column(r, &j);
                self.u = extended * a;
            }
        }

        if self.core.lost_orthogonality(comm, &self.u) {
            orthogonalize(comm, &mut self.u);
        }
        true
    }

    fn spatial_basis(&mut self) -> &DMatrix<f64> {
        &self.u
    }

    fn temporal_basis(&self) -> Option<&DMatrix<f64>> {
        self.core.w.as_ref()
    }

    fn singular_values(&self) -> &[f64] {
        &self.core.s
    }

    fn is_new_time_interval(&self) -> bool {
        self.core.is_new_time_interval()
    }

    fn time_intervals(&self) -> &TimeIntervals {
        &self.core.intervals
    }

    fn state_record(&mut self) -> EngineStateRecord {
        self.core.state_record(&self.u, None)
    }

    fn save_state(&mut self) -> Result<(), DatabaseError> {
        let record = self.state_record();
        self.core.save(&record)
    }
}

impl Drop for IncrementalSvdStandard {
    fn drop(&mut self) {
        if self.core.options.save_state {
            if let Err(e) = self.save_state() {
                warn!("Failed to save engine state: {}", e);
            }
        }
    }
}

