//! Incremental SVD with deferred basis rotation
//!
//! The spatial basis is stored factored as `U · Up`: new orthonormal
//! directions are appended to `U` and every left rotation is applied to the
//! small `r × r` matrix `Up` only. The product is formed on demand and
//! cached until the next sample.

use log::{debug, warn};
use nalgebra::DMatrix;

use super::common::{sample_vector, SampleUpdate, SvdCore};
use super::{IncrementalSvd, IncrementalSvdOptions};
use crate::comm::Communicator;
use crate::database::{DatabaseError, EngineStateRecord, MatrixRecord};
use crate::interval::TimeIntervals;
use crate::linalg::orthogonalize;

/// Incremental SVD keeping the basis factored as `U · Up`
pub struct IncrementalSvdFastUpdate {
    core: SvdCore,
    u: DMatrix<f64>,
    up: DMatrix<f64>,
    basis: Option<DMatrix<f64>>,
}

impl IncrementalSvdFastUpdate {
    /// Create an engine, restoring saved state when requested
    ///
    /// # Panics
    /// Panics if `options` violates a construction precondition
    pub fn new(options: IncrementalSvdOptions, comm: &dyn Communicator) -> Result<Self, DatabaseError> {
        let mut core = SvdCore::new(options, comm);
        let (u, up) = match core.restore()? {
            Some(record) => {
                let u = record.u.to_matrix();
                let up = record
                    .up
                    .as_ref()
                    .map(MatrixRecord::to_matrix)
                    .unwrap_or_else(|| DMatrix::identity(u.ncols(), u.ncols()));
                (u, up)
            }
            None => (DMatrix::zeros(core.options.dim, 0), DMatrix::zeros(0, 0)),
        };
        Ok(Self {
            core,
            u,
            up,
            basis: None,
        })
    }

    /// Fold `Up` into `U` and re-orthonormalize
    fn flatten(&mut self, comm: &dyn Communicator) {
        let mut basis = &self.u * &self.up;
        orthogonalize(comm, &mut basis);
        let r = basis.ncols();
        self.u = basis;
        self.up = DMatrix::identity(r, r);
    }

    fn up_lost_orthogonality(&self) -> bool {
        let r = self.up.ncols();
        let gram = self.up.tr_mul(&self.up);
        let deviation = (gram - DMatrix::<f64>::identity(r, r)).amax();
        deviation > 1e3 * f64::EPSILON * r as f64
    }
}

impl IncrementalSvd for IncrementalSvdFastUpdate {
    fn dim(&self) -> usize {
        self.core.options.dim
    }

    fn num_samples(&self) -> usize {
        self.core.num_samples
    }

    fn rank(&self) -> usize {
        self.up.ncols()
    }

    fn take_sample(
        &mut self,
        comm: &dyn Communicator,
        u: &[f64],
        time: f64,
        add_without_increase: bool,
    ) -> bool {
        let sample = sample_vector(&self.core.options, u, time);
        let basis = match self.basis.take() {
            Some(b) => b,
            None => &self.u * &self.up,
        };
        match self
            .core
            .fold(comm, &basis, &sample, time, add_without_increase)
        {
            SampleUpdate::Rejected => {
                self.basis = Some(basis);
                return false;
            }
            SampleUpdate::Initial(u0) => {
                self.u = u0;
                self.up = DMatrix::identity(1, 1);
            }
            SampleUpdate::SameRank(a) => self.up = &self.up * a,
            SampleUpdate::NewColumn(j, a) => {
                let r = self.u.ncols();
                let mut u = self.u.clone().insert_column(r, 0.0);
                u.set_column(r, &j);
                self.u = u;

                let (p, q) = self.up.shape();
                let mut up = DMatrix::<f64>::zeros(p + 1, q + 1);
                up.view_mut((0, 0), (p, q)).copy_from(&self.up);
                up[(p, q)] = 1.0;
                self.up = up * a;
            }
        }

        if self.u.ncols() > self.up.ncols()
            || self.core.lost_orthogonality(comm, &self.u)
            || self.up_lost_orthogonality()
        {
            debug!("Re-orthogonalizing factored basis at t = {}", time);
            self.flatten(comm);
        }
        true
    }

    fn spatial_basis(&mut self) -> &DMatrix<f64> {
        let (u, up) = (&self.u, &self.up);
        self.basis.get_or_insert_with(|| u * up)
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
        self.core.state_record(&self.u, Some(&self.up))
    }

    fn save_state(&mut self) -> Result<(), DatabaseError> {
        let record = self.state_record();
        self.core.save(&record)
    }
}

impl Drop for IncrementalSvdFastUpdate {
    fn drop(&mut self) {
        if self.core.options.save_state {
            if let Err(e) = self.save_state() {
                warn!("Failed to save engine state: {}", e);
            }
        }
    }
}
