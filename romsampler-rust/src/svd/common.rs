//! Rank-one update shared by both engine variants
//!
//! Given the current basis `U`, singular values `S` and a new sample `u`:
//!
//! ```text
//! l = Uᵗu,  j = u − U·l,  k = ‖j‖
//! Q = [ diag(S)  l ]  = A · diag(Σ) · Bᵗ
//!     [   0      k ]
//! ```
//!
//! The variants differ only in how they apply the left rotation `A` to `U`,
//! so [`SvdCore::fold`] updates everything else and hands back a
//! [`SampleUpdate`] describing what must happen to `U`.

use log::{debug, info};
use nalgebra::{DMatrix, DVector};

use super::IncrementalSvdOptions;
use crate::comm::Communicator;
use crate::database::{self, DatabaseError, EngineStateRecord, MatrixRecord};
use crate::interval::TimeIntervals;
use crate::linalg::{global_dot, global_norm, ordered_svd, transpose_mult};

/// What the variant must do to its left singular vectors
pub(crate) enum SampleUpdate {
    /// Sample rejected, nothing changes
    Rejected,
    /// First sample of a new interval: `U = [u/‖u‖]`
    Initial(DMatrix<f64>),
    /// Rank unchanged: `U ← U · A` with `A` of size `r × r`
    SameRank(DMatrix<f64>),
    /// New direction: `U ← [U, j] · A` with `j` normalized and `A` of size
    /// `(r+1) × r'`, where `r'` is `r + 1`, or `r` when the rank is capped
    NewColumn(DVector<f64>, DMatrix<f64>),
}

/// State shared by both variants: singular values, right singular vectors
/// and interval bookkeeping
pub(crate) struct SvdCore {
    pub options: IncrementalSvdOptions,
    pub process_rank: usize,
    pub s: Vec<f64>,
    pub w: Option<DMatrix<f64>>,
    pub num_samples: usize,
    pub intervals: TimeIntervals,
}

impl SvdCore {
    pub fn new(options: IncrementalSvdOptions, comm: &dyn Communicator) -> Self {
        options.validate();
        Self {
            options,
            process_rank: comm.rank(),
            s: Vec::new(),
            w: None,
            num_samples: 0,
            intervals: TimeIntervals::new(),
        }
    }

    pub fn is_new_time_interval(&self) -> bool {
        self.num_samples == 0 || self.num_samples >= self.options.samples_per_time_interval
    }

    /// Update `S`, `W` and the counters for sample `u`
    pub fn fold(
        &mut self,
        comm: &dyn Communicator,
        basis: &DMatrix<f64>,
        u: &DVector<f64>,
        time: f64,
        add_without_increase: bool,
    ) -> SampleUpdate {
        if self.is_new_time_interval() {
            return self.start_interval(comm, u, time);
        }

        let r = self.s.len();
        let l = transpose_mult(comm, basis, u);
        let j = u - basis * &l;
        let mut k = global_norm(comm, &j);

        let linearly_dependent = k < self.options.linearity_tol;
        if linearly_dependent {
            if self.options.skip_linearly_dependent {
                debug!("Skipping linearly dependent sample at t = {} (k = {:e})", time, k);
                return SampleUpdate::Rejected;
            }
            k = 0.0;
        }

        let mut q = DMatrix::<f64>::zeros(r + 1, r + 1);
        for i in 0..r {
            q[(i, i)] = self.s[i];
            q[(i, r)] = l[i];
        }
        q[(r, r)] = k;
        let (a, sigma, b) = ordered_svd(&q);

        // Dependent samples rotate the existing basis; otherwise the new
        // direction is added and, when the rank may not grow, the weakest
        // singular triple is dropped.
        let truncate =
            add_without_increase || r >= self.options.max_basis_dimension;
        let keep = if linearly_dependent || truncate { r } else { r + 1 };

        if let Some(w) = &self.w {
            let n = w.nrows();
            let mut extended = DMatrix::<f64>::zeros(n + 1, r + 1);
            extended.view_mut((0, 0), (n, r)).copy_from(w);
            extended[(n, r)] = 1.0;
            let rotated = extended * &b;
            self.w = Some(rotated.columns(0, keep).into_owned());
        }
        self.num_samples += 1;

        if self.options.debug_algorithm {
            debug!(
                "Sample {} at t = {}: k = {:e}, sigma = {:?}, rank {} -> {}",
                self.num_samples, time, k, sigma, r, keep
            );
        }

        self.s = sigma[..keep].to_vec();
        if linearly_dependent {
            SampleUpdate::SameRank(a.view((0, 0), (r, r)).into_owned())
        } else {
            SampleUpdate::NewColumn(j / k, a.columns(0, keep).into_owned())
        }
    }

    fn start_interval(&mut self, comm: &dyn Communicator, u: &DVector<f64>, time: f64) -> SampleUpdate {
        let norm = global_norm(comm, u);
        if norm == 0.0 {
            debug!("Rejecting zero initial sample at t = {}", time);
            return SampleUpdate::Rejected;
        }
        self.intervals.push(time);
        info!(
            "Starting time interval {} at t = {}",
            self.intervals.len() - 1,
            time
        );
        self.s = vec![norm];
        self.w = self
            .options
            .update_right_sv
            .then(|| DMatrix::from_element(1, 1, 1.0));
        self.num_samples = 1;
        SampleUpdate::Initial(DMatrix::from_column_slice(u.len(), 1, (u / norm).as_slice()))
    }

    /// True if the first and last columns of `m` are no longer orthogonal
    pub fn lost_orthogonality(&self, comm: &dyn Communicator, m: &DMatrix<f64>) -> bool {
        let r = m.ncols();
        if r < 2 {
            return false;
        }
        let first = m.column(0).into_owned();
        let last = m.column(r - 1).into_owned();
        let tol = f64::EPSILON * self.options.dim as f64;
        global_dot(comm, &first, &last).abs() > tol
    }

    /// Record the shared part of the engine state
    pub fn state_record(&self, u: &DMatrix<f64>, up: Option<&DMatrix<f64>>) -> EngineStateRecord {
        EngineStateRecord {
            dim: self.options.dim,
            num_samples: self.num_samples,
            u: MatrixRecord::from_matrix(u),
            up: up.map(MatrixRecord::from_matrix),
            singular_values: self.s.clone(),
            w: self.w.as_ref().map(MatrixRecord::from_matrix),
            start_times: self.intervals.start_times().to_vec(),
        }
    }

    /// Load the saved state, if restoring was requested
    ///
    /// # Panics
    /// Panics if the saved state was written for a different dimension
    pub fn restore(&mut self) -> Result<Option<EngineStateRecord>, DatabaseError> {
        if !self.options.restore_state {
            return Ok(None);
        }
        let Some(path) = self.options.state_file_name(self.process_rank) else {
            return Ok(None);
        };
        let record: EngineStateRecord =
            database::read_record(std::path::Path::new(&path), self.options.format)?;
        assert_eq!(
            record.dim, self.options.dim,
            "Restored engine state has dim {} but the engine has dim {}",
            record.dim, self.options.dim
        );
        database::check_start_times(&record.start_times)?;
        self.num_samples = record.num_samples;
        self.s = record.singular_values.clone();
        self.w = record.w.as_ref().map(MatrixRecord::to_matrix);
        self.intervals = TimeIntervals::from_start_times(record.start_times.clone());
        info!("Restored engine state from {} ({} samples)", path, self.num_samples);
        Ok(Some(record))
    }

    /// Write `record` to the state file, if saving was requested
    pub fn save(&self, record: &EngineStateRecord) -> Result<(), DatabaseError> {
        if !self.options.save_state {
            return Ok(());
        }
        let Some(path) = self.options.state_file_name(self.process_rank) else {
            return Ok(());
        };
        database::write_record(std::path::Path::new(&path), self.options.format, record)?;
        info!("Saved engine state to {}", path);
        Ok(())
    }
}

/// Check a raw slice against the engine dimension and copy it
pub(crate) fn sample_vector(options: &IncrementalSvdOptions, u: &[f64], time: f64) -> DVector<f64> {
    assert_eq!(
        u.len(),
        options.dim,
        "Sample length ({}) must match dim ({})",
        u.len(),
        options.dim
    );
    assert!(time >= 0.0, "Sample time must be non-negative, got {}", time);
    DVector::from_column_slice(u)
}
