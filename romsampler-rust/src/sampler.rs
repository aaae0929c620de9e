//! Adaptive sampling controller
//!
//! [`IncrementalSvdSampler`] wraps an incremental SVD engine and decides
//! when the next snapshot must be taken. At each call of
//! [`compute_next_sample_time`](IncrementalSvdSampler::compute_next_sample_time)
//! the state and its time derivative are projected onto the current basis,
//! the residuals are extrapolated over the current step,
//!
//! ```text
//! err    = max_i | eta_i + dt · eta_dot_i |      (max over all ranks)
//! factor = clamp(step_scale · sqrt(tol / err), min_step_scale, max_step_scale)
//! dt     = clamp(dt · factor, 0, max_time_between_samples)
//! ```
//!
//! and the next sample is due at `time + dt`.

use log::{Level, debug, log};
use nalgebra::{DMatrix, DVector};

use crate::comm::Communicator;
use crate::config::SamplerOptions;
use crate::database::DatabaseError;
use crate::linalg::{global_norm, linf_norm, project_residual};
use crate::svd::{IncrementalSvd, new_incremental_svd};
use crate::writer::BasisWriter;

/// Time-indexed access to a piecewise basis
///
/// Returned borrows are valid until the next call on the same source.
pub trait BasisSource {
    /// Spatial basis (`dim × rank`) valid at `time`
    fn spatial_basis(&mut self, time: f64) -> &DMatrix<f64>;

    /// Temporal basis valid at `time`, if one is available
    fn temporal_basis(&mut self, time: f64) -> Option<&DMatrix<f64>>;

    /// Singular values valid at `time`, as a square diagonal matrix
    fn singular_values(&mut self, time: f64) -> &DMatrix<f64>;
}

/// Incremental SVD sampler with adaptive step control
pub struct IncrementalSvdSampler {
    svd: Box<dyn IncrementalSvd>,
    tol: f64,
    max_time_between_samples: f64,
    min_step_scale: f64,
    step_scale: f64,
    max_step_scale: f64,
    dt: f64,
    next_sample_time: f64,
    update_right_sv: bool,
    num_procs: usize,
    process_rank: usize,
    debug_algorithm: bool,
    writer: Option<BasisWriter>,
    singular_values: DMatrix<f64>,
}

impl IncrementalSvdSampler {
    /// Create a sampler and its engine
    ///
    /// The process count and rank are read from `comm` once and cached.
    /// When `options.basis_file_name` is set, finished intervals are written
    /// to that base name suffixed with this process's rank.
    ///
    /// # Panics
    /// Panics if `options` violates a construction precondition
    ///
    /// # Errors
    /// Returns an error if restoring the engine state fails
    pub fn new(options: &SamplerOptions, comm: &dyn Communicator) -> Result<Self, DatabaseError> {
        options.validate();
        let svd = new_incremental_svd(options.svd_options(), options.fast_update, comm)?;
        let process_rank = comm.rank();
        let writer = options
            .basis_file_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(|name| BasisWriter::new(name, options.format, process_rank));

        debug!(
            "Sampler on rank {} of {}: dim = {}, fast_update = {}, initial_dt = {}",
            process_rank,
            comm.size(),
            options.dim,
            options.fast_update,
            options.initial_dt
        );

        Ok(Self {
            svd,
            tol: options.sampling_tol,
            max_time_between_samples: options.max_time_between_samples,
            min_step_scale: options.min_step_scale,
            step_scale: options.step_scale,
            max_step_scale: options.max_step_scale,
            dt: options.initial_dt,
            next_sample_time: 0.0,
            update_right_sv: options.update_right_sv,
            num_procs: comm.size(),
            process_rank,
            debug_algorithm: options.debug_algorithm,
            writer,
            singular_values: DMatrix::zeros(0, 0),
        })
    }

    /// Replace the basis writer, e.g. to store a legacy interval count
    pub fn with_basis_writer(mut self, writer: BasisWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    /// True if a sample should be taken at `time`
    pub fn is_next_sample(&self, time: f64) -> bool {
        self.update_right_sv || time >= self.next_sample_time
    }

    /// Estimate the representation error and schedule the next sample
    ///
    /// Collective: every rank must call this the same number of times, in
    /// the same order, with a communicator of the group the sampler was
    /// created on.
    ///
    /// # Returns
    /// The time at which the next sample is due. An all-zero state leaves
    /// the schedule untouched and returns the previous value.
    ///
    /// # Panics
    /// Panics if either slice does not have the engine dimension, `time` is
    /// negative, or `comm` has a different size than at construction
    pub fn compute_next_sample_time(
        &mut self,
        comm: &dyn Communicator,
        state: &[f64],
        state_dot: &[f64],
        time: f64,
    ) -> f64 {
        let dim = self.svd.dim();
        assert_eq!(
            state.len(),
            dim,
            "State length ({}) must match dim ({})",
            state.len(),
            dim
        );
        assert_eq!(
            state_dot.len(),
            dim,
            "State derivative length ({}) must match dim ({})",
            state_dot.len(),
            dim
        );
        assert!(time >= 0.0, "Time must be non-negative, got {}", time);
        assert_eq!(
            comm.size(),
            self.num_procs,
            "Communicator size ({}) differs from the size at construction ({})",
            comm.size(),
            self.num_procs
        );

        let u = DVector::from_column_slice(state);
        if global_norm(comm, &u) == 0.0 {
            debug!("Zero state at t = {}; keeping next sample time {}", time, self.next_sample_time);
            return self.next_sample_time;
        }
        let u_dot = DVector::from_column_slice(state_dot);

        let basis = self.svd.spatial_basis();
        let eta = project_residual(comm, basis, &u);
        let eta_dot = project_residual(comm, basis, &u_dot);

        let local_err = linf_norm(&(eta + eta_dot * self.dt));
        let global_err = if self.num_procs > 1 {
            comm.all_reduce_max(local_err)
        } else {
            local_err
        };

        let factor = self.step_factor(global_err);
        let previous_dt = self.dt;
        self.dt = (self.dt * factor).clamp(0.0, self.max_time_between_samples);
        self.next_sample_time = time + self.dt;

        let level = if self.debug_algorithm {
            Level::Info
        } else {
            Level::Debug
        };
        log!(
            level,
            "t = {}: err = {:e}, factor = {}, dt {} -> {}, next sample at {}",
            time,
            global_err,
            factor,
            previous_dt,
            self.dt,
            self.next_sample_time
        );
        self.next_sample_time
    }

    fn step_factor(&self, err: f64) -> f64 {
        let factor = self.step_scale * (self.tol / err).sqrt();
        if factor < self.min_step_scale {
            self.min_step_scale
        } else if factor > self.max_step_scale {
            self.max_step_scale
        } else {
            factor
        }
    }

    /// Overwrite the current step size; the next sample time is kept until
    /// the next [`compute_next_sample_time`](Self::compute_next_sample_time)
    pub fn reset_dt(&mut self, new_dt: f64) {
        self.dt = new_dt;
    }

    /// Fold `u` into the basis
    ///
    /// When the engine is about to start a new time interval and a writer is
    /// attached, the finished interval is written first.
    ///
    /// # Returns
    /// `false` if the engine rejected the sample
    ///
    /// # Errors
    /// Returns an error if writing the finished interval fails
    pub fn take_sample(
        &mut self,
        comm: &dyn Communicator,
        u: &[f64],
        time: f64,
        add_without_increase: bool,
    ) -> Result<bool, DatabaseError> {
        if self.svd.is_new_time_interval() && self.svd.num_samples() > 0 {
            self.write_current_interval()?;
        }
        Ok(self.svd.take_sample(comm, u, time, add_without_increase))
    }

    /// Write the interval in progress
    ///
    /// Does nothing without a writer or before the first sample.
    pub fn end_samples(&mut self) -> Result<(), DatabaseError> {
        if self.svd.num_samples() > 0 {
            self.write_current_interval()?;
        }
        Ok(())
    }

    fn write_current_interval(&mut self) -> Result<(), DatabaseError> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        let Some(&start_time) = self.svd.time_intervals().start_times().last() else {
            return Ok(());
        };
        let singular_values = self.svd.singular_values().to_vec();
        let temporal = self.svd.temporal_basis().cloned();
        let spatial = self.svd.spatial_basis();
        writer.write_basis(start_time, spatial, temporal.as_ref(), &singular_values)
    }

    pub fn current_dt(&self) -> f64 {
        self.dt
    }

    pub fn next_sample_time(&self) -> f64 {
        self.next_sample_time
    }

    /// Process count cached at construction
    pub fn num_procs(&self) -> usize {
        self.num_procs
    }

    pub fn process_rank(&self) -> usize {
        self.process_rank
    }

    /// The underlying engine
    pub fn svd(&self) -> &dyn IncrementalSvd {
        self.svd.as_ref()
    }

    pub fn basis_writer(&self) -> Option<&BasisWriter> {
        self.writer.as_ref()
    }
}

impl BasisSource for IncrementalSvdSampler {
    /// The engine's current basis; the engine only holds its latest interval
    fn spatial_basis(&mut self, time: f64) -> &DMatrix<f64> {
        assert!(time >= 0.0, "Query time must be non-negative, got {}", time);
        self.svd.spatial_basis()
    }

    fn temporal_basis(&mut self, time: f64) -> Option<&DMatrix<f64>> {
        assert!(time >= 0.0, "Query time must be non-negative, got {}", time);
        self.svd.temporal_basis()
    }

    fn singular_values(&mut self, time: f64) -> &DMatrix<f64> {
        assert!(time >= 0.0, "Query time must be non-negative, got {}", time);
        let sv = DVector::from_column_slice(self.svd.singular_values());
        self.singular_values = DMatrix::from_diagonal(&sv);
        &self.singular_values
    }
}

#[cfg(test)]
#[path = "sampler_tests.rs"]
mod sampler_tests;
