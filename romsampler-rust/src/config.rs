//! Sampler configuration
//!
//! [`SamplerOptions`] gathers every construction input of the sampler. It
//! can be built in code or loaded from TOML. Loading only parses; the
//! numeric preconditions are asserted when the sampler is constructed.
//!
//! ```toml
//! dim = 1000
//! fast_update = true
//! initial_dt = 1e-3
//! sampling_tol = 1e-4
//! max_time_between_samples = 0.1
//! basis_file_name = "run/basis"
//! format = "json"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::database::DatabaseFormat;
use crate::svd::IncrementalSvdOptions;

/// Error types for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid sampler config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Construction inputs of [`IncrementalSvdSampler`](crate::IncrementalSvdSampler)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerOptions {
    /// Rows of this rank's slice of the state
    pub dim: usize,
    /// Residual norm below which a sample counts as linearly dependent
    pub linearity_tol: f64,
    pub skip_linearly_dependent: bool,
    /// Select the fast-update engine variant
    pub fast_update: bool,
    pub max_basis_dimension: usize,
    /// Initial sampling step size
    pub initial_dt: f64,
    pub samples_per_time_interval: usize,
    /// Target worst-case representation error
    pub sampling_tol: f64,
    pub max_time_between_samples: f64,
    /// Base name for basis and engine state files
    pub basis_file_name: Option<String>,
    pub save_state: bool,
    pub restore_state: bool,
    /// Track right singular vectors; also makes every step a sample step
    pub update_right_sv: bool,
    pub min_step_scale: f64,
    pub step_scale: f64,
    pub max_step_scale: f64,
    pub debug_algorithm: bool,
    pub format: DatabaseFormat,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            dim: 0,
            linearity_tol: 1e-7,
            skip_linearly_dependent: false,
            fast_update: false,
            max_basis_dimension: usize::MAX,
            initial_dt: 1e-3,
            samples_per_time_interval: usize::MAX,
            sampling_tol: 1e-3,
            max_time_between_samples: f64::MAX,
            basis_file_name: None,
            save_state: false,
            restore_state: false,
            update_right_sv: false,
            min_step_scale: 0.1,
            step_scale: 0.8,
            max_step_scale: 5.0,
            debug_algorithm: false,
            format: DatabaseFormat::Binary,
        }
    }
}

impl SamplerOptions {
    /// Defaults for a `dim`-row slice
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ..Self::default()
        }
    }

    /// Parse options from a TOML document; missing keys take defaults
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_initial_dt(mut self, initial_dt: f64) -> Self {
        self.initial_dt = initial_dt;
        self
    }

    pub fn with_sampling_tol(mut self, sampling_tol: f64) -> Self {
        self.sampling_tol = sampling_tol;
        self
    }

    pub fn with_max_time_between_samples(mut self, max_time: f64) -> Self {
        self.max_time_between_samples = max_time;
        self
    }

    /// Set `min_step_scale`, `step_scale` and `max_step_scale`
    pub fn with_step_scales(mut self, min: f64, target: f64, max: f64) -> Self {
        self.min_step_scale = min;
        self.step_scale = target;
        self.max_step_scale = max;
        self
    }

    pub fn with_fast_update(mut self, fast_update: bool) -> Self {
        self.fast_update = fast_update;
        self
    }

    pub fn with_update_right_sv(mut self, update_right_sv: bool) -> Self {
        self.update_right_sv = update_right_sv;
        self
    }

    pub fn with_basis_file_name(mut self, name: impl Into<String>) -> Self {
        self.basis_file_name = Some(name.into());
        self
    }

    pub fn with_samples_per_time_interval(mut self, samples: usize) -> Self {
        self.samples_per_time_interval = samples;
        self
    }

    pub fn with_format(mut self, format: DatabaseFormat) -> Self {
        self.format = format;
        self
    }

    /// First violated construction precondition, if any
    pub fn precondition_violation(&self) -> Option<String> {
        let checks = [
            (self.initial_dt > 0.0, "initial_dt must be positive"),
            (self.sampling_tol > 0.0, "sampling_tol must be positive"),
            (
                self.max_time_between_samples > 0.0,
                "max_time_between_samples must be positive",
            ),
            (self.min_step_scale >= 0.0, "min_step_scale must be non-negative"),
            (self.step_scale >= 0.0, "step_scale must be non-negative"),
            (self.max_step_scale >= 0.0, "max_step_scale must be non-negative"),
        ];
        if let Some((_, msg)) = checks.iter().find(|(ok, _)| !ok) {
            return Some(msg.to_string());
        }
        if self.min_step_scale > self.max_step_scale {
            return Some(format!(
                "min_step_scale ({}) must not exceed max_step_scale ({})",
                self.min_step_scale, self.max_step_scale
            ));
        }
        self.svd_options().precondition_violation()
    }

    /// Assert the construction preconditions of the sampler and its engine
    ///
    /// # Panics
    /// Panics on the first violated precondition
    pub fn validate(&self) {
        if let Some(msg) = self.precondition_violation() {
            panic!("{}", msg);
        }
    }

    /// Engine options derived from these sampler options
    pub fn svd_options(&self) -> IncrementalSvdOptions {
        IncrementalSvdOptions {
            dim: self.dim,
            linearity_tol: self.linearity_tol,
            skip_linearly_dependent: self.skip_linearly_dependent,
            max_basis_dimension: self.max_basis_dimension,
            samples_per_time_interval: self.samples_per_time_interval,
            basis_file_name: self.basis_file_name.clone(),
            save_state: self.save_state,
            restore_state: self.restore_state,
            update_right_sv: self.update_right_sv,
            debug_algorithm: self.debug_algorithm,
            format: self.format,
        }
    }
}
