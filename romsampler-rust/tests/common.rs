//! Common test utilities

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use romsampler_rust::DMatrix;

/// Simple deterministic pseudo-random number generator (LCG)
///
/// Uses the Numerical Recipes parameters: a = 1664525, c = 1013904223
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        self.state = self.state.wrapping_mul(1664525).wrapping_add(1013904223);
        ((self.state >> 16) as f64) / ((1u64 << 48) as f64)
    }

    /// Next value in [-1, 1)
    pub fn next_signed(&mut self) -> f64 {
        2.0 * self.next_f64() - 1.0
    }

    pub fn vector(&mut self, len: usize) -> Vec<f64> {
        (0..len).map(|_| self.next_signed()).collect()
    }

    pub fn matrix(&mut self, rows: usize, cols: usize) -> DMatrix<f64> {
        DMatrix::from_fn(rows, cols, |_, _| self.next_signed())
    }
}

static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Base file name unique to this process and call, under the temp directory
pub fn temp_base(tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path: PathBuf =
        std::env::temp_dir().join(format!("romsampler_{}_{}_{}", tag, std::process::id(), n));
    path.to_string_lossy().into_owned()
}

/// Remove `base` suffixed with each rank in `0..ranks`
pub fn remove_rank_files(base: &str, ranks: usize) {
    for rank in 0..ranks {
        std::fs::remove_file(romsampler_rust::rank_file_name(base, rank)).ok();
    }
}

/// Largest absolute entry of `BᵗB − I`
pub fn orthonormality_error(basis: &DMatrix<f64>) -> f64 {
    let n = basis.ncols();
    (basis.tr_mul(basis) - DMatrix::<f64>::identity(n, n)).amax()
}
