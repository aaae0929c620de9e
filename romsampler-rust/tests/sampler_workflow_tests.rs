//! End-to-end sampling runs: adaptive loop, basis output, engine save/restore

mod common;

use approx::assert_abs_diff_eq;
use common::{SimpleRng, orthonormality_error, remove_rank_files, temp_base};
use romsampler_rust::{
    BasisReader, BasisSource, DMatrix, DatabaseError, DatabaseFormat, IncrementalSvd,
    IncrementalSvdSampler,
    SamplerOptions, SingleProcess, rank_file_name,
};

/// State made of a few fixed modes with oscillating amplitudes
struct ModalState {
    modes: DMatrix<f64>,
}

impl ModalState {
    fn new(dim: usize, num_modes: usize, seed: u64) -> Self {
        Self {
            modes: SimpleRng::new(seed).matrix(dim, num_modes),
        }
    }

    fn state(&self, t: f64) -> Vec<f64> {
        let amp = amplitudes(self.modes.ncols(), t, false);
        (&self.modes * amp).as_slice().to_vec()
    }

    fn state_dot(&self, t: f64) -> Vec<f64> {
        let amp = amplitudes(self.modes.ncols(), t, true);
        (&self.modes * amp).as_slice().to_vec()
    }
}

/// Amplitudes `cos((k+1)t)/(k+1)` or their time derivatives
fn amplitudes(n: usize, t: f64, derivative: bool) -> DMatrix<f64> {
    DMatrix::from_fn(n, 1, |k, _| {
        let w = (k + 1) as f64;
        if derivative {
            -(w * t).sin()
        } else {
            (w * t).cos() / w
        }
    })
}

fn run(sampler: &mut IncrementalSvdSampler, model: &ModalState, steps: usize, dt: f64) -> usize {
    let mut taken = 0;
    for step in 0..steps {
        let t = step as f64 * dt;
        if !sampler.is_next_sample(t) {
            continue;
        }
        let u = model.state(t);
        if sampler.take_sample(&SingleProcess, &u, t, false).unwrap() {
            taken += 1;
        }
        sampler.compute_next_sample_time(&SingleProcess, &u, &model.state_dot(t), t);
    }
    taken
}

#[test]
fn test_adaptive_run_writes_readable_intervals() {
    for (fast_update, format) in [(false, DatabaseFormat::Binary), (true, DatabaseFormat::Json)] {
        let base = temp_base("workflow");
        let dim = 40;
        let opts = SamplerOptions::new(dim)
            .with_fast_update(fast_update)
            .with_initial_dt(0.05)
            .with_sampling_tol(1e-3)
            .with_max_time_between_samples(0.5)
            .with_samples_per_time_interval(4)
            .with_basis_file_name(base.clone())
            .with_format(format);
        let mut sampler = IncrementalSvdSampler::new(&opts, &SingleProcess).unwrap();
        let model = ModalState::new(dim, 3, 11);

        let taken = run(&mut sampler, &model, 400, 0.01);
        assert!(taken > 4, "expected several samples, got {}", taken);
        assert!(sampler.current_dt() > 0.0 && sampler.current_dt() <= 0.5);
        sampler.end_samples().unwrap();

        let start_times = sampler.svd().time_intervals().start_times().to_vec();
        assert!(start_times.len() >= 2);
        assert_eq!(
            sampler.basis_writer().map(|w| w.num_intervals()),
            Some(start_times.len())
        );

        let mut reader = BasisReader::open(&base, format, &SingleProcess).unwrap();
        assert_eq!(reader.time_interval_start_times(), start_times.as_slice());
        for (i, &t) in start_times.iter().enumerate() {
            let basis = reader.spatial_basis(t);
            assert_eq!(basis.nrows(), dim);
            assert!(basis.ncols() >= 1 && basis.ncols() <= 4);
            assert!(orthonormality_error(basis) < 1e-8);
            assert_eq!(reader.last_basis_index(), Some(i));
        }

        // Last interval matches the live engine
        let last = *start_times.last().unwrap();
        let live = BasisSource::spatial_basis(&mut sampler, last).clone();
        let stored = reader.spatial_basis(last + 1.0);
        for (a, b) in live.iter().zip(stored.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-15);
        }
        remove_rank_files(&base, 1);
    }
}

#[test]
fn test_engine_state_survives_restart() {
    for fast_update in [false, true] {
        let base = temp_base("restart");
        let dim = 12;
        let mut opts = SamplerOptions::new(dim)
            .with_fast_update(fast_update)
            .with_basis_file_name(base.clone());
        opts.save_state = true;

        let model = ModalState::new(dim, 4, 3);
        let (svals, basis, num_samples) = {
            let mut sampler = IncrementalSvdSampler::new(&opts, &SingleProcess).unwrap();
            for step in 0..5 {
                let t = step as f64 * 0.3;
                sampler
                    .take_sample(&SingleProcess, &model.state(t), t, false)
                    .unwrap();
            }
            let basis = BasisSource::spatial_basis(&mut sampler, 1.2).clone();
            (
                sampler.svd().singular_values().to_vec(),
                basis,
                sampler.svd().num_samples(),
            )
            // Dropping the sampler saves the engine state
        };
        let state_file = rank_file_name(&format!("{}.state", base), 0);
        assert!(std::path::Path::new(&state_file).exists());

        opts.save_state = false;
        opts.restore_state = true;
        let mut restored = IncrementalSvdSampler::new(&opts, &SingleProcess).unwrap();
        assert_eq!(restored.svd().num_samples(), num_samples);
        assert_eq!(restored.svd().singular_values(), svals.as_slice());
        assert_eq!(restored.svd().time_intervals().start_times(), &[0.0]);
        let restored_basis = BasisSource::spatial_basis(&mut restored, 1.2);
        assert_eq!(restored_basis.shape(), basis.shape());
        for (a, b) in restored_basis.iter().zip(basis.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }

        // The restored engine keeps accumulating
        assert!(restored
            .take_sample(&SingleProcess, &model.state(2.0), 2.0, false)
            .unwrap());
        assert_eq!(restored.svd().num_samples(), num_samples + 1);

        std::fs::remove_file(state_file).ok();
    }
}

#[test]
fn test_engine_state_restores_across_variants() {
    let samples = [[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 2.0]];
    for (saved_fast, restored_fast) in [(true, false), (false, true)] {
        let base = temp_base("cross_variant");
        let mut opts = SamplerOptions::new(3)
            .with_fast_update(saved_fast)
            .with_basis_file_name(base.clone());
        opts.save_state = true;

        let (svals, basis) = {
            let mut sampler = IncrementalSvdSampler::new(&opts, &SingleProcess).unwrap();
            for (step, u) in samples.iter().enumerate() {
                sampler
                    .take_sample(&SingleProcess, u, step as f64 * 0.1, false)
                    .unwrap();
            }
            let basis = BasisSource::spatial_basis(&mut sampler, 0.2).clone();
            (sampler.svd().singular_values().to_vec(), basis)
        };

        opts.save_state = false;
        opts.restore_state = true;
        opts.fast_update = restored_fast;
        let mut restored = IncrementalSvdSampler::new(&opts, &SingleProcess).unwrap();
        assert_eq!(restored.svd().singular_values(), svals.as_slice());
        let restored_basis = BasisSource::spatial_basis(&mut restored, 0.2);
        assert_eq!(restored_basis.shape(), basis.shape());
        assert!(orthonormality_error(restored_basis) < 1e-12);
        for (a, b) in restored_basis.iter().zip(basis.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }

        std::fs::remove_file(rank_file_name(&format!("{}.state", base), 0)).ok();
    }
}

#[test]
fn test_restore_without_saved_state_fails() {
    let mut opts = SamplerOptions::new(4).with_basis_file_name(temp_base("missing"));
    opts.restore_state = true;
    let err = IncrementalSvdSampler::new(&opts, &SingleProcess).err();
    assert!(matches!(err, Some(DatabaseError::Io { .. })));
}

#[test]
fn test_options_from_toml_file() {
    let path = std::path::PathBuf::from(format!("{}.toml", temp_base("config")));
    std::fs::write(
        &path,
        r#"
        dim = 8
        fast_update = true
        initial_dt = 0.02
        sampling_tol = 1e-5
        max_time_between_samples = 0.25
        min_step_scale = 0.5
        max_step_scale = 2.0
        "#,
    )
    .unwrap();
    let opts = SamplerOptions::from_toml_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(opts.dim, 8);
    assert!(opts.fast_update);
    assert_eq!(opts.step_scale, 0.8);

    let mut sampler = IncrementalSvdSampler::new(&opts, &SingleProcess).unwrap();
    assert_eq!(sampler.current_dt(), 0.02);
    let mut u = vec![0.0; 8];
    u[0] = 1.0;
    sampler.compute_next_sample_time(&SingleProcess, &u, &[0.0; 8], 0.0);
    // err = 1, factor = 0.8 * sqrt(1e-5) clamps to 0.5
    assert_abs_diff_eq!(sampler.current_dt(), 0.01, epsilon = 1e-15);
}

#[test]
fn test_missing_config_file() {
    let err = SamplerOptions::from_toml_file(format!("{}.toml", temp_base("absent"))).unwrap_err();
    assert!(matches!(err, romsampler_rust::ConfigError::Io { .. }));
}
