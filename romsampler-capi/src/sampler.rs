//! Sampler API for C
//!
//! Functions:
//! - Creation: rom_sampler_new, rom_sampler_new_from_toml
//! - Step control: is_next_sample, compute_next_sample_time, reset_dt
//! - Sampling: take_sample, end_samples
//! - Basis: get_basis_dims, get_spatial_basis
//! - Memory: release, is_assigned (via macro)

use std::panic::{AssertUnwindSafe, catch_unwind};

use log::error;
use romsampler_rust::{
    BasisSource, DatabaseError, IncrementalSvd, IncrementalSvdSampler, SamplerOptions,
    SingleProcess,
};

use crate::types::rom_sampler;
use crate::utils::{MemoryOrder, copy_matrix_to_c_array, str_from_c};
use crate::{ROM_INTERNAL_ERROR, ROM_INVALID_ARGUMENT, ROM_IO_ERROR, ROM_SUCCESS, StatusCode};

// Generate common opaque type functions: release, is_assigned
impl_opaque_type_common!(sampler);

fn io_status(err: &DatabaseError) -> StatusCode {
    error!("{}", err);
    ROM_IO_ERROR
}

/// Build a sampler from `options`, writing the outcome to `status`
unsafe fn new_sampler(options: SamplerOptions, status: *mut StatusCode) -> *mut rom_sampler {
    let (ptr, code) = if let Some(msg) = options.precondition_violation() {
        error!("Invalid sampler options: {}", msg);
        (std::ptr::null_mut(), ROM_INVALID_ARGUMENT)
    } else {
        let result = catch_unwind(AssertUnwindSafe(|| {
            IncrementalSvdSampler::new(&options, &SingleProcess)
        }));
        match result {
            Ok(Ok(inner)) => (Box::into_raw(Box::new(rom_sampler { inner })), ROM_SUCCESS),
            Ok(Err(e)) => (std::ptr::null_mut(), io_status(&e)),
            Err(_) => (std::ptr::null_mut(), ROM_INTERNAL_ERROR),
        }
    };
    if !status.is_null() {
        unsafe { *status = code };
    }
    ptr
}

/// Creates a new sampler
///
/// Options not listed here take their defaults; use
/// [`rom_sampler_new_from_toml`] to set them.
///
/// # Arguments
/// * `dim` - Rows of the state vector
/// * `fast_update` - Nonzero selects the fast-update engine
/// * `initial_dt` - Initial sampling step size
/// * `sampling_tol` - Target worst-case representation error
/// * `max_time_between_samples` - Upper bound on the step size
/// * `update_right_sv` - Nonzero tracks the temporal basis and samples every step
/// * `basis_file_name` - Base name for basis output, or NULL for none
/// * `status` - Pointer to store the status code
///
/// # Returns
/// Pointer to the newly created sampler, or NULL if creation fails
///
/// # Safety
/// `basis_file_name` must be NULL or a NUL-terminated string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rom_sampler_new(
    dim: libc::c_int,
    fast_update: libc::c_int,
    initial_dt: f64,
    sampling_tol: f64,
    max_time_between_samples: f64,
    update_right_sv: libc::c_int,
    basis_file_name: *const libc::c_char,
    status: *mut StatusCode,
) -> *mut rom_sampler {
    let invalid = |status: *mut StatusCode| -> *mut rom_sampler {
        if !status.is_null() {
            unsafe { *status = ROM_INVALID_ARGUMENT };
        }
        std::ptr::null_mut()
    };
    if dim <= 0 {
        return invalid(status);
    }
    let mut options = SamplerOptions::new(dim as usize)
        .with_fast_update(fast_update != 0)
        .with_initial_dt(initial_dt)
        .with_sampling_tol(sampling_tol)
        .with_max_time_between_samples(max_time_between_samples)
        .with_update_right_sv(update_right_sv != 0);
    if !basis_file_name.is_null() {
        match unsafe { str_from_c(basis_file_name) } {
            Some(name) if !name.is_empty() => options = options.with_basis_file_name(name),
            _ => return invalid(status),
        }
    }
    unsafe { new_sampler(options, status) }
}

/// Creates a new sampler from a TOML document of sampler options
///
/// # Returns
/// Pointer to the newly created sampler, or NULL if creation fails
///
/// # Safety
/// `config` must be a NUL-terminated string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rom_sampler_new_from_toml(
    config: *const libc::c_char,
    status: *mut StatusCode,
) -> *mut rom_sampler {
    let parsed = unsafe { str_from_c(config) }.map(SamplerOptions::from_toml_str);
    match parsed {
        Some(Ok(options)) => unsafe { new_sampler(options, status) },
        Some(Err(e)) => {
            error!("{}", e);
            if !status.is_null() {
                unsafe { *status = ROM_INVALID_ARGUMENT };
            }
            std::ptr::null_mut()
        }
        None => {
            if !status.is_null() {
                unsafe { *status = ROM_INVALID_ARGUMENT };
            }
            std::ptr::null_mut()
        }
    }
}

/// Check whether a sample is due at `time`
///
/// # Arguments
/// * `s` - Sampler object
/// * `time` - Simulation time
/// * `out` - Pointer to store 1 if a sample is due, 0 otherwise
#[unsafe(no_mangle)]
pub extern "C" fn rom_sampler_is_next_sample(
    s: *const rom_sampler,
    time: f64,
    out: *mut libc::c_int,
) -> StatusCode {
    if s.is_null() || out.is_null() {
        return ROM_INVALID_ARGUMENT;
    }

    let result = catch_unwind(AssertUnwindSafe(|| unsafe {
        *out = (*s).inner.is_next_sample(time) as libc::c_int;
        ROM_SUCCESS
    }));

    result.unwrap_or(ROM_INTERNAL_ERROR)
}

/// Estimate the representation error and schedule the next sample
///
/// # Arguments
/// * `s` - Sampler object
/// * `state` - State vector of length `n`
/// * `state_dot` - Time derivative of the state, length `n`
/// * `n` - Must equal the sampler dimension
/// * `time` - Simulation time, non-negative
/// * `next_sample_time` - Pointer to store the next sample time
///
/// # Safety
/// `state` and `state_dot` must point to `n` elements each
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rom_sampler_compute_next_sample_time(
    s: *mut rom_sampler,
    state: *const f64,
    state_dot: *const f64,
    n: libc::c_int,
    time: f64,
    next_sample_time: *mut f64,
) -> StatusCode {
    if s.is_null() || state.is_null() || state_dot.is_null() || next_sample_time.is_null() {
        return ROM_INVALID_ARGUMENT;
    }
    let sampler = unsafe { &mut (*s).inner };
    if n < 0 || n as usize != sampler.svd().dim() || !(time >= 0.0) {
        return ROM_INVALID_ARGUMENT;
    }

    let result = catch_unwind(AssertUnwindSafe(|| unsafe {
        let u = std::slice::from_raw_parts(state, n as usize);
        let u_dot = std::slice::from_raw_parts(state_dot, n as usize);
        *next_sample_time = sampler.compute_next_sample_time(&SingleProcess, u, u_dot, time);
        ROM_SUCCESS
    }));

    result.unwrap_or(ROM_INTERNAL_ERROR)
}

/// Overwrite the current sampling step size
#[unsafe(no_mangle)]
pub extern "C" fn rom_sampler_reset_dt(s: *mut rom_sampler, new_dt: f64) -> StatusCode {
    if s.is_null() {
        return ROM_INVALID_ARGUMENT;
    }
    unsafe { (*s).inner.reset_dt(new_dt) };
    ROM_SUCCESS
}

/// Fold a state vector into the basis
///
/// # Arguments
/// * `s` - Sampler object
/// * `u` - Sample of length `n`
/// * `n` - Must equal the sampler dimension
/// * `time` - Simulation time, non-negative and after the previous interval start
/// * `add_without_increase` - Nonzero keeps the basis rank unchanged
/// * `accepted` - Pointer to store 1 if the sample was accepted, 0 otherwise
///
/// # Returns
/// * `ROM_SUCCESS` on success
/// * `ROM_INVALID_ARGUMENT` on null pointers or a dimension mismatch
/// * `ROM_IO_ERROR` if writing the finished interval fails
/// * `ROM_INTERNAL_ERROR` if an internal panic occurs
///
/// # Safety
/// `u` must point to `n` elements
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rom_sampler_take_sample(
    s: *mut rom_sampler,
    u: *const f64,
    n: libc::c_int,
    time: f64,
    add_without_increase: libc::c_int,
    accepted: *mut libc::c_int,
) -> StatusCode {
    if s.is_null() || u.is_null() || accepted.is_null() {
        return ROM_INVALID_ARGUMENT;
    }
    let sampler = unsafe { &mut (*s).inner };
    if n < 0 || n as usize != sampler.svd().dim() || !(time >= 0.0) {
        return ROM_INVALID_ARGUMENT;
    }

    let result = catch_unwind(AssertUnwindSafe(|| unsafe {
        let sample = std::slice::from_raw_parts(u, n as usize);
        match sampler.take_sample(&SingleProcess, sample, time, add_without_increase != 0) {
            Ok(taken) => {
                *accepted = taken as libc::c_int;
                ROM_SUCCESS
            }
            Err(e) => io_status(&e),
        }
    }));

    result.unwrap_or(ROM_INTERNAL_ERROR)
}

/// Write the interval in progress to the basis file
#[unsafe(no_mangle)]
pub extern "C" fn rom_sampler_end_samples(s: *mut rom_sampler) -> StatusCode {
    if s.is_null() {
        return ROM_INVALID_ARGUMENT;
    }

    let result = catch_unwind(AssertUnwindSafe(|| unsafe {
        match (*s).inner.end_samples() {
            Ok(()) => ROM_SUCCESS,
            Err(e) => io_status(&e),
        }
    }));

    result.unwrap_or(ROM_INTERNAL_ERROR)
}

/// Get the shape of the current spatial basis
///
/// # Arguments
/// * `s` - Sampler object
/// * `num_rows` - Pointer to store the number of rows (dimension)
/// * `num_cols` - Pointer to store the number of columns (rank)
#[unsafe(no_mangle)]
pub extern "C" fn rom_sampler_get_basis_dims(
    s: *const rom_sampler,
    num_rows: *mut libc::c_int,
    num_cols: *mut libc::c_int,
) -> StatusCode {
    if s.is_null() || num_rows.is_null() || num_cols.is_null() {
        return ROM_INVALID_ARGUMENT;
    }

    let result = catch_unwind(AssertUnwindSafe(|| unsafe {
        let svd = (*s).inner.svd();
        *num_rows = svd.dim() as libc::c_int;
        *num_cols = svd.rank() as libc::c_int;
        ROM_SUCCESS
    }));

    result.unwrap_or(ROM_INTERNAL_ERROR)
}

/// Copy the current spatial basis out
///
/// # Arguments
/// * `s` - Sampler object
/// * `order` - `ROM_ORDER_ROW_MAJOR` or `ROM_ORDER_COLUMN_MAJOR`
/// * `out` - Pre-allocated array of `num_rows * num_cols` elements
///
/// # Safety
/// `out` must have space for the whole basis
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rom_sampler_get_spatial_basis(
    s: *mut rom_sampler,
    order: libc::c_int,
    out: *mut f64,
) -> StatusCode {
    if s.is_null() || out.is_null() {
        return ROM_INVALID_ARGUMENT;
    }
    let Ok(order) = MemoryOrder::from_c_int(order) else {
        return ROM_INVALID_ARGUMENT;
    };

    let result = catch_unwind(AssertUnwindSafe(|| unsafe {
        let basis = BasisSource::spatial_basis(&mut (*s).inner, 0.0);
        copy_matrix_to_c_array(basis, order, out);
        ROM_SUCCESS
    }));

    result.unwrap_or(ROM_INTERNAL_ERROR)
}
