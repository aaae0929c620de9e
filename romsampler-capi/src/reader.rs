//! Basis reader API for C
//!
//! Functions:
//! - Creation: rom_basis_reader_open, rom_basis_reader_open_legacy
//! - Introspection: num_intervals, get_spatial_basis_dims
//! - Retrieval: get_spatial_basis
//! - Memory: release, is_assigned (via macro)

use std::panic::{AssertUnwindSafe, catch_unwind};

use log::error;
use romsampler_rust::{BasisReader, Communicator, DatabaseError, DatabaseFormat, SingleProcess};

use crate::types::rom_basis_reader;
use crate::utils::{MemoryOrder, copy_matrix_to_c_array, format_from_c_int, str_from_c};
use crate::{ROM_INTERNAL_ERROR, ROM_INVALID_ARGUMENT, ROM_IO_ERROR, ROM_SUCCESS, StatusCode};

// Generate common opaque type functions: release, is_assigned
impl_opaque_type_common!(basis_reader);

type OpenFn = fn(&str, DatabaseFormat, &dyn Communicator) -> Result<BasisReader, DatabaseError>;

unsafe fn open_with(
    open: OpenFn,
    base_file_name: *const libc::c_char,
    format: libc::c_int,
    status: *mut StatusCode,
) -> *mut rom_basis_reader {
    let name = unsafe { str_from_c(base_file_name) }.filter(|name| !name.is_empty());
    let (ptr, code) = match (name, format_from_c_int(format)) {
        (Some(name), Ok(format)) => {
            let result = catch_unwind(AssertUnwindSafe(|| open(name, format, &SingleProcess)));
            match result {
                Ok(Ok(inner)) => (
                    Box::into_raw(Box::new(rom_basis_reader { inner })),
                    ROM_SUCCESS,
                ),
                Ok(Err(e)) => {
                    error!("{}", e);
                    (std::ptr::null_mut(), ROM_IO_ERROR)
                }
                Err(_) => (std::ptr::null_mut(), ROM_INTERNAL_ERROR),
            }
        }
        _ => (std::ptr::null_mut(), ROM_INVALID_ARGUMENT),
    };
    if !status.is_null() {
        unsafe { *status = code };
    }
    ptr
}

/// Opens the basis file of this process
///
/// # Arguments
/// * `base_file_name` - Base name; the rank suffix `.000000` is appended
/// * `format` - `ROM_FORMAT_BINARY` or `ROM_FORMAT_JSON`
/// * `status` - Pointer to store the status code
///
/// # Returns
/// Pointer to the newly created reader, or NULL if opening fails
///
/// # Safety
/// `base_file_name` must be a NUL-terminated string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rom_basis_reader_open(
    base_file_name: *const libc::c_char,
    format: libc::c_int,
    status: *mut StatusCode,
) -> *mut rom_basis_reader {
    unsafe { open_with(BasisReader::open, base_file_name, format, status) }
}

/// Opens a basis file whose interval count is stored as a floating value
///
/// # Safety
/// `base_file_name` must be a NUL-terminated string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rom_basis_reader_open_legacy(
    base_file_name: *const libc::c_char,
    format: libc::c_int,
    status: *mut StatusCode,
) -> *mut rom_basis_reader {
    unsafe { open_with(BasisReader::open_legacy, base_file_name, format, status) }
}

/// Get the number of time intervals in the file
#[unsafe(no_mangle)]
pub extern "C" fn rom_basis_reader_num_intervals(
    r: *const rom_basis_reader,
    num_intervals: *mut libc::c_int,
) -> StatusCode {
    if r.is_null() || num_intervals.is_null() {
        return ROM_INVALID_ARGUMENT;
    }
    unsafe { *num_intervals = (*r).inner.num_time_intervals() as libc::c_int };
    ROM_SUCCESS
}

/// Validate a query against the loaded intervals
fn check_query(reader: &BasisReader, time: f64) -> bool {
    reader.num_time_intervals() > 0 && time >= 0.0
}

/// Get the shape of the spatial basis valid at `time`
///
/// # Returns
/// * `ROM_SUCCESS` on success
/// * `ROM_INVALID_ARGUMENT` on null pointers, a negative time, or an empty file
/// * `ROM_INTERNAL_ERROR` if an internal panic occurs
#[unsafe(no_mangle)]
pub extern "C" fn rom_basis_reader_get_spatial_basis_dims(
    r: *mut rom_basis_reader,
    time: f64,
    num_rows: *mut libc::c_int,
    num_cols: *mut libc::c_int,
) -> StatusCode {
    if r.is_null() || num_rows.is_null() || num_cols.is_null() {
        return ROM_INVALID_ARGUMENT;
    }
    let reader = unsafe { &mut (*r).inner };
    if !check_query(reader, time) {
        return ROM_INVALID_ARGUMENT;
    }

    let result = catch_unwind(AssertUnwindSafe(|| unsafe {
        let basis = reader.spatial_basis(time);
        *num_rows = basis.nrows() as libc::c_int;
        *num_cols = basis.ncols() as libc::c_int;
        ROM_SUCCESS
    }));

    result.unwrap_or(ROM_INTERNAL_ERROR)
}

/// Copy the spatial basis valid at `time` out
///
/// # Arguments
/// * `r` - Reader object
/// * `time` - Query time, non-negative
/// * `order` - `ROM_ORDER_ROW_MAJOR` or `ROM_ORDER_COLUMN_MAJOR`
/// * `out` - Pre-allocated array of `num_rows * num_cols` elements
///
/// # Safety
/// `out` must have space for the whole basis
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rom_basis_reader_get_spatial_basis(
    r: *mut rom_basis_reader,
    time: f64,
    order: libc::c_int,
    out: *mut f64,
) -> StatusCode {
    if r.is_null() || out.is_null() {
        return ROM_INVALID_ARGUMENT;
    }
    let Ok(order) = MemoryOrder::from_c_int(order) else {
        return ROM_INVALID_ARGUMENT;
    };
    let reader = unsafe { &mut (*r).inner };
    if !check_query(reader, time) {
        return ROM_INVALID_ARGUMENT;
    }

    let result = catch_unwind(AssertUnwindSafe(|| unsafe {
        copy_matrix_to_c_array(reader.spatial_basis(time), order, out);
        ROM_SUCCESS
    }));

    result.unwrap_or(ROM_INTERNAL_ERROR)
}
