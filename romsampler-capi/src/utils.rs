//! Utility functions for C API
//!
//! Argument decoding and matrix copy-out.

use std::ffi::CStr;

use romsampler_rust::linalg::to_row_major;
use romsampler_rust::{DMatrix, DatabaseFormat};

use crate::{ROM_FORMAT_BINARY, ROM_FORMAT_JSON, ROM_ORDER_COLUMN_MAJOR, ROM_ORDER_ROW_MAJOR};

/// Memory layout order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOrder {
    RowMajor,    // Rightmost dimension varies fastest (C)
    ColumnMajor, // Leftmost dimension varies fastest (Fortran)
}

impl MemoryOrder {
    /// Convert from C int to MemoryOrder
    pub fn from_c_int(order: libc::c_int) -> Result<Self, ()> {
        match order {
            ROM_ORDER_ROW_MAJOR => Ok(Self::RowMajor),
            ROM_ORDER_COLUMN_MAJOR => Ok(Self::ColumnMajor),
            _ => Err(()),
        }
    }
}

/// Convert from C int to DatabaseFormat
pub fn format_from_c_int(format: libc::c_int) -> Result<DatabaseFormat, ()> {
    match format {
        ROM_FORMAT_BINARY => Ok(DatabaseFormat::Binary),
        ROM_FORMAT_JSON => Ok(DatabaseFormat::Json),
        _ => Err(()),
    }
}

/// Borrow a NUL-terminated UTF-8 string
///
/// # Safety
/// `s` must be null or point to a NUL-terminated string that outlives the
/// returned borrow
pub unsafe fn str_from_c<'a>(s: *const libc::c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(s) }.to_str().ok()
}

/// Copy a matrix to a C array in the requested order
///
/// # Safety
/// Caller must ensure `out` has space for `m.len()` elements
pub unsafe fn copy_matrix_to_c_array(m: &DMatrix<f64>, order: MemoryOrder, out: *mut f64) {
    match order {
        MemoryOrder::ColumnMajor => unsafe {
            std::ptr::copy_nonoverlapping(m.as_ptr(), out, m.len());
        },
        MemoryOrder::RowMajor => {
            let values = to_row_major(m);
            unsafe { std::ptr::copy_nonoverlapping(values.as_ptr(), out, values.len()) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_order_conversion() {
        assert_eq!(MemoryOrder::from_c_int(ROM_ORDER_ROW_MAJOR), Ok(MemoryOrder::RowMajor));
        assert_eq!(
            MemoryOrder::from_c_int(ROM_ORDER_COLUMN_MAJOR),
            Ok(MemoryOrder::ColumnMajor)
        );
        assert_eq!(MemoryOrder::from_c_int(99), Err(()));
    }

    #[test]
    fn test_format_conversion() {
        assert_eq!(format_from_c_int(ROM_FORMAT_JSON), Ok(DatabaseFormat::Json));
        assert_eq!(format_from_c_int(-1), Err(()));
    }

    #[test]
    fn test_copy_orders() {
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut row = [0.0; 6];
        let mut col = [0.0; 6];
        unsafe {
            copy_matrix_to_c_array(&m, MemoryOrder::RowMajor, row.as_mut_ptr());
            copy_matrix_to_c_array(&m, MemoryOrder::ColumnMajor, col.as_mut_ptr());
        }
        assert_eq!(row, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(col, [1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_str_from_c() {
        let s = std::ffi::CString::new("basis").unwrap();
        assert_eq!(unsafe { str_from_c(s.as_ptr()) }, Some("basis"));
        assert_eq!(unsafe { str_from_c(std::ptr::null()) }, None);
    }
}
