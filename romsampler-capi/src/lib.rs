//! C API for the romsampler Rust implementation
//!
//! This crate exposes the adaptive sampler and the basis reader to C, C++
//! and Fortran simulation drivers. Objects are opaque pointers released with
//! `rom_<type>_release`; every entry point returns or writes a status code,
//! and panics never unwind across the ABI.
//!
//! The C API runs on a single process.

#![allow(non_camel_case_types)]

#[macro_use]
mod macros;

mod reader;
mod sampler;
mod types;
mod utils;

pub use reader::*;
pub use sampler::*;
pub use types::*;

/// Error codes for the C API
pub type StatusCode = libc::c_int;

pub const ROM_SUCCESS: StatusCode = 0;
pub const ROM_INVALID_ARGUMENT: StatusCode = -1;
pub const ROM_IO_ERROR: StatusCode = -2;
pub const ROM_INTERNAL_ERROR: StatusCode = -3;

// Memory order of matrices copied out
pub const ROM_ORDER_ROW_MAJOR: libc::c_int = 0;
pub const ROM_ORDER_COLUMN_MAJOR: libc::c_int = 1;

// On-disk encodings
pub const ROM_FORMAT_BINARY: libc::c_int = 0;
pub const ROM_FORMAT_JSON: libc::c_int = 1;
