//! Opaque types for C API
//!
//! All Rust objects are wrapped in opaque pointers to hide implementation
//! details from C code.

use romsampler_rust::{BasisReader, IncrementalSvdSampler};

/// Opaque adaptive sampler
#[repr(C)]
pub struct rom_sampler {
    pub(crate) inner: IncrementalSvdSampler,
}

/// Opaque basis reader
#[repr(C)]
pub struct rom_basis_reader {
    pub(crate) inner: BasisReader,
}
