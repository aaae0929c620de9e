//! Common macros for opaque type implementations

/// Generate the lifecycle functions of an opaque type
///
/// # Generated functions
/// - `rom_<TYPE>_release()` - Drops the object
/// - `rom_<TYPE>_is_assigned()` - Checks if the pointer is non-null
///
/// # Example
/// ```ignore
/// // In types.rs
/// #[repr(C)]
/// pub struct rom_sampler {
///     pub(crate) inner: IncrementalSvdSampler,
/// }
///
/// // In sampler.rs
/// impl_opaque_type_common!(sampler);
/// ```
#[macro_export]
macro_rules! impl_opaque_type_common {
    ($type_name:ident) => {
        paste::paste! {
            /// Release the object by dropping it
            ///
            /// # Safety
            /// The caller must ensure that the pointer is valid and not used after this call.
            #[unsafe(no_mangle)]
            pub unsafe extern "C" fn [<rom_ $type_name _release>](obj: *mut [<rom_ $type_name>]) {
                if obj.is_null() {
                    return;
                }
                // Dropping may write engine state; keep a failure on this side
                let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
                    drop(Box::from_raw(obj));
                }));
            }

            /// Check if the object pointer is assigned
            ///
            /// # Returns
            /// 1 if the pointer is non-null, 0 otherwise
            #[unsafe(no_mangle)]
            pub extern "C" fn [<rom_ $type_name _is_assigned>](
                obj: *const [<rom_ $type_name>]
            ) -> libc::c_int {
                if obj.is_null() { 0 } else { 1 }
            }
        }
    };
}
