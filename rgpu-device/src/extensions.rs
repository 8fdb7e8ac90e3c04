//! Device extension checks.

use std::ffi::CStr;

use ash::vk;

use crate::physical::PhysicalDeviceQueries;

/// True iff every name in `required` appears in `available`.
///
/// Matching is exact and case-sensitive. An empty `required` list is
/// always satisfied.
pub fn supports_extensions<S: AsRef<CStr>>(
    available: &[S],
    required: &[&CStr],
) -> bool {
    required
        .iter()
        .all(|req| available.iter().any(|ext| ext.as_ref() == *req))
}

/// Query `device`'s extensions and check them against `required`.
///
/// A failed query counts as "unsupported" so the caller moves on to the
/// next candidate.
///
/// # Safety
/// `device` must have been enumerated through `queries`.
pub unsafe fn device_supports_extensions<Q: PhysicalDeviceQueries + ?Sized>(
    queries: &Q,
    device: vk::PhysicalDevice,
    required: &[&CStr],
) -> bool {
    //SAFETY: Caller guarantees provenance
    match unsafe { queries.extension_names(device) } {
        Ok(available) => {
            let supported = supports_extensions(&available, required);
            if !supported {
                tracing::debug!(
                    "{device:?} is missing one of {required:?}",
                );
            }
            supported
        }
        Err(e) => {
            tracing::debug!(
                "Failed to enumerate extensions of {device:?}: {e}"
            );
            false
        }
    }
}
