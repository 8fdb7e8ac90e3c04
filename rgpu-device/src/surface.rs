//! Presentable window surface ([`Surface`]).
//!
//! The surface is the window-system side of device selection: a physical
//! device is only usable if one of its queue families can present to it
//! and it reports at least one format and one present mode for it.

use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use thiserror::Error;

use crate::instance::Instance;

#[derive(Debug, Error)]
pub enum CreateSurfaceError {
    #[error("Couldn't get display handle: {0}")]
    InvalidDisplayHandle(raw_window_handle::HandleError),
    #[error("Couldn't get window handle: {0}")]
    InvalidWindowHandle(raw_window_handle::HandleError),
    #[error("Vulkan surface creation failed: {0}")]
    VulkanError(vk::Result),
    #[error(
        "Parent instance was created without the platform surface \
         extensions"
    )]
    MissingExtension,
}

/// Failure of the per-family present-support query. This one is fatal
/// during selection.
#[derive(Debug, Error)]
pub enum SurfaceSupportError {
    #[error("Surface extension is not loaded")]
    ExtensionNotLoaded,
    #[error("Vulkan error checking present support: {0}")]
    Vulkan(vk::Result),
}

#[derive(Debug, Error)]
pub enum SurfaceQueryError {
    #[error("Surface extension is not loaded")]
    ExtensionNotLoaded,
    #[error("Vulkan error querying surface: {0}")]
    Vulkan(vk::Result),
}

/// A `VkSurfaceKHR` tied to the window it was created from.
///
/// Holds its parent instance and its window source so neither can go
/// away first.
pub struct Surface<T: HasWindowHandle + HasDisplayHandle> {
    parent: Arc<Instance>,
    handle: vk::SurfaceKHR,
    _source: Arc<T>,
}

impl<T: HasWindowHandle + HasDisplayHandle> std::fmt::Debug for Surface<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("handle", &self.handle)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

impl<T: HasWindowHandle + HasDisplayHandle> Surface<T> {
    /// # Safety
    /// The surface must be dropped whenever the window system invalidates
    /// it (winit `suspended`), and before `source` is torn down by anything
    /// other than this wrapper.
    pub unsafe fn new(
        instance: &Arc<Instance>,
        source: Arc<T>,
    ) -> Result<Self, CreateSurfaceError> {
        //SAFETY: We keep Arcs to both the instance and the source, so both
        //outlive the surface
        let handle = unsafe { instance.create_raw_surface(&*source) }?;
        Ok(Self {
            parent: Arc::clone(instance),
            handle,
            _source: source,
        })
    }

    pub fn parent(&self) -> &Arc<Instance> {
        &self.parent
    }

    pub fn raw_handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Can `queue_family_index` on `physical_device` present here?
    ///
    /// # Safety
    /// `physical_device` must come from this surface's parent instance.
    pub unsafe fn supports_queue_family(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> Result<bool, SurfaceSupportError> {
        //SAFETY: Caller guarantees provenance, self.handle is live
        unsafe {
            self.parent.get_raw_physical_device_surface_support(
                physical_device,
                queue_family_index,
                self.handle,
            )
        }
    }

    /// # Safety
    /// `physical_device` must come from this surface's parent instance.
    pub unsafe fn query_formats(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, SurfaceQueryError> {
        //SAFETY: Caller guarantees provenance, self.handle is live
        unsafe { self.parent.get_surface_formats(physical_device, self.handle) }
    }

    /// # Safety
    /// `physical_device` must come from this surface's parent instance.
    pub unsafe fn query_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::PresentModeKHR>, SurfaceQueryError> {
        //SAFETY: Caller guarantees provenance, self.handle is live
        unsafe {
            self.parent
                .get_surface_present_modes(physical_device, self.handle)
        }
    }
}

impl<T: HasWindowHandle + HasDisplayHandle> Drop for Surface<T> {
    fn drop(&mut self) {
        tracing::debug!("Dropping surface {:?}", self.handle);
        //SAFETY: Anything derived from the surface holds a reference to it,
        //so this is the last use
        if let Err(e) = unsafe { self.parent.destroy_raw_surface(self.handle) }
        {
            tracing::error!(
                "Error while dropping surface {:?}: {e}",
                self.handle
            );
        }
    }
}
