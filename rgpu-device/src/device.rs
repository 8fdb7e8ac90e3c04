//! Logical device bring-up ([`Device`]).
//!
//! [`Device::create_compatible`] is the entry point: it selects a
//! physical device that can present to the given surface, builds a
//! [`DeviceCreatePlan`] for it, creates the `VkDevice` and fetches one
//! queue per role.
//!
//! The plan and the queue lookup take the actual Vulkan calls as
//! closures, so both can be exercised without a driver.

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use thiserror::Error;

use crate::{
    config::DeviceSelectConfig,
    instance::{Instance, VALIDATION_LAYER_NAME},
    physical::{SelectDeviceError, SelectedPhysicalDevice, select_physical_device},
    queue_family::ResolvedQueueFamilies,
    surface::Surface,
};

/// Device extensions a candidate must support and that are enabled on
/// the logical device.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// The features to enable: `samplerAnisotropy`, `fillModeNonSolid` and
/// `sampleRateShading`, each only if `supported` reports it.
pub fn enabled_features(
    supported: &vk::PhysicalDeviceFeatures,
) -> vk::PhysicalDeviceFeatures {
    vk::PhysicalDeviceFeatures {
        sampler_anisotropy: supported.sampler_anisotropy,
        fill_mode_non_solid: supported.fill_mode_non_solid,
        sample_rate_shading: supported.sample_rate_shading,
        ..Default::default()
    }
}

/// Everything that goes into `vkCreateDevice`, decided up front.
#[derive(Debug, Clone)]
pub struct DeviceCreatePlan {
    /// One queue is requested from each of these, with priority 1.0.
    pub queue_families: Vec<u32>,
    pub features: vk::PhysicalDeviceFeatures,
    pub extensions: Vec<&'static CStr>,
    pub layers: Vec<&'static CStr>,
}

impl DeviceCreatePlan {
    pub fn new(selected: &SelectedPhysicalDevice, validation: bool) -> Self {
        Self {
            queue_families: selected.queue_families().unique(),
            features: enabled_features(selected.features()),
            extensions: REQUIRED_DEVICE_EXTENSIONS.to_vec(),
            layers: if validation {
                vec![VALIDATION_LAYER_NAME]
            } else {
                Vec::new()
            },
        }
    }

    /// Assemble the `vk::DeviceCreateInfo` and hand it to `create_fn`.
    ///
    /// The create info borrows from locals, so it is only valid for the
    /// duration of the call. Errors are passed through untouched.
    pub fn create<D>(
        &self,
        create_fn: impl FnOnce(&vk::DeviceCreateInfo<'_>) -> Result<D, vk::Result>,
    ) -> Result<D, vk::Result> {
        let priorities = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo<'_>> = self
            .queue_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
            })
            .collect();

        let ext_ptrs: Vec<*const c_char> =
            self.extensions.iter().map(|ext| ext.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> =
            self.layers.iter().map(|layer| layer.as_ptr()).collect();

        // Device layers are ignored by current loaders but still passed on
        #[allow(deprecated)]
        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&ext_ptrs)
            .enabled_layer_names(&layer_ptrs)
            .enabled_features(&self.features);

        create_fn(&create_info)
    }
}

/// Queue 0 of each resolved family. Roles that share a family share a
/// handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceQueues {
    pub graphics: vk::Queue,
    pub present: vk::Queue,
    pub transfer: vk::Queue,
}

impl DeviceQueues {
    /// `get_queue(family, index)` is `vkGetDeviceQueue` on a device that
    /// was created with one queue from each of `families`.
    pub fn retrieve(
        families: &ResolvedQueueFamilies,
        mut get_queue: impl FnMut(u32, u32) -> vk::Queue,
    ) -> Self {
        Self {
            graphics: get_queue(families.graphics, 0),
            present: get_queue(families.present, 0),
            transfer: get_queue(families.transfer, 0),
        }
    }
}

#[derive(Debug, Error)]
pub enum CreateCompatibleError {
    #[error(
        "Mismatched parameters to Device::create_compatible. The surface \
         must be derived from the passed instance"
    )]
    MismatchedParams,

    #[error(transparent)]
    Selection(#[from] SelectDeviceError),

    #[error("Failed to create logical device: {0}")]
    DeviceCreationFailed(vk::Result),
}

impl CreateCompatibleError {
    /// Short label for the kind of failure.
    pub fn failure_class(&self) -> &'static str {
        match self {
            Self::MismatchedParams => "mismatched parameters",
            Self::Selection(SelectDeviceError::NoDevices) => "no devices",
            Self::Selection(SelectDeviceError::NoSuitableDevice(_)) => {
                "no suitable device"
            }
            Self::Selection(
                SelectDeviceError::Fetch(_)
                | SelectDeviceError::SurfaceSupport(_),
            ) => "capability query fault",
            Self::DeviceCreationFailed(_) => "device creation failed",
        }
    }
}

/// A logical device with its graphics, present and transfer queues.
///
/// Built once by [`Device::create_compatible`] and read-only afterwards.
/// Share it with `Arc<Device>`.
pub struct Device {
    parent: Arc<Instance>,
    handle: ash::Device,
    physical: SelectedPhysicalDevice,
    enabled_features: vk::PhysicalDeviceFeatures,
    queues: DeviceQueues,
    vendor_name: &'static str,
    device_type_name: &'static str,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("handle", &self.handle.handle())
            .field("physical", &self.physical.raw_handle())
            .field("queues", &self.queues)
            .finish_non_exhaustive()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        tracing::debug!("Dropping device {:?}", self.handle.handle());
        //SAFETY: Objects derived from this device hold a reference to it, so
        //they are gone by now. Queues are not destroyed separately
        unsafe { self.handle.destroy_device(None) };
    }
}

impl Device {
    /// Select a physical device that can present to `surf` and create a
    /// logical device on it.
    ///
    /// On failure one error line naming the failure class is logged and
    /// nothing is left to clean up.
    pub fn create_compatible<T: HasDisplayHandle + HasWindowHandle>(
        instance: &Arc<Instance>,
        surf: &Surface<T>,
        config: &DeviceSelectConfig,
    ) -> Result<Self, CreateCompatibleError> {
        Self::bring_up(instance, surf, config).inspect_err(|e| {
            tracing::error!("Device bring-up failed ({}): {e}", e.failure_class())
        })
    }

    fn bring_up<T: HasDisplayHandle + HasWindowHandle>(
        instance: &Arc<Instance>,
        surf: &Surface<T>,
        config: &DeviceSelectConfig,
    ) -> Result<Self, CreateCompatibleError> {
        if !Arc::ptr_eq(surf.parent(), instance) {
            return Err(CreateCompatibleError::MismatchedParams);
        }

        let physical = select_physical_device(surf, config.preferred_device)?;
        let plan = DeviceCreatePlan::new(&physical, config.validation);

        let handle = plan
            .create(|create_info| {
                //SAFETY: physical was enumerated from instance (the surface
                //shares it, checked above) and create_info is live for the
                //call
                unsafe {
                    instance.create_ash_device(physical.raw_handle(), create_info)
                }
            })
            .map_err(CreateCompatibleError::DeviceCreationFailed)?;

        let families = physical.queue_families();
        let queues = DeviceQueues::retrieve(&families, |family, index| {
            //SAFETY: The device was created with one queue in each of these
            //families
            unsafe { handle.get_device_queue(family, index) }
        });

        let vendor_name = physical.vendor_name();
        let device_type_name = physical.device_type_name();
        tracing::info!(
            "Selected physical device {} {:?} ({}), Vulkan {}",
            vendor_name,
            physical.name(),
            device_type_name,
            physical.api_version(),
        );
        tracing::info!(
            "Queue families: graphics {}, present {}, transfer {}",
            families.graphics,
            families.present,
            families.transfer,
        );

        Ok(Self {
            parent: Arc::clone(instance),
            handle,
            enabled_features: plan.features,
            physical,
            queues,
            vendor_name,
            device_type_name,
        })
    }

    pub fn parent(&self) -> &Arc<Instance> {
        &self.parent
    }

    pub fn ash_device(&self) -> &ash::Device {
        &self.handle
    }

    pub fn raw_device(&self) -> vk::Device {
        self.handle.handle()
    }

    pub fn physical_device(&self) -> &SelectedPhysicalDevice {
        &self.physical
    }

    pub fn queue_families(&self) -> ResolvedQueueFamilies {
        self.physical.queue_families()
    }

    pub fn queues(&self) -> DeviceQueues {
        self.queues
    }

    /// The subset of optional features that was actually enabled.
    pub fn enabled_features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.enabled_features
    }

    pub fn vendor_name(&self) -> &'static str {
        self.vendor_name
    }

    pub fn device_type_name(&self) -> &'static str {
        self.device_type_name
    }
}
