//! Vulkan instance bootstrap and the raw physical-device queries that
//! device selection is built on.
//!
//! [`Instance`] wraps an `ash::Instance` together with the entry loader,
//! an optional debug messenger and an optional surface extension loader.
//! Everything that takes a `vk::PhysicalDevice` is `unsafe` because the
//! handle is only meaningful for the instance it was enumerated from.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use thiserror::Error;

use crate::surface::{
    CreateSurfaceError, SurfaceQueryError, SurfaceSupportError,
};
use std::{
    ffi::{CStr, CString},
    fmt::{self, Debug},
};

/// Name of the Khronos validation layer, used at instance level and,
/// when validation is requested, at device level.
pub const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Minimum severity forwarded from the debug messenger to `tracing`.
///
/// Ordered least-to-most severe.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum VulkanLogLevel {
    Verbose,
    Info,
    Warning,
    Error,
}

impl VulkanLogLevel {
    /// Every severity at or above `self`.
    pub fn severity_flags(self) -> vk::DebugUtilsMessageSeverityFlagsEXT {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        match self {
            VulkanLogLevel::Verbose => {
                S::VERBOSE | S::INFO | S::WARNING | S::ERROR
            }
            VulkanLogLevel::Info => S::INFO | S::WARNING | S::ERROR,
            VulkanLogLevel::Warning => S::WARNING | S::ERROR,
            VulkanLogLevel::Error => S::ERROR,
        }
    }
}

/// A packed Vulkan API version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VkVersion(u32);

impl VkVersion {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn new(variant: u32, major: u32, minor: u32, patch: u32) -> Self {
        Self(vk::make_api_version(variant, major, minor, patch))
    }

    pub fn variant(&self) -> u32 {
        vk::api_version_variant(self.0)
    }

    pub fn major(&self) -> u32 {
        vk::api_version_major(self.0)
    }

    pub fn minor(&self) -> u32 {
        vk::api_version_minor(self.0)
    }

    pub fn patch(&self) -> u32 {
        vk::api_version_patch(self.0)
    }

    pub fn to_raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for VkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

/// Optional instance-level extensions for [`Instance::new`].
#[derive(Debug, Default)]
pub struct InstanceExtensions {
    /// Request the platform surface extensions. Only honoured when a
    /// display handle source is passed as well.
    pub surface: bool,
}

#[derive(Debug, Error)]
pub enum InstanceCreationError {
    #[error("Could not load Vulkan: {0}")]
    Loading(ash::LoadingError),
    #[error("Couldn't get display handle from passed value: {0}")]
    InvalidDisplayHandle(raw_window_handle::HandleError),
    #[error("Missing mandatory instance extensions: {0:?}")]
    MissingExtensions(Vec<String>),
    #[error("Unknown Vulkan Error {0}")]
    UnknownVulkan(vk::Result),
    #[error("Invalid app name was passed to Instance::new")]
    InvalidAppName,
}

impl From<vk::Result> for InstanceCreationError {
    fn from(value: vk::Result) -> Self {
        InstanceCreationError::UnknownVulkan(value)
    }
}

#[derive(Debug, Error)]
pub enum FetchPhysicalDeviceError {
    #[error("Error fetching physical devices, memory exhaustion")]
    MemoryExhaustion,
    #[error("Error fetching physical devices, Unknown vulkan: {0}")]
    UnknownVulkan(vk::Result),
}

#[derive(Debug, Error)]
pub enum DestroyRawSurfaceError {
    #[error("Surface extension is not loaded")]
    ExtensionNotLoaded,
}

/// The root Vulkan object.
///
/// Objects derived from an instance hold an `Arc<Instance>` so the
/// instance is destroyed last.
pub struct Instance {
    entry: ash::Entry,
    handle: ash::Instance,
    debug_messenger:
        Option<(vk::DebugUtilsMessengerEXT, ash::ext::debug_utils::Instance)>,
    surface_instance: Option<ash::khr::surface::Instance>,
    ver: VkVersion,
}

impl Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("handle", &self.handle.handle())
            .field("version", &self.ver)
            .finish_non_exhaustive()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        tracing::debug!("Dropping instance {:?}", self.handle.handle());
        if let Some((messenger, debug_utils)) = self.debug_messenger.take() {
            //SAFETY: The messenger was created from this instance and this is
            //its last use
            unsafe { debug_utils.destroy_debug_utils_messenger(messenger, None) };
        }
        //SAFETY: Last use of the instance. Every derived object holds an Arc
        //to us so they are already gone
        unsafe { self.handle.destroy_instance(None) };
    }
}

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    //SAFETY: Vulkan guarantees p_callback_data and its message are valid for
    //the duration of the callback
    let message = unsafe { CStr::from_ptr((*p_callback_data).p_message) }
        .to_string_lossy();

    let kind = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "GENERAL",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "VALIDATION",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "PERFORMANCE",
        _ => "UNKNOWN",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            tracing::trace!(target: "rvk-debug-messenger", "[{kind}] {message}")
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            tracing::info!(target: "rvk-debug-messenger", "[{kind}] {message}")
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            tracing::warn!(target: "rvk-debug-messenger", "[{kind}] {message}")
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            tracing::error!(target: "rvk-debug-messenger", "[{kind}] {message}")
        }
        _ => {
            tracing::debug!(target: "rvk-debug-messenger", "[{kind}] {message}")
        }
    }

    vk::FALSE
}

/// Names in `wanted` that do not appear in `available`, in order.
fn missing_names<'a>(
    wanted: &[&'a CStr],
    available: &[vk::ExtensionProperties],
) -> Vec<&'a CStr> {
    wanted
        .iter()
        .copied()
        .filter(|name| {
            !available
                .iter()
                .any(|ext| ext.extension_name_as_c_str() == Ok(*name))
        })
        .collect()
}

impl Instance {
    /// Load Vulkan and create an instance at the highest API version the
    /// loader reports.
    ///
    /// When `max_log_level` is set and both `VK_EXT_debug_utils` and the
    /// Khronos validation layer are installed, validation is enabled and
    /// its output is routed to `tracing`. When they are missing the
    /// instance is still created, just without validation.
    ///
    /// # Safety
    /// Loads the Vulkan shared library through `libloading`, which runs
    /// arbitrary initialisation code from that library.
    pub unsafe fn new(
        app_name: impl AsRef<str>,
        max_log_level: Option<VulkanLogLevel>,
        display_handle_source: Option<&impl HasDisplayHandle>,
        enabled_exts: InstanceExtensions,
    ) -> Result<Self, InstanceCreationError> {
        use InstanceCreationError as Error;

        let app_name = CString::new(app_name.as_ref())
            .map_err(|_| Error::InvalidAppName)?;

        //SAFETY: Burden passed to the caller. Entry is kept alive inside the
        //Instance and therefore outlives every object created through it
        let entry = unsafe { ash::Entry::load() }.map_err(Error::Loading)?;

        //SAFETY: entry is live and this query has no other preconditions
        let api_version = unsafe { entry.try_enumerate_instance_version() }
            .ok()
            .flatten()
            .unwrap_or(vk::API_VERSION_1_0);

        let mut mandatory_exts: Vec<&CStr> = Vec::new();
        if let Some(source) = display_handle_source
            && enabled_exts.surface
        {
            let display = source
                .display_handle()
                .map_err(Error::InvalidDisplayHandle)?;
            let platform_exts =
                ash_window::enumerate_required_extensions(display.as_raw())?;
            mandatory_exts.extend(
                platform_exts
                    .iter()
                    //SAFETY: ash_window documents these as static
                    //NUL-terminated extension names
                    .map(|ptr| unsafe { CStr::from_ptr(*ptr) }),
            );
        }

        //SAFETY: entry is live; None asks for the global extension list
        let available_exts =
            unsafe { entry.enumerate_instance_extension_properties(None) }?;
        //SAFETY: entry is live
        let available_layers =
            unsafe { entry.enumerate_instance_layer_properties() }
                .unwrap_or_default();

        let missing = missing_names(&mandatory_exts, &available_exts);
        if !missing.is_empty() {
            return Err(Error::MissingExtensions(
                missing
                    .iter()
                    .map(|name| name.to_string_lossy().into_owned())
                    .collect(),
            ));
        }

        let debug_utils_name = ash::ext::debug_utils::NAME;
        let can_validate = missing_names(&[debug_utils_name], &available_exts)
            .is_empty()
            && available_layers.iter().any(|layer| {
                layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER_NAME)
            });

        let mut ext_ptrs: Vec<*const std::ffi::c_char> =
            mandatory_exts.iter().map(|ext| ext.as_ptr()).collect();
        let mut layer_ptrs: Vec<*const std::ffi::c_char> = Vec::new();

        let mut messenger_info = match max_log_level {
            Some(level) if can_validate => {
                ext_ptrs.push(debug_utils_name.as_ptr());
                layer_ptrs.push(VALIDATION_LAYER_NAME.as_ptr());
                Some(
                    vk::DebugUtilsMessengerCreateInfoEXT::default()
                        .message_severity(level.severity_flags())
                        .message_type(
                            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                        )
                        .pfn_user_callback(Some(vulkan_debug_callback)),
                )
            }
            Some(_) => {
                tracing::warn!(
                    "Validation requested but VK_EXT_debug_utils or \
                     {VALIDATION_LAYER_NAME:?} is unavailable, continuing \
                     without it"
                );
                None
            }
            None => None,
        };

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"rgpu-device")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(api_version);

        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&ext_ptrs)
            .enabled_layer_names(&layer_ptrs);
        if let Some(ref mut info) = messenger_info {
            create_info = create_info.push_next(info);
        }

        //SAFETY: create_info and everything it points to is alive here
        let handle = unsafe { entry.create_instance(&create_info, None) }?;

        let debug_messenger = messenger_info.and_then(|mut info| {
            info.p_next = std::ptr::null();
            let debug_utils =
                ash::ext::debug_utils::Instance::new(&entry, &handle);
            //SAFETY: info is a complete messenger create info for this
            //instance
            match unsafe {
                debug_utils.create_debug_utils_messenger(&info, None)
            } {
                Ok(messenger) => Some((messenger, debug_utils)),
                Err(e) => {
                    tracing::error!(
                        "Could not create the debug messenger, validation \
                         output will be lost: {e}"
                    );
                    None
                }
            }
        });

        let surface_instance = (enabled_exts.surface
            && display_handle_source.is_some())
        .then(|| ash::khr::surface::Instance::new(&entry, &handle));

        Ok(Instance {
            entry,
            handle,
            debug_messenger,
            surface_instance,
            ver: VkVersion::from_raw(api_version),
        })
    }

    /// The API version reported by the loader at creation time.
    pub fn supported_ver(&self) -> VkVersion {
        self.ver
    }

    /// Whether the debug messenger and validation layer are active.
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    /// Handles to every physical device, in driver enumeration order.
    /// These handles are only valid with this instance.
    pub fn fetch_raw_physical_devices(
        &self,
    ) -> Result<Vec<vk::PhysicalDevice>, FetchPhysicalDeviceError> {
        //SAFETY: The instance is live
        match unsafe { self.handle.enumerate_physical_devices() } {
            Ok(devices) => Ok(devices),
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
            | Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY) => {
                Err(FetchPhysicalDeviceError::MemoryExhaustion)
            }
            Err(e) => Err(FetchPhysicalDeviceError::UnknownVulkan(e)),
        }
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance.
    pub unsafe fn get_raw_physical_device_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties {
        //SAFETY: Caller guarantees provenance
        unsafe { self.handle.get_physical_device_properties(physical_device) }
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance.
    pub unsafe fn get_raw_physical_device_features(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceFeatures {
        //SAFETY: Caller guarantees provenance
        unsafe { self.handle.get_physical_device_features(physical_device) }
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance.
    pub unsafe fn get_raw_physical_device_queue_family_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        //SAFETY: Caller guarantees provenance
        unsafe {
            self.handle
                .get_physical_device_queue_family_properties(physical_device)
        }
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance.
    pub unsafe fn enumerate_raw_device_extension_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::ExtensionProperties>, vk::Result> {
        //SAFETY: Caller guarantees provenance
        unsafe {
            self.handle
                .enumerate_device_extension_properties(physical_device)
        }
    }

    /// # Safety
    /// `physical_device` must be a valid handle derived from this instance
    /// and everything `create_info` points to must be alive for the call.
    pub unsafe fn create_ash_device(
        &self,
        physical_device: vk::PhysicalDevice,
        create_info: &vk::DeviceCreateInfo<'_>,
    ) -> Result<ash::Device, vk::Result> {
        //SAFETY: Caller guarantees provenance and create_info validity
        unsafe {
            self.handle
                .create_device(physical_device, create_info, None)
        }
    }
}

// Surface extension functionality
impl Instance {
    ///Create a raw VkSurfaceKHR.
    ///
    /// # Safety
    /// The surface must be destroyed before `source` goes away or is
    /// invalidated (for example on a winit suspend), and only used with
    /// this instance.
    pub unsafe fn create_raw_surface<T: HasDisplayHandle + HasWindowHandle>(
        &self,
        source: &T,
    ) -> Result<vk::SurfaceKHR, CreateSurfaceError> {
        use CreateSurfaceError as Error;
        if self.surface_instance.is_none() {
            return Err(Error::MissingExtension);
        }
        let display = source
            .display_handle()
            .map_err(Error::InvalidDisplayHandle)?;
        let window = source.window_handle().map_err(Error::InvalidWindowHandle)?;
        //SAFETY: The surface extensions are enabled and the handles were just
        //obtained from a live source
        unsafe {
            ash_window::create_surface(
                &self.entry,
                &self.handle,
                display.as_raw(),
                window.as_raw(),
                None,
            )
        }
        .map_err(Error::VulkanError)
    }

    /// # Safety
    /// `surf` must come from this instance, every object derived from it
    /// must already be destroyed, and it must not be used afterwards.
    pub unsafe fn destroy_raw_surface(
        &self,
        surf: vk::SurfaceKHR,
    ) -> Result<(), DestroyRawSurfaceError> {
        let surface_instance = self
            .surface_instance
            .as_ref()
            .ok_or(DestroyRawSurfaceError::ExtensionNotLoaded)?;
        //SAFETY: Caller guarantees provenance and drop ordering
        unsafe { surface_instance.destroy_surface(surf, None) };
        Ok(())
    }

    /// # Safety
    /// `physical_device` and `surface` must both be derived from this
    /// instance.
    pub unsafe fn get_raw_physical_device_surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> Result<bool, SurfaceSupportError> {
        let surface_instance = self
            .surface_instance
            .as_ref()
            .ok_or(SurfaceSupportError::ExtensionNotLoaded)?;
        //SAFETY: Caller guarantees provenance
        unsafe {
            surface_instance.get_physical_device_surface_support(
                physical_device,
                queue_family_index,
                surface,
            )
        }
        .map_err(SurfaceSupportError::Vulkan)
    }

    /// # Safety
    /// `physical_device` and `surface` must both be derived from this
    /// instance.
    pub unsafe fn get_surface_formats(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, SurfaceQueryError> {
        let surface_instance = self
            .surface_instance
            .as_ref()
            .ok_or(SurfaceQueryError::ExtensionNotLoaded)?;
        //SAFETY: Caller guarantees provenance
        unsafe {
            surface_instance
                .get_physical_device_surface_formats(physical_device, surface)
        }
        .map_err(SurfaceQueryError::Vulkan)
    }

    /// # Safety
    /// `physical_device` and `surface` must both be derived from this
    /// instance.
    pub unsafe fn get_surface_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::PresentModeKHR>, SurfaceQueryError> {
        let surface_instance = self
            .surface_instance
            .as_ref()
            .ok_or(SurfaceQueryError::ExtensionNotLoaded)?;
        //SAFETY: Caller guarantees provenance
        unsafe {
            surface_instance.get_physical_device_surface_present_modes(
                physical_device,
                surface,
            )
        }
        .map_err(SurfaceQueryError::Vulkan)
    }
}
