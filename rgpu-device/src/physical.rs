//! Physical device evaluation and selection.
//!
//! Selection is a single linear walk over the devices in driver order
//! that stops at the first acceptable one. A candidate is considered
//! right away if it passes the selection gate:
//!
//! - it is the device the caller asked for, or
//! - the caller asked for nothing and it is a discrete GPU, or
//! - it is the only device.
//!
//! Candidates that fail the gate are not queried any further during the
//! walk. When the caller asked for nothing and the walk ends without an
//! accepted device, they are evaluated afterwards in the same order, so a
//! machine whose only discrete GPU lacks something still comes up on its
//! integrated one. A device the caller asked for by index is never
//! replaced by another one.
//!
//! Everything the evaluator needs from Vulkan goes through
//! [`PhysicalDeviceQueries`], which [`Surface`] implements.

use std::ffi::{CStr, CString};

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use thiserror::Error;

use crate::{
    device::REQUIRED_DEVICE_EXTENSIONS,
    extensions::device_supports_extensions,
    instance::{FetchPhysicalDeviceError, VkVersion},
    names::{self, UNKNOWN},
    queue_family::{QueueFamilyIndices, ResolvedQueueFamilies},
    surface::{Surface, SurfaceQueryError, SurfaceSupportError},
};

/// Read-only device queries used during selection, all against one
/// instance and one presentable surface.
///
/// Handles returned by [`enumerate_physical_devices`] are valid for every
/// other method of the same implementor.
///
/// [`enumerate_physical_devices`]:
/// PhysicalDeviceQueries::enumerate_physical_devices
pub trait PhysicalDeviceQueries {
    fn enumerate_physical_devices(
        &self,
    ) -> Result<Vec<vk::PhysicalDevice>, FetchPhysicalDeviceError>;

    /// # Safety
    /// `device` must come from [`Self::enumerate_physical_devices`].
    unsafe fn properties(
        &self,
        device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties;

    /// # Safety
    /// `device` must come from [`Self::enumerate_physical_devices`].
    unsafe fn features(
        &self,
        device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceFeatures;

    /// # Safety
    /// `device` must come from [`Self::enumerate_physical_devices`].
    unsafe fn queue_families(
        &self,
        device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties>;

    /// Names of every extension the device supports.
    ///
    /// # Safety
    /// `device` must come from [`Self::enumerate_physical_devices`].
    unsafe fn extension_names(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<Vec<CString>, vk::Result>;

    /// # Safety
    /// `device` must come from [`Self::enumerate_physical_devices`].
    unsafe fn supports_present(
        &self,
        device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> Result<bool, SurfaceSupportError>;

    /// # Safety
    /// `device` must come from [`Self::enumerate_physical_devices`].
    unsafe fn surface_formats(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, SurfaceQueryError>;

    /// # Safety
    /// `device` must come from [`Self::enumerate_physical_devices`].
    unsafe fn present_modes(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::PresentModeKHR>, SurfaceQueryError>;
}

impl<T: HasWindowHandle + HasDisplayHandle> PhysicalDeviceQueries
    for Surface<T>
{
    fn enumerate_physical_devices(
        &self,
    ) -> Result<Vec<vk::PhysicalDevice>, FetchPhysicalDeviceError> {
        self.parent().fetch_raw_physical_devices()
    }

    unsafe fn properties(
        &self,
        device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties {
        //SAFETY: Enumerated from our parent instance
        unsafe { self.parent().get_raw_physical_device_properties(device) }
    }

    unsafe fn features(
        &self,
        device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceFeatures {
        //SAFETY: Enumerated from our parent instance
        unsafe { self.parent().get_raw_physical_device_features(device) }
    }

    unsafe fn queue_families(
        &self,
        device: vk::PhysicalDevice,
    ) -> Vec<vk::QueueFamilyProperties> {
        //SAFETY: Enumerated from our parent instance
        unsafe {
            self.parent()
                .get_raw_physical_device_queue_family_properties(device)
        }
    }

    unsafe fn extension_names(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<Vec<CString>, vk::Result> {
        //SAFETY: Enumerated from our parent instance
        let props = unsafe {
            self.parent().enumerate_raw_device_extension_properties(device)
        }?;
        Ok(props
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .map(CStr::to_owned)
            .collect())
    }

    unsafe fn supports_present(
        &self,
        device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> Result<bool, SurfaceSupportError> {
        //SAFETY: Enumerated from our parent instance
        unsafe { self.supports_queue_family(device, queue_family_index) }
    }

    unsafe fn surface_formats(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, SurfaceQueryError> {
        //SAFETY: Enumerated from our parent instance
        unsafe { self.query_formats(device) }
    }

    unsafe fn present_modes(
        &self,
        device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::PresentModeKHR>, SurfaceQueryError> {
        //SAFETY: Enumerated from our parent instance
        unsafe { self.query_present_modes(device) }
    }
}

#[derive(Debug, Error)]
pub enum SelectDeviceError {
    #[error("No Vulkan-capable devices found")]
    NoDevices,
    #[error("Could not find a suitable physical device among {0} candidate(s)")]
    NoSuitableDevice(usize),
    #[error(transparent)]
    Fetch(#[from] FetchPhysicalDeviceError),
    #[error("Error checking present support: {0}")]
    SurfaceSupport(#[from] SurfaceSupportError),
}

/// The physical device chosen for bring-up, with the queue families
/// that will be requested from it.
#[derive(Debug, Clone)]
pub struct SelectedPhysicalDevice {
    handle: vk::PhysicalDevice,
    index: usize,
    properties: vk::PhysicalDeviceProperties,
    features: vk::PhysicalDeviceFeatures,
    queue_families: ResolvedQueueFamilies,
}

impl SelectedPhysicalDevice {
    pub fn raw_handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    /// Position in the driver's enumeration order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    /// Every feature the device reports, not just the enabled ones.
    pub fn features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.features
    }

    pub fn queue_families(&self) -> ResolvedQueueFamilies {
        self.queue_families
    }

    pub fn name(&self) -> String {
        device_name(&self.properties)
    }

    pub fn vendor_name(&self) -> &'static str {
        names::vendor_name(self.properties.vendor_id)
    }

    pub fn device_type_name(&self) -> &'static str {
        names::device_type_name(self.properties.device_type)
    }

    pub fn api_version(&self) -> VkVersion {
        VkVersion::from_raw(self.properties.api_version)
    }
}

/// One line of `--list-devices` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalDeviceSummary {
    pub index: usize,
    pub name: String,
    pub vendor_name: &'static str,
    pub device_type_name: &'static str,
    pub api_version: VkVersion,
}

fn device_name(props: &vk::PhysicalDeviceProperties) -> String {
    props
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| UNKNOWN.to_owned())
}

pub fn passes_selection_gate(
    index: usize,
    device_type: vk::PhysicalDeviceType,
    preferred: Option<usize>,
    count: usize,
) -> bool {
    match preferred {
        Some(preferred) if preferred == index => true,
        None if device_type == vk::PhysicalDeviceType::DISCRETE_GPU => true,
        _ => count == 1,
    }
}

/// Run the acceptance checks on a single candidate.
///
/// `Ok(None)` is a rejection. The only error is a failed present-support
/// query.
///
/// # Safety
/// `device` must come from `queries.enumerate_physical_devices()`.
unsafe fn evaluate_candidate<Q: PhysicalDeviceQueries + ?Sized>(
    queries: &Q,
    index: usize,
    device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
) -> Result<Option<SelectedPhysicalDevice>, SurfaceSupportError> {
    let name = properties.device_name_as_c_str().unwrap_or(c"unknown");

    //SAFETY: Caller guarantees provenance
    let families = unsafe { queries.queue_families(device) };
    if families.is_empty() {
        tracing::debug!("Skipping {name:?}: no queue families");
        return Ok(None);
    }

    //SAFETY: Caller guarantees provenance
    if !unsafe {
        device_supports_extensions(queries, device, REQUIRED_DEVICE_EXTENSIONS)
    } {
        tracing::debug!(
            "Skipping {name:?}: missing one of {REQUIRED_DEVICE_EXTENSIONS:?}"
        );
        return Ok(None);
    }

    //SAFETY: Caller guarantees provenance
    let features = unsafe { queries.features(device) };
    if features.sampler_anisotropy != vk::TRUE
        || features.fill_mode_non_solid != vk::TRUE
    {
        tracing::debug!(
            "Skipping {name:?}: needs samplerAnisotropy and fillModeNonSolid"
        );
        return Ok(None);
    }

    //SAFETY: Caller guarantees provenance
    let format_count = match unsafe { queries.surface_formats(device) } {
        Ok(formats) => formats.len(),
        Err(e) => {
            tracing::debug!("Failed to query surface formats of {name:?}: {e}");
            0
        }
    };
    //SAFETY: Caller guarantees provenance
    let mode_count = match unsafe { queries.present_modes(device) } {
        Ok(modes) => modes.len(),
        Err(e) => {
            tracing::debug!("Failed to query present modes of {name:?}: {e}");
            0
        }
    };
    if format_count == 0 || mode_count == 0 {
        tracing::debug!(
            "Skipping {name:?}: {format_count} surface format(s), \
             {mode_count} present mode(s)"
        );
        return Ok(None);
    }

    let indices = QueueFamilyIndices::resolve(&families, |family| {
        //SAFETY: Caller guarantees provenance
        unsafe { queries.supports_present(device, family) }
    })?;
    let Some(queue_families) = indices.complete() else {
        tracing::debug!(
            "Skipping {name:?}: no graphics or no present queue family \
             ({indices:?})"
        );
        return Ok(None);
    };

    Ok(Some(SelectedPhysicalDevice {
        handle: device,
        index,
        properties,
        features,
        queue_families,
    }))
}

/// Pick the physical device to bring up.
///
/// `preferred` is an index into the enumeration order. An index past the
/// end is treated as no preference.
pub fn select_physical_device<Q: PhysicalDeviceQueries + ?Sized>(
    queries: &Q,
    preferred: Option<usize>,
) -> Result<SelectedPhysicalDevice, SelectDeviceError> {
    let devices = queries.enumerate_physical_devices()?;
    let count = devices.len();
    if count == 0 {
        return Err(SelectDeviceError::NoDevices);
    }
    tracing::info!("Found {count} Vulkan-capable device(s)");

    let preferred = match preferred {
        Some(idx) if idx >= count => {
            tracing::debug!(
                "Preferred device {idx} is out of range, ignoring it"
            );
            None
        }
        other => other,
    };

    let mut deferred = Vec::new();
    for (index, &device) in devices.iter().enumerate() {
        //SAFETY: device was just enumerated through queries
        let properties = unsafe { queries.properties(device) };
        if !passes_selection_gate(index, properties.device_type, preferred, count)
        {
            if preferred.is_none() {
                deferred.push((index, device, properties));
            }
            continue;
        }
        //SAFETY: device was just enumerated through queries
        if let Some(selected) =
            unsafe { evaluate_candidate(queries, index, device, properties) }?
        {
            return Ok(selected);
        }
    }

    for (index, device, properties) in deferred {
        tracing::debug!(
            "Falling back to {:?}",
            properties.device_name_as_c_str().unwrap_or(c"unknown")
        );
        //SAFETY: device was just enumerated through queries
        if let Some(selected) =
            unsafe { evaluate_candidate(queries, index, device, properties) }?
        {
            return Ok(selected);
        }
    }

    Err(SelectDeviceError::NoSuitableDevice(count))
}

/// Summaries of every enumerated device, in enumeration order.
pub fn list_physical_devices<Q: PhysicalDeviceQueries + ?Sized>(
    queries: &Q,
) -> Result<Vec<PhysicalDeviceSummary>, FetchPhysicalDeviceError> {
    let devices = queries.enumerate_physical_devices()?;
    Ok(devices
        .into_iter()
        .enumerate()
        .map(|(index, device)| {
            //SAFETY: device was just enumerated through queries
            let props = unsafe { queries.properties(device) };
            PhysicalDeviceSummary {
                index,
                name: device_name(&props),
                vendor_name: names::vendor_name(props.vendor_id),
                device_type_name: names::device_type_name(props.device_type),
                api_version: VkVersion::from_raw(props.api_version),
            }
        })
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;

    use ash::vk::Handle;

    use super::*;
    use crate::queue_family::tests::family;

    const UNIVERSAL: vk::QueueFlags = vk::QueueFlags::from_raw(
        vk::QueueFlags::GRAPHICS.as_raw()
            | vk::QueueFlags::COMPUTE.as_raw()
            | vk::QueueFlags::TRANSFER.as_raw(),
    );

    /// What a fake physical device reports.
    #[derive(Debug, Clone)]
    pub(crate) struct FakeDevice {
        pub properties: vk::PhysicalDeviceProperties,
        pub features: vk::PhysicalDeviceFeatures,
        pub families: Vec<vk::QueueFamilyProperties>,
        pub present: Vec<bool>,
        pub present_fault: Option<u32>,
        pub extensions: Result<Vec<CString>, vk::Result>,
        pub formats: Result<usize, vk::Result>,
        pub present_modes: usize,
    }

    impl FakeDevice {
        /// A device that passes every check with one universal family.
        pub(crate) fn suitable(
            name: &CStr,
            device_type: vk::PhysicalDeviceType,
        ) -> Self {
            Self {
                properties: vk::PhysicalDeviceProperties {
                    device_type,
                    vendor_id: 0x10DE,
                    api_version: vk::make_api_version(0, 1, 3, 0),
                    ..Default::default()
                }
                .device_name(name)
                .unwrap(),
                features: vk::PhysicalDeviceFeatures {
                    sampler_anisotropy: vk::TRUE,
                    fill_mode_non_solid: vk::TRUE,
                    ..Default::default()
                },
                families: vec![family(UNIVERSAL, 16)],
                present: vec![true],
                present_fault: None,
                extensions: Ok(vec![
                    c"VK_KHR_maintenance1".to_owned(),
                    ash::khr::swapchain::NAME.to_owned(),
                ]),
                formats: Ok(2),
                present_modes: 1,
            }
        }

        pub(crate) fn with_families(
            mut self,
            families: Vec<vk::QueueFamilyProperties>,
            present: Vec<bool>,
        ) -> Self {
            self.families = families;
            self.present = present;
            self
        }
    }

    /// Answers queries from a fixed list of devices and records which
    /// devices had their extensions queried.
    pub(crate) struct FakeQueries {
        pub devices: Vec<FakeDevice>,
        pub extension_queries: RefCell<Vec<usize>>,
    }

    impl FakeQueries {
        pub(crate) fn new(devices: Vec<FakeDevice>) -> Self {
            Self {
                devices,
                extension_queries: RefCell::new(Vec::new()),
            }
        }

        fn get(&self, device: vk::PhysicalDevice) -> (usize, &FakeDevice) {
            let idx = device.as_raw() as usize - 1;
            (idx, &self.devices[idx])
        }
    }

    impl PhysicalDeviceQueries for FakeQueries {
        fn enumerate_physical_devices(
            &self,
        ) -> Result<Vec<vk::PhysicalDevice>, FetchPhysicalDeviceError> {
            Ok((1..=self.devices.len() as u64)
                .map(vk::PhysicalDevice::from_raw)
                .collect())
        }

        unsafe fn properties(
            &self,
            device: vk::PhysicalDevice,
        ) -> vk::PhysicalDeviceProperties {
            self.get(device).1.properties
        }

        unsafe fn features(
            &self,
            device: vk::PhysicalDevice,
        ) -> vk::PhysicalDeviceFeatures {
            self.get(device).1.features
        }

        unsafe fn queue_families(
            &self,
            device: vk::PhysicalDevice,
        ) -> Vec<vk::QueueFamilyProperties> {
            self.get(device).1.families.clone()
        }

        unsafe fn extension_names(
            &self,
            device: vk::PhysicalDevice,
        ) -> Result<Vec<CString>, vk::Result> {
            let (idx, fake) = self.get(device);
            self.extension_queries.borrow_mut().push(idx);
            fake.extensions.clone()
        }

        unsafe fn supports_present(
            &self,
            device: vk::PhysicalDevice,
            queue_family_index: u32,
        ) -> Result<bool, SurfaceSupportError> {
            let fake = self.get(device).1;
            if fake.present_fault == Some(queue_family_index) {
                return Err(SurfaceSupportError::Vulkan(
                    vk::Result::ERROR_SURFACE_LOST_KHR,
                ));
            }
            Ok(fake.present[queue_family_index as usize])
        }

        unsafe fn surface_formats(
            &self,
            device: vk::PhysicalDevice,
        ) -> Result<Vec<vk::SurfaceFormatKHR>, SurfaceQueryError> {
            match self.get(device).1.formats {
                Ok(n) => Ok(vec![vk::SurfaceFormatKHR::default(); n]),
                Err(e) => Err(SurfaceQueryError::Vulkan(e)),
            }
        }

        unsafe fn present_modes(
            &self,
            device: vk::PhysicalDevice,
        ) -> Result<Vec<vk::PresentModeKHR>, SurfaceQueryError> {
            Ok(vec![vk::PresentModeKHR::FIFO; self.get(device).1.present_modes])
        }
    }

    const DISCRETE: vk::PhysicalDeviceType =
        vk::PhysicalDeviceType::DISCRETE_GPU;
    const INTEGRATED: vk::PhysicalDeviceType =
        vk::PhysicalDeviceType::INTEGRATED_GPU;

    #[test]
    fn selection_gate() {
        // Preferred index wins regardless of type
        assert!(passes_selection_gate(1, INTEGRATED, Some(1), 3));
        assert!(!passes_selection_gate(0, DISCRETE, Some(1), 3));
        // No preference favours discrete devices
        assert!(passes_selection_gate(2, DISCRETE, None, 3));
        assert!(!passes_selection_gate(0, INTEGRATED, None, 3));
        // A lone device always passes
        assert!(passes_selection_gate(0, INTEGRATED, None, 1));
        assert!(passes_selection_gate(
            0,
            vk::PhysicalDeviceType::CPU,
            Some(0),
            1
        ));
    }

    #[test]
    fn no_devices_is_an_error() {
        let queries = FakeQueries::new(vec![]);
        assert!(matches!(
            select_physical_device(&queries, None),
            Err(SelectDeviceError::NoDevices)
        ));
    }

    #[test]
    fn lone_integrated_device_is_accepted() {
        let queries =
            FakeQueries::new(vec![FakeDevice::suitable(c"iGPU", INTEGRATED)]);
        let selected = select_physical_device(&queries, None).unwrap();

        assert_eq!(selected.index(), 0);
        assert_eq!(selected.name(), "iGPU");
        assert_eq!(selected.device_type_name(), "VK_PHYSICAL_DEVICE_TYPE_INTEGRATED_GPU");
    }

    #[test]
    fn rejected_discrete_falls_through_to_integrated() {
        let mut discrete = FakeDevice::suitable(c"dGPU", DISCRETE);
        discrete.extensions = Ok(vec![c"VK_KHR_maintenance1".to_owned()]);
        let queries = FakeQueries::new(vec![
            discrete,
            FakeDevice::suitable(c"iGPU", INTEGRATED),
        ]);
        let selected = select_physical_device(&queries, None).unwrap();

        assert_eq!(selected.index(), 1);
        assert_eq!(*queries.extension_queries.borrow(), vec![0, 1]);
    }

    #[test]
    fn discrete_is_preferred_and_gated_devices_are_not_queried() {
        let queries = FakeQueries::new(vec![
            FakeDevice::suitable(c"iGPU", INTEGRATED),
            FakeDevice::suitable(c"dGPU", DISCRETE),
        ]);
        let selected = select_physical_device(&queries, None).unwrap();

        assert_eq!(selected.index(), 1);
        assert_eq!(*queries.extension_queries.borrow(), vec![1]);
    }

    #[test]
    fn preferred_index_is_honoured() {
        let queries = FakeQueries::new(vec![
            FakeDevice::suitable(c"dGPU", DISCRETE),
            FakeDevice::suitable(c"iGPU", INTEGRATED),
        ]);
        let selected = select_physical_device(&queries, Some(1)).unwrap();

        assert_eq!(selected.index(), 1);
        assert_eq!(*queries.extension_queries.borrow(), vec![1]);
    }

    #[test]
    fn rejected_preferred_device_is_not_replaced() {
        let mut integrated = FakeDevice::suitable(c"iGPU", INTEGRATED);
        integrated.extensions = Ok(vec![]);
        let queries = FakeQueries::new(vec![
            integrated,
            FakeDevice::suitable(c"dGPU", DISCRETE),
        ]);

        assert!(matches!(
            select_physical_device(&queries, Some(0)),
            Err(SelectDeviceError::NoSuitableDevice(2))
        ));
        assert_eq!(*queries.extension_queries.borrow(), vec![0]);
    }

    #[test]
    fn out_of_range_preference_means_no_preference() {
        let queries = FakeQueries::new(vec![
            FakeDevice::suitable(c"iGPU", INTEGRATED),
            FakeDevice::suitable(c"dGPU", DISCRETE),
        ]);
        let selected = select_physical_device(&queries, Some(7)).unwrap();

        assert_eq!(selected.index(), 1);
    }

    #[test]
    fn missing_features_reject() {
        let mut no_wireframe = FakeDevice::suitable(c"GPU", DISCRETE);
        no_wireframe.features.fill_mode_non_solid = vk::FALSE;
        let mut no_aniso = FakeDevice::suitable(c"GPU", DISCRETE);
        no_aniso.features.sampler_anisotropy = vk::FALSE;

        for device in [no_wireframe, no_aniso] {
            let queries = FakeQueries::new(vec![device]);
            assert!(matches!(
                select_physical_device(&queries, None),
                Err(SelectDeviceError::NoSuitableDevice(1))
            ));
        }
    }

    #[test]
    fn surface_without_formats_or_modes_rejects() {
        let mut no_formats = FakeDevice::suitable(c"GPU", DISCRETE);
        no_formats.formats = Ok(0);
        let mut format_fault = FakeDevice::suitable(c"GPU", DISCRETE);
        format_fault.formats = Err(vk::Result::ERROR_SURFACE_LOST_KHR);
        let mut no_modes = FakeDevice::suitable(c"GPU", DISCRETE);
        no_modes.present_modes = 0;

        for device in [no_formats, format_fault, no_modes] {
            let queries = FakeQueries::new(vec![device]);
            assert!(matches!(
                select_physical_device(&queries, None),
                Err(SelectDeviceError::NoSuitableDevice(1))
            ));
        }
    }

    #[test]
    fn extension_query_failure_rejects() {
        let mut device = FakeDevice::suitable(c"GPU", DISCRETE);
        device.extensions = Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        let queries = FakeQueries::new(vec![device]);

        assert!(matches!(
            select_physical_device(&queries, None),
            Err(SelectDeviceError::NoSuitableDevice(1))
        ));
    }

    #[test]
    fn zero_queue_families_reject_without_further_queries() {
        let device = FakeDevice::suitable(c"GPU", DISCRETE)
            .with_families(vec![], vec![]);
        let queries = FakeQueries::new(vec![device]);

        assert!(matches!(
            select_physical_device(&queries, None),
            Err(SelectDeviceError::NoSuitableDevice(1))
        ));
        assert!(queries.extension_queries.borrow().is_empty());
    }

    #[test]
    fn no_present_family_rejects() {
        let device = FakeDevice::suitable(c"GPU", DISCRETE)
            .with_families(vec![family(UNIVERSAL, 1)], vec![false]);
        let queries = FakeQueries::new(vec![device]);

        assert!(matches!(
            select_physical_device(&queries, None),
            Err(SelectDeviceError::NoSuitableDevice(1))
        ));
    }

    #[test]
    fn present_query_fault_is_fatal() {
        let mut broken = FakeDevice::suitable(c"dGPU", DISCRETE);
        broken.present_fault = Some(0);
        let queries = FakeQueries::new(vec![
            broken,
            FakeDevice::suitable(c"dGPU 2", DISCRETE),
        ]);

        assert!(matches!(
            select_physical_device(&queries, None),
            Err(SelectDeviceError::SurfaceSupport(
                SurfaceSupportError::Vulkan(vk::Result::ERROR_SURFACE_LOST_KHR)
            ))
        ));
    }

    #[test]
    fn combined_family_wins_present_over_later_present_only_family() {
        let device = FakeDevice::suitable(c"GPU", DISCRETE).with_families(
            vec![family(UNIVERSAL, 1), family(vk::QueueFlags::empty(), 1)],
            vec![true, true],
        );
        let queries = FakeQueries::new(vec![device]);
        let families =
            select_physical_device(&queries, None).unwrap().queue_families();

        assert_eq!(families.graphics, 0);
        assert_eq!(families.present, 0);
    }

    #[test]
    fn transfer_falls_back_to_graphics() {
        let device = FakeDevice::suitable(c"GPU", DISCRETE).with_families(
            vec![
                family(vk::QueueFlags::COMPUTE, 1),
                family(UNIVERSAL, 4),
            ],
            vec![false, true],
        );
        let queries = FakeQueries::new(vec![device]);
        let families =
            select_physical_device(&queries, None).unwrap().queue_families();

        assert_eq!(families.graphics, 1);
        assert_eq!(families.transfer, families.graphics);
    }

    #[test]
    fn selection_is_deterministic() {
        let devices = vec![
            FakeDevice::suitable(c"iGPU", INTEGRATED),
            FakeDevice::suitable(c"dGPU", DISCRETE).with_families(
                vec![
                    family(UNIVERSAL, 16),
                    family(vk::QueueFlags::TRANSFER, 2),
                    family(vk::QueueFlags::empty(), 1),
                ],
                vec![false, false, true],
            ),
            FakeDevice::suitable(c"dGPU 2", DISCRETE),
        ];
        let queries = FakeQueries::new(devices);
        let first = select_physical_device(&queries, None).unwrap();
        let second = select_physical_device(&queries, None).unwrap();

        assert_eq!(first.index(), 1);
        assert_eq!(first.index(), second.index());
        assert_eq!(first.queue_families(), second.queue_families());
        assert_eq!(
            first.queue_families(),
            ResolvedQueueFamilies {
                graphics: 0,
                present: 2,
                transfer: 1,
            }
        );
    }

    #[test]
    fn lists_every_device() {
        let mut amd = FakeDevice::suitable(c"Radeon", INTEGRATED);
        amd.properties.vendor_id = 0x1002;
        amd.properties.api_version = vk::make_api_version(0, 1, 2, 0);
        let queries = FakeQueries::new(vec![
            FakeDevice::suitable(c"GeForce", DISCRETE),
            amd,
        ]);
        let listed = list_physical_devices(&queries).unwrap();

        assert_eq!(
            listed,
            vec![
                PhysicalDeviceSummary {
                    index: 0,
                    name: "GeForce".into(),
                    vendor_name: "NVIDIA",
                    device_type_name: "VK_PHYSICAL_DEVICE_TYPE_DISCRETE_GPU",
                    api_version: VkVersion::new(0, 1, 3, 0),
                },
                PhysicalDeviceSummary {
                    index: 1,
                    name: "Radeon".into(),
                    vendor_name: "AMD",
                    device_type_name: "VK_PHYSICAL_DEVICE_TYPE_INTEGRATED_GPU",
                    api_version: VkVersion::new(0, 1, 2, 0),
                },
            ]
        );
        assert!(queries.extension_queries.borrow().is_empty());
    }
}
