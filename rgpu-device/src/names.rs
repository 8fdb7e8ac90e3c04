//! Human-readable labels for the vendor id and device type reported in
//! `vk::PhysicalDeviceProperties`.

use ash::vk;

/// Fallback label for ids and types not in the tables below.
pub const UNKNOWN: &str = "unknown";

/// Map a PCI vendor id to a short vendor name.
pub fn vendor_name(vendor_id: u32) -> &'static str {
    match vendor_id {
        0x1002 => "AMD",
        0x1010 => "ImgTec",
        0x10DE => "NVIDIA",
        0x13B5 => "ARM",
        0x5143 => "Qualcomm",
        0x8086 => "Intel",
        _ => UNKNOWN,
    }
}

pub fn device_type_name(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::OTHER => "VK_PHYSICAL_DEVICE_TYPE_OTHER",
        vk::PhysicalDeviceType::INTEGRATED_GPU => {
            "VK_PHYSICAL_DEVICE_TYPE_INTEGRATED_GPU"
        }
        vk::PhysicalDeviceType::DISCRETE_GPU => {
            "VK_PHYSICAL_DEVICE_TYPE_DISCRETE_GPU"
        }
        vk::PhysicalDeviceType::VIRTUAL_GPU => {
            "VK_PHYSICAL_DEVICE_TYPE_VIRTUAL_GPU"
        }
        vk::PhysicalDeviceType::CPU => "VK_PHYSICAL_DEVICE_TYPE_CPU",
        _ => UNKNOWN,
    }
}
