//! Vulkan device bring-up on top of [`ash`]: pick a physical device that
//! can present to a window, create a logical device on it and fetch its
//! graphics, present and transfer queues.
//!
//! > **Personal project.** This crate is not intended for general use
//! > and makes no API stability guarantees.
//!
//! # Object hierarchy
//!
//! ```text
//! Instance
//! ├── Surface<T>
//! └── Device (queues, selected physical device)
//! ```
//!
//! Each wrapper holds its parent via `Arc` so parents cannot be
//! destroyed while children are alive.
//!
//! # Bring-up
//!
//! ```text
//! Device::create_compatible
//! ├── select_physical_device            physical
//! │   ├── device_supports_extensions    extensions
//! │   └── QueueFamilyIndices::resolve   queue_family
//! ├── DeviceCreatePlan::create          device
//! └── DeviceQueues::retrieve            device
//! ```
//!
//! # Naming conventions
//!
//! | prefix  | meaning                                   |
//! |---------|-------------------------------------------|
//! | `raw_*` | accepts or returns a raw `ash::vk` handle |
//! | `ash_*` | returns the `ash` wrapper object          |

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

pub mod config;
pub mod device;
pub mod extensions;
pub mod instance;
pub mod names;
pub mod physical;
pub mod queue_family;
pub mod surface;

pub use ash;
pub use raw_window_handle::HandleError as RwhHandleError;

pub use config::DeviceSelectConfig;
pub use device::{CreateCompatibleError, Device, DeviceQueues};
pub use instance::{Instance, InstanceExtensions, VkVersion, VulkanLogLevel};
pub use physical::{
    PhysicalDeviceSummary, SelectedPhysicalDevice, list_physical_devices,
};
pub use surface::Surface;
