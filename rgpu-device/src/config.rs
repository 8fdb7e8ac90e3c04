//! Caller-side settings for device selection.

use serde::Deserialize;

/// Caller-side knobs for [`Device::create_compatible`].
///
/// Deserializes from a table like
///
/// ```toml
/// preferred_device = 1
/// validation = true
/// ```
///
/// with every key optional.
///
/// [`Device::create_compatible`]: crate::device::Device::create_compatible
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceSelectConfig {
    /// Index into the driver's device enumeration order. `None`, or an
    /// index past the end, means pick a discrete GPU if possible.
    pub preferred_device: Option<usize>,
    /// Request the validation layer on the logical device.
    pub validation: bool,
}

impl DeviceSelectConfig {
    /// Build from a signed index where any negative value means "no
    /// preference".
    pub fn from_legacy_index(index: i64, validation: bool) -> Self {
        Self {
            preferred_device: usize::try_from(index).ok(),
            validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_index_is_no_preference() {
        assert_eq!(
            DeviceSelectConfig::from_legacy_index(-1, false),
            DeviceSelectConfig::default()
        );
        assert_eq!(
            DeviceSelectConfig::from_legacy_index(i64::MIN, true)
                .preferred_device,
            None
        );
    }

    #[test]
    fn non_negative_index_is_kept() {
        assert_eq!(
            DeviceSelectConfig::from_legacy_index(2, true),
            DeviceSelectConfig {
                preferred_device: Some(2),
                validation: true,
            }
        );
    }
}
