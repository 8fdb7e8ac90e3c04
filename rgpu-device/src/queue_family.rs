//! Queue family role resolution.
//!
//! Three roles are resolved in one pass over the device's families:
//! graphics, present and a transfer-only family. Each role takes the
//! first family that qualifies. Families are not scored, so a later
//! family that could serve graphics and present together is not sought
//! out.

use ash::vk;

/// Queue family indices found so far. `None` means nothing qualified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
    pub transfer: Option<u32>,
}

/// Queue families for a device that passed resolution. Graphics and
/// present are always present here; transfer falls back to graphics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedQueueFamilies {
    pub graphics: u32,
    pub present: u32,
    pub transfer: u32,
}

impl QueueFamilyIndices {
    /// Scan `families` in order.
    ///
    /// `supports_present` is called once for every family, in index
    /// order, and its first error aborts the scan.
    pub fn resolve<E>(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> Result<bool, E>,
    ) -> Result<Self, E> {
        let mut indices = Self::default();

        for (idx, family) in (0u32..).zip(families) {
            let present = supports_present(idx)?;
            if family.queue_count == 0 {
                continue;
            }

            if indices.present.is_none() && present {
                indices.present = Some(idx);
            }

            let flags = family.queue_flags;
            if indices.graphics.is_none()
                && flags.contains(vk::QueueFlags::GRAPHICS)
            {
                indices.graphics = Some(idx);
            }
            if indices.transfer.is_none()
                && flags.contains(vk::QueueFlags::TRANSFER)
                && !flags.contains(vk::QueueFlags::GRAPHICS)
            {
                indices.transfer = Some(idx);
            }
        }

        Ok(indices)
    }

    /// Resolved families, or `None` if graphics or present is missing.
    pub fn complete(&self) -> Option<ResolvedQueueFamilies> {
        let graphics = self.graphics?;
        let present = self.present?;
        Some(ResolvedQueueFamilies {
            graphics,
            present,
            transfer: self.transfer.unwrap_or(graphics),
        })
    }
}

impl ResolvedQueueFamilies {
    /// Distinct families in request order: graphics, then present, then
    /// transfer, each skipped if it repeats an earlier one.
    pub fn unique(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(3);
        families.push(self.graphics);
        if self.present != self.graphics {
            families.push(self.present);
        }
        if self.transfer != self.graphics && self.transfer != self.present {
            families.push(self.transfer);
        }
        families
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::convert::Infallible;

    use super::*;

    pub(crate) fn family(
        flags: vk::QueueFlags,
        count: u32,
    ) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    fn present_on(
        families: &'static [u32],
    ) -> impl FnMut(u32) -> Result<bool, Infallible> {
        move |idx| Ok(families.contains(&idx))
    }

    const GFX: vk::QueueFlags = vk::QueueFlags::from_raw(
        vk::QueueFlags::GRAPHICS.as_raw()
            | vk::QueueFlags::COMPUTE.as_raw()
            | vk::QueueFlags::TRANSFER.as_raw(),
    );

    #[test]
    fn single_universal_family_serves_every_role() {
        let families = [family(GFX, 16)];
        let indices =
            QueueFamilyIndices::resolve(&families, present_on(&[0])).unwrap();

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
        assert_eq!(indices.transfer, None);
        assert_eq!(
            indices.complete(),
            Some(ResolvedQueueFamilies {
                graphics: 0,
                present: 0,
                transfer: 0,
            })
        );
    }

    #[test]
    fn picks_first_transfer_only_family() {
        let families = [
            family(GFX, 16),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 8),
            family(vk::QueueFlags::TRANSFER, 2),
        ];
        let indices =
            QueueFamilyIndices::resolve(&families, present_on(&[0])).unwrap();

        assert_eq!(indices.transfer, Some(1));
        assert_eq!(indices.complete().map(|r| r.transfer), Some(1));
    }

    #[test]
    fn present_can_come_from_a_separate_family() {
        let families = [family(GFX, 1), family(vk::QueueFlags::empty(), 1)];
        let indices =
            QueueFamilyIndices::resolve(&families, present_on(&[1])).unwrap();

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(1));
    }

    #[test]
    fn first_match_wins_even_when_a_later_family_does_both() {
        let families = [
            family(GFX, 1),
            family(vk::QueueFlags::TRANSFER, 1),
            family(GFX, 1),
        ];
        let indices =
            QueueFamilyIndices::resolve(&families, present_on(&[1, 2]))
                .unwrap();

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(1));
    }

    #[test]
    fn empty_families_are_ignored() {
        let families = [
            family(GFX, 0),
            family(vk::QueueFlags::TRANSFER, 0),
            family(GFX, 4),
        ];
        let indices =
            QueueFamilyIndices::resolve(&families, present_on(&[0, 2]))
                .unwrap();

        assert_eq!(indices.graphics, Some(2));
        assert_eq!(indices.present, Some(2));
        assert_eq!(indices.transfer, None);
    }

    #[test]
    fn missing_present_is_incomplete() {
        let families = [family(GFX, 1)];
        let indices =
            QueueFamilyIndices::resolve(&families, present_on(&[])).unwrap();

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, None);
        assert_eq!(indices.complete(), None);
    }

    #[test]
    fn missing_graphics_is_incomplete() {
        let families = [family(vk::QueueFlags::COMPUTE, 1)];
        let indices =
            QueueFamilyIndices::resolve(&families, present_on(&[0])).unwrap();

        assert_eq!(indices.complete(), None);
    }

    #[test]
    fn present_is_queried_for_every_family_in_order() {
        let families = [family(GFX, 1), family(GFX, 1), family(GFX, 0)];
        let queried = RefCell::new(Vec::new());
        QueueFamilyIndices::resolve(&families, |idx| {
            queried.borrow_mut().push(idx);
            Ok::<_, Infallible>(true)
        })
        .unwrap();

        assert_eq!(*queried.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn present_query_error_aborts_the_scan() {
        let families = [family(GFX, 1), family(GFX, 1), family(GFX, 1)];
        let queried = RefCell::new(Vec::new());
        let result = QueueFamilyIndices::resolve(&families, |idx| {
            queried.borrow_mut().push(idx);
            if idx == 1 {
                Err(vk::Result::ERROR_SURFACE_LOST_KHR)
            } else {
                Ok(false)
            }
        });

        assert_eq!(result, Err(vk::Result::ERROR_SURFACE_LOST_KHR));
        assert_eq!(*queried.borrow(), vec![0, 1]);
    }

    #[test]
    fn unique_deduplicates_in_request_order() {
        let all_same = ResolvedQueueFamilies {
            graphics: 0,
            present: 0,
            transfer: 0,
        };
        assert_eq!(all_same.unique(), vec![0]);

        let split_present = ResolvedQueueFamilies {
            graphics: 0,
            present: 2,
            transfer: 0,
        };
        assert_eq!(split_present.unique(), vec![0, 2]);

        let transfer_equals_present = ResolvedQueueFamilies {
            graphics: 0,
            present: 1,
            transfer: 1,
        };
        assert_eq!(transfer_equals_present.unique(), vec![0, 1]);

        let all_distinct = ResolvedQueueFamilies {
            graphics: 2,
            present: 0,
            transfer: 1,
        };
        assert_eq!(all_distinct.unique(), vec![2, 0, 1]);
    }
}
