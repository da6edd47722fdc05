//! Physical device selection and queue family resolution.
use std::{
    borrow::Cow,
    ffi::{CStr, CString},
    fmt,
};

use ash::extensions::khr::Surface;
use ash::{vk, Instance};
use thiserror::Error;

/// Minimum device API version accepted by [`select_physical_device`].
pub const TARGET_API_VERSION: u32 = vk::API_VERSION_1_3;

/// Errors that can occur during device and queue negotiation.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// No enumerated physical device met the selection predicate.
    #[error("no physical device meets the requirements")]
    NoSuitableDevice,
    /// The chosen device has no queue family filling this role.
    #[error("no queue family supports {0}")]
    NoQueueFamily(QueueRole),
    /// Vulkan Error.
    #[error("vulkan error")]
    Vulkan(#[from] vk::Result),
}

/// The capability a queue family was being resolved for when
/// [`NegotiationError::NoQueueFamily`] was raised.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum QueueRole {
    /// Graphics command submission.
    Graphics,
    /// Presentation to the negotiated surface.
    Present,
}

impl fmt::Display for QueueRole {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueueRole::Graphics => fmt.write_str("graphics"),
            QueueRole::Present => fmt.write_str("presentation"),
        }
    }
}

/// Support flags for the optional features the selection predicate requires,
/// flattened out of the driver's feature structure chains.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DeviceFeatureSupport {
    /// `VkPhysicalDeviceVulkan13Features::dynamicRendering`.
    pub dynamic_rendering: bool,
    /// `VkPhysicalDeviceExtendedDynamicStateFeaturesEXT::extendedDynamicState`.
    pub extended_dynamic_state: bool,
}

/// Everything queried about a physical device to judge its suitability.
/// A fresh snapshot is taken on every negotiation pass; nothing is cached
/// between passes.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    api_version: u32,
    properties: vk::PhysicalDeviceProperties,
    queue_families: Vec<vk::QueueFamilyProperties>,
    extensions: Vec<CString>,
    features: DeviceFeatureSupport,
}

impl DeviceProfile {
    /// Query the profile of `physical_device` from the driver.
    pub unsafe fn query(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
    ) -> Result<DeviceProfile, vk::Result> {
        let properties = instance.get_physical_device_properties(physical_device);
        let queue_families =
            instance.get_physical_device_queue_family_properties(physical_device);
        let extensions = instance
            .enumerate_device_extension_properties(physical_device)?
            .iter()
            .map(|extension| CStr::from_ptr(extension.extension_name.as_ptr()).to_owned())
            .collect();

        // Chaining Vulkan13Features into the query is only valid on devices
        // that actually expose 1.3.
        let features = if properties.api_version >= TARGET_API_VERSION {
            let mut vulkan13 = vk::PhysicalDeviceVulkan13Features::default();
            let mut extended_dynamic_state =
                vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::default();
            let mut features2 = vk::PhysicalDeviceFeatures2::builder()
                .push_next(&mut vulkan13)
                .push_next(&mut extended_dynamic_state)
                .build();
            instance.get_physical_device_features2(physical_device, &mut features2);

            DeviceFeatureSupport {
                dynamic_rendering: vulkan13.dynamic_rendering == vk::TRUE,
                extended_dynamic_state: extended_dynamic_state.extended_dynamic_state
                    == vk::TRUE,
            }
        } else {
            DeviceFeatureSupport::default()
        };

        Ok(DeviceProfile {
            api_version: properties.api_version,
            properties,
            queue_families,
            extensions,
            features,
        })
    }

    /// The device API version.
    #[inline]
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    /// Properties of the physical device.
    #[inline]
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    /// Name of the physical device.
    #[inline]
    pub fn device_name(&self) -> Cow<str> {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()).to_string_lossy() }
    }

    /// The queue family properties of the physical device.
    #[inline]
    pub fn queue_families(&self) -> &[vk::QueueFamilyProperties] {
        &self.queue_families
    }

    /// The extensions supported by the physical device.
    #[inline]
    pub fn extensions(&self) -> &[CString] {
        &self.extensions
    }

    /// Support for the optional features the selection predicate requires.
    #[inline]
    pub fn features(&self) -> DeviceFeatureSupport {
        self.features
    }

    /// Returns true if `extension` is supported (case-sensitive exact match).
    #[inline]
    pub fn supports_extension(&self, extension: &CStr) -> bool {
        self.extensions.iter().any(|e| e.as_c_str() == extension)
    }

    /// The four-part selection predicate: minimum API version, at least one
    /// graphics-capable queue family, every required extension present, and
    /// dynamic rendering plus extended dynamic state supported.
    pub fn meets_requirements(&self, required_extensions: &[&CStr]) -> bool {
        self.api_version >= TARGET_API_VERSION
            && self
                .queue_families
                .iter()
                .any(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            && required_extensions
                .iter()
                .all(|&extension| self.supports_extension(extension))
            && self.features.dynamic_rendering
            && self.features.extended_dynamic_state
    }
}

/// A physical device that met the selection predicate, together with the
/// profile it was judged on. The handle stays owned by the instance.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    physical_device: vk::PhysicalDevice,
    profile: DeviceProfile,
}

impl DeviceCandidate {
    /// The chosen physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// The profile snapshot the device was judged on.
    #[inline]
    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }
}

/// Pick the first physical device in enumeration order whose profile passes
/// [`DeviceProfile::meets_requirements`]. No scoring, no device-type
/// preference; the enumeration order of the driver decides ties.
pub unsafe fn select_physical_device(
    instance: &Instance,
    required_extensions: &[&CStr],
) -> Result<DeviceCandidate, NegotiationError> {
    for physical_device in instance.enumerate_physical_devices()? {
        let profile = DeviceProfile::query(instance, physical_device)?;
        if profile.meets_requirements(required_extensions) {
            return Ok(DeviceCandidate {
                physical_device,
                profile,
            });
        }
    }

    Err(NegotiationError::NoSuitableDevice)
}

/// Resolved queue family indices for the two roles the bootstrap needs.
/// The indices may be equal; a unified family is preferred because it spares
/// the swapchain concurrent sharing and cross-queue ownership transfers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct QueueFamilySelection {
    /// Index of the family graphics commands will be submitted to.
    pub graphics: u32,
    /// Index of the family presentation will be performed on.
    pub present: u32,
}

impl QueueFamilySelection {
    /// True when a single family fills both roles.
    #[inline]
    pub fn is_unified(&self) -> bool {
        self.graphics == self.present
    }

    /// Both indices, for handing to `VkSwapchainCreateInfoKHR` when the
    /// families are distinct.
    #[inline]
    pub fn indices(&self) -> [u32; 2] {
        [self.graphics, self.present]
    }
}

/// Resolve queue families from already-queried data.
///
/// `present_support[i]` states whether family `i` can present to the target
/// surface; families beyond its length are treated as unable to present.
///
/// Three phases, stopping at the first that succeeds:
/// 1. the first graphics family, if it also presents, fills both roles;
/// 2. otherwise the first family supporting both fills both roles;
/// 3. otherwise the first graphics family and the first presenting family
///    are paired up.
pub fn resolve_queue_families(
    queue_families: &[vk::QueueFamilyProperties],
    present_support: &[bool],
) -> Result<QueueFamilySelection, NegotiationError> {
    let can_present = |index: usize| present_support.get(index).copied().unwrap_or(false);

    let graphics = queue_families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .ok_or(NegotiationError::NoQueueFamily(QueueRole::Graphics))?;

    if can_present(graphics) {
        return Ok(QueueFamilySelection {
            graphics: graphics as u32,
            present: graphics as u32,
        });
    }

    let combined = queue_families.iter().enumerate().position(|(index, family)| {
        family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && can_present(index)
    });
    if let Some(index) = combined {
        return Ok(QueueFamilySelection {
            graphics: index as u32,
            present: index as u32,
        });
    }

    let present = (0..queue_families.len())
        .find(|&index| can_present(index))
        .ok_or(NegotiationError::NoQueueFamily(QueueRole::Present))?;

    Ok(QueueFamilySelection {
        graphics: graphics as u32,
        present: present as u32,
    })
}

/// Resolve queue families for `physical_device` against `surface`, querying
/// per-family presentation support from the driver and then applying
/// [`resolve_queue_families`].
pub unsafe fn select_queue_families(
    surface_loader: &Surface,
    physical_device: vk::PhysicalDevice,
    queue_families: &[vk::QueueFamilyProperties],
    surface: vk::SurfaceKHR,
) -> Result<QueueFamilySelection, NegotiationError> {
    let mut present_support = Vec::with_capacity(queue_families.len());
    for index in 0..queue_families.len() as u32 {
        present_support.push(surface_loader.get_physical_device_surface_support(
            physical_device,
            index,
            surface,
        )?);
    }

    resolve_queue_families(queue_families, &present_support)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cstr::cstr;

    const FULL_SUPPORT: DeviceFeatureSupport = DeviceFeatureSupport {
        dynamic_rendering: true,
        extended_dynamic_state: true,
    };

    fn families(flags: &[vk::QueueFlags]) -> Vec<vk::QueueFamilyProperties> {
        flags
            .iter()
            .map(|&queue_flags| vk::QueueFamilyProperties {
                queue_flags,
                queue_count: 1,
                ..Default::default()
            })
            .collect()
    }

    fn profile(
        api_version: u32,
        queue_flags: &[vk::QueueFlags],
        extensions: &[&CStr],
        features: DeviceFeatureSupport,
    ) -> DeviceProfile {
        DeviceProfile {
            api_version,
            properties: vk::PhysicalDeviceProperties::default(),
            queue_families: families(queue_flags),
            extensions: extensions.iter().map(|&e| e.to_owned()).collect(),
            features,
        }
    }

    const SWAPCHAIN: &CStr = cstr!("VK_KHR_swapchain");

    fn qualifying() -> DeviceProfile {
        profile(
            TARGET_API_VERSION,
            &[vk::QueueFlags::GRAPHICS],
            &[SWAPCHAIN],
            FULL_SUPPORT,
        )
    }

    #[test]
    fn predicate_accepts_fully_capable_device() {
        assert!(qualifying().meets_requirements(&[SWAPCHAIN]));
    }

    #[test]
    fn predicate_rejects_old_api_version() {
        let mut profile = qualifying();
        profile.api_version = vk::API_VERSION_1_2;
        assert!(!profile.meets_requirements(&[SWAPCHAIN]));
    }

    #[test]
    fn predicate_rejects_compute_only_device() {
        let profile = profile(
            TARGET_API_VERSION,
            &[vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER],
            &[SWAPCHAIN],
            FULL_SUPPORT,
        );
        assert!(!profile.meets_requirements(&[SWAPCHAIN]));
    }

    #[test]
    fn predicate_requires_exact_extension_match() {
        let profile = profile(
            TARGET_API_VERSION,
            &[vk::QueueFlags::GRAPHICS],
            &[cstr!("VK_KHR_swapchain_mutable_format")],
            FULL_SUPPORT,
        );
        assert!(!profile.meets_requirements(&[SWAPCHAIN]));
    }

    #[test]
    fn predicate_rejects_missing_features() {
        let mut profile = qualifying();
        profile.features.extended_dynamic_state = false;
        assert!(!profile.meets_requirements(&[SWAPCHAIN]));

        profile.features = DeviceFeatureSupport {
            dynamic_rendering: false,
            extended_dynamic_state: true,
        };
        assert!(!profile.meets_requirements(&[SWAPCHAIN]));
    }

    #[test]
    fn first_qualifying_device_wins() {
        let mut old = qualifying();
        old.api_version = vk::API_VERSION_1_0;
        let candidates = [old, qualifying(), qualifying()];

        let winner = candidates
            .iter()
            .position(|profile| profile.meets_requirements(&[SWAPCHAIN]));
        assert_eq!(winner, Some(1));
    }

    #[test]
    fn unified_family_zero() {
        let families = families(&[vk::QueueFlags::GRAPHICS]);
        let selection = resolve_queue_families(&families, &[true]).unwrap();
        assert_eq!(
            selection,
            QueueFamilySelection {
                graphics: 0,
                present: 0
            }
        );
        assert!(selection.is_unified());
    }

    #[test]
    fn later_combined_family_beats_split_roles() {
        // Family 0 draws but can't present; family 2 does both.
        let families = families(&[
            vk::QueueFlags::GRAPHICS,
            vk::QueueFlags::COMPUTE,
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
        ]);
        let selection = resolve_queue_families(&families, &[false, true, true]).unwrap();
        assert_eq!(
            selection,
            QueueFamilySelection {
                graphics: 2,
                present: 2
            }
        );
    }

    #[test]
    fn disjoint_families_pair_up() {
        let families = families(&[vk::QueueFlags::GRAPHICS, vk::QueueFlags::TRANSFER]);
        let selection = resolve_queue_families(&families, &[false, true]).unwrap();
        assert_eq!(
            selection,
            QueueFamilySelection {
                graphics: 0,
                present: 1
            }
        );
        assert!(!selection.is_unified());
    }

    #[test]
    fn missing_graphics_family_is_fatal() {
        let families = families(&[vk::QueueFlags::COMPUTE]);
        let err = resolve_queue_families(&families, &[true]).unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::NoQueueFamily(QueueRole::Graphics)
        ));
    }

    #[test]
    fn missing_present_family_is_fatal() {
        let families = families(&[vk::QueueFlags::GRAPHICS, vk::QueueFlags::GRAPHICS]);
        let err = resolve_queue_families(&families, &[false, false]).unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::NoQueueFamily(QueueRole::Present)
        ));
    }

    #[test]
    fn short_present_table_reads_as_unsupported() {
        let families = families(&[vk::QueueFlags::GRAPHICS]);
        let err = resolve_queue_families(&families, &[]).unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::NoQueueFamily(QueueRole::Present)
        ));
    }
}
