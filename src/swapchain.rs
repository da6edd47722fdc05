//! Swapchain parameter negotiation.
//!
//! Computes what a swapchain should be created with, without creating one:
//! surface format, present mode, extent and image count. The downstream
//! owner of the logical device turns the result into a `VkSwapchainKHR`.

use ash::extensions::khr::Surface;
use ash::vk;

use crate::QueueFamilySelection;

/// Surface format picked when the surface offers it: 8-bit BGRA sRGB with
/// the standard non-linear color space.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Baseline swapchain image count before the surface's reported bounds are
/// applied. Three images keep a mailbox-mode swapchain from stalling.
pub const PREFERRED_IMAGE_COUNT: u32 = 3;

/// Everything the surface reports about what a swapchain on it may look
/// like, queried in one step.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Surface capabilities: image count bounds, extent bounds, transforms.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format and color space pairs. Non-empty on conforming
    /// drivers.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes. Always contains FIFO on conforming drivers.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Query the support details of `surface` for `physical_device`.
    pub unsafe fn query(
        surface_loader: &Surface,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<SurfaceSupport, vk::Result> {
        let capabilities =
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?;
        let formats =
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?;
        let present_modes = surface_loader
            .get_physical_device_surface_present_modes(physical_device, surface)?;

        Ok(SurfaceSupport {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// True when the surface can host a swapchain at all.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Prefer [`PREFERRED_SURFACE_FORMAT`] by exact pair equality anywhere in
/// the list, otherwise take the first entry as-is.
///
/// `formats` must be non-empty, which the surface-query contract guarantees.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|&format| format == PREFERRED_SURFACE_FORMAT)
        .unwrap_or(formats[0])
}

/// Prefer low-latency triple buffering (mailbox) when offered, otherwise
/// fall back to FIFO, which every conforming driver supports.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// When the surface reports a definite current extent, that extent is
/// binding. Otherwise the window's framebuffer size is clamped dimension by
/// dimension into the surface's reported extent range. A `current_extent`
/// width of `u32::MAX` is the sentinel for "the surface does not dictate a
/// size"; known to apply at least to Wayland.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: window_extent.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: window_extent.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// [`PREFERRED_IMAGE_COUNT`] raised to the surface's minimum, then clamped
/// to the surface's maximum when one is reported. A maximum of zero means
/// the surface imposes no upper bound.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = PREFERRED_IMAGE_COUNT.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// The negotiated swapchain creation parameters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SwapchainParameters {
    /// Chosen color format and color space.
    pub surface_format: vk::SurfaceFormatKHR,
    /// Chosen present mode.
    pub present_mode: vk::PresentModeKHR,
    /// Chosen image extent.
    pub extent: vk::Extent2D,
    /// Chosen image count, within the surface's reported bounds.
    pub image_count: u32,
}

impl SwapchainParameters {
    /// Negotiate all swapchain parameters from the surface's support details
    /// and the window's current framebuffer size.
    pub fn negotiate(
        support: &SurfaceSupport,
        window_extent: vk::Extent2D,
    ) -> SwapchainParameters {
        SwapchainParameters {
            surface_format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, window_extent),
            image_count: choose_image_count(&support.capabilities),
        }
    }

    /// Assemble a swapchain create info from the negotiated parameters for
    /// the downstream device owner. `queue_family_indices` must outlive the
    /// returned builder; pass `&queues.indices()`. Distinct families get
    /// concurrent sharing, a unified family gets exclusive.
    pub fn create_info<'a>(
        &self,
        surface: vk::SurfaceKHR,
        capabilities: &vk::SurfaceCapabilitiesKHR,
        queues: QueueFamilySelection,
        queue_family_indices: &'a [u32; 2],
    ) -> vk::SwapchainCreateInfoKHRBuilder<'a> {
        let pre_transform = if capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            capabilities.current_transform
        };

        let mut info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(self.image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(self.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true);

        info = if queues.is_unified() {
            info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            info.image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(queue_family_indices)
        };

        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNDEFINED_EXTENT: vk::Extent2D = vk::Extent2D {
        width: u32::MAX,
        height: u32::MAX,
    };

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn image_count_capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    const LINEAR_RGBA: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::R8G8B8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    #[test]
    fn preferred_format_wins_regardless_of_position() {
        let formats = [LINEAR_RGBA, PREFERRED_SURFACE_FORMAT];
        assert_eq!(choose_surface_format(&formats), PREFERRED_SURFACE_FORMAT);

        let formats = [PREFERRED_SURFACE_FORMAT, LINEAR_RGBA];
        assert_eq!(choose_surface_format(&formats), PREFERRED_SURFACE_FORMAT);
    }

    #[test]
    fn format_match_requires_the_full_pair() {
        // Right format, wrong color space: not a match, first entry wins.
        let close = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        };
        assert_eq!(choose_surface_format(&[LINEAR_RGBA, close]), LINEAR_RGBA);
    }

    #[test]
    fn first_format_is_the_fallback() {
        assert_eq!(choose_surface_format(&[LINEAR_RGBA]), LINEAR_RGBA);
    }

    #[test]
    fn mailbox_preferred_over_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn fifo_is_the_fallback() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
        // Even an exotic list without mailbox falls back to FIFO, which the
        // driver must support.
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn image_count_baseline_with_unbounded_max() {
        assert_eq!(choose_image_count(&image_count_capabilities(2, 0)), 3);
    }

    #[test]
    fn image_count_clamped_to_reported_max() {
        assert_eq!(choose_image_count(&image_count_capabilities(2, 3)), 3);
        assert_eq!(choose_image_count(&image_count_capabilities(1, 2)), 2);
    }

    #[test]
    fn image_count_raised_to_reported_min() {
        assert_eq!(choose_image_count(&image_count_capabilities(5, 6)), 5);
    }

    #[test]
    fn definite_extent_is_binding() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(800, 600),
            min_image_extent: extent(1, 1),
            max_image_extent: extent(4096, 4096),
            ..Default::default()
        };
        assert_eq!(
            choose_extent(&capabilities, extent(1234, 5678)),
            extent(800, 600)
        );
    }

    #[test]
    fn undefined_extent_clamps_each_dimension_independently() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: UNDEFINED_EXTENT,
            min_image_extent: extent(100, 100),
            max_image_extent: extent(900, 900),
            ..Default::default()
        };
        assert_eq!(
            choose_extent(&capabilities, extent(1000, 10)),
            extent(900, 100)
        );
    }

    #[test]
    fn undefined_extent_passes_in_range_window_size_through() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: UNDEFINED_EXTENT,
            min_image_extent: extent(1, 1),
            max_image_extent: extent(4096, 4096),
            ..Default::default()
        };
        assert_eq!(
            choose_extent(&capabilities, extent(1280, 720)),
            extent(1280, 720)
        );
    }

    #[test]
    fn negotiate_composes_all_choices() {
        let support = SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 8,
                current_extent: UNDEFINED_EXTENT,
                min_image_extent: extent(1, 1),
                max_image_extent: extent(4096, 4096),
                ..Default::default()
            },
            formats: vec![LINEAR_RGBA, PREFERRED_SURFACE_FORMAT],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };

        let params = SwapchainParameters::negotiate(&support, extent(1920, 1080));
        assert_eq!(
            params,
            SwapchainParameters {
                surface_format: PREFERRED_SURFACE_FORMAT,
                present_mode: vk::PresentModeKHR::MAILBOX,
                extent: extent(1920, 1080),
                image_count: 3,
            }
        );
    }

    #[test]
    fn create_info_sharing_follows_queue_selection() {
        let params = SwapchainParameters {
            surface_format: PREFERRED_SURFACE_FORMAT,
            present_mode: vk::PresentModeKHR::FIFO,
            extent: extent(800, 600),
            image_count: 3,
        };
        let capabilities = vk::SurfaceCapabilitiesKHR {
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        };

        let unified = QueueFamilySelection {
            graphics: 0,
            present: 0,
        };
        let indices = unified.indices();
        let info = params.create_info(vk::SurfaceKHR::null(), &capabilities, unified, &indices);
        assert_eq!(info.image_sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert_eq!(info.queue_family_index_count, 0);

        let split = QueueFamilySelection {
            graphics: 0,
            present: 1,
        };
        let indices = split.indices();
        let info = params.create_info(vk::SurfaceKHR::null(), &capabilities, split, &indices);
        assert_eq!(info.image_sharing_mode, vk::SharingMode::CONCURRENT);
        assert_eq!(info.queue_family_index_count, 2);
        assert_eq!(info.min_image_count, 3);
        assert_eq!(info.present_mode, vk::PresentModeKHR::FIFO);
    }
}
