#![allow(clippy::missing_safety_doc)]
#![warn(missing_docs)]
/*!
One-shot Vulkan bootstrap negotiation for [`ash`]: pick a capable physical
device, resolve graphics/present queue families and compute swapchain
creation parameters, all before a logical device exists.

- ✅ Instance creation with runtime-configurable validation layers
- ✅ Physical device selection (Vulkan 1.3, dynamic rendering,
  extended dynamic state)
- ✅ Graphics/present queue family resolution
- ✅ Surface format / present mode / extent / image count negotiation

The crate deliberately stops there: logical device creation, swapchain
object ownership and frame pacing belong to the caller. Every negotiation
pass recomputes from fresh driver queries; nothing is cached.

## Cargo Features

- `surface` (enabled by default): Enables the use of [`raw-window-handle`].

## Example

```rust,ignore
let entry = unsafe { ash::Entry::load() }?;
let (instance, _messenger, _metadata) = unsafe {
    InstanceBuilder::new()
        .app_name("demo")?
        .validation_layers(ValidationLayers::Request)
        .request_debug_messenger(DebugMessenger::Default)
        .require_surface_extensions(&window)
        .unwrap()
        .build(&entry)
}?;

let surface = unsafe {
    ash_window::create_surface(
        &entry,
        &instance,
        window.raw_display_handle(),
        window.raw_window_handle(),
        None,
    )
}?;
let surface_loader = ash::extensions::khr::Surface::new(&entry, &instance);

let required = [ash::extensions::khr::Swapchain::name()];
let candidate = unsafe { select_physical_device(&instance, &required) }?;
let queues = unsafe {
    select_queue_families(
        &surface_loader,
        candidate.physical_device(),
        candidate.profile().queue_families(),
        surface,
    )
}?;
let support = unsafe {
    SurfaceSupport::query(&surface_loader, candidate.physical_device(), surface)
}?;
let params = SwapchainParameters::negotiate(&support, window_extent);
```

[`raw-window-handle`]: https://crates.io/crates/raw-window-handle
*/

pub mod device;
pub mod instance;
pub mod swapchain;

pub use device::*;
pub use instance::*;
pub use swapchain::*;

type NegotiateSmallVec<T> = smallvec::SmallVec<[T; 8]>;
