//! Runs the whole bootstrap negotiation against the real driver and keeps
//! a window open until it is closed. No rendering happens; the negotiated
//! parameters are printed instead.

use ash::extensions::khr::{Surface, Swapchain};
use ash::{vk, Entry, Instance};
use ash_negotiate::{
    select_physical_device, select_queue_families, DebugMessenger, InstanceBuilder,
    SurfaceSupport, SwapchainParameters, ValidationLayers,
};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use winit::{
    dpi::LogicalSize,
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::{Window, WindowBuilder},
};

fn main() {
    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title("Vulkan")
        .with_inner_size(LogicalSize::new(800, 600))
        .with_resizable(false)
        .build(&event_loop)
        .unwrap();

    let app = App::new(&window);

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;
        let _ = &app;
        if let Event::WindowEvent {
            event: WindowEvent::CloseRequested,
            ..
        } = event
        {
            *control_flow = ControlFlow::Exit;
        }
    });
}

struct App {
    _entry: Entry,
    instance: Instance,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    surface_loader: Surface,
    surface: vk::SurfaceKHR,
}

impl App {
    fn new(window: &Window) -> Self {
        unsafe {
            let entry = Entry::load().unwrap();
            let (instance, debug_messenger, instance_metadata) = InstanceBuilder::new()
                .app_name("bootstrap")
                .unwrap()
                .app_version(1, 0)
                .validation_layers(ValidationLayers::Request)
                .request_debug_messenger(DebugMessenger::Default)
                .require_surface_extensions(window)
                .unwrap()
                .build(&entry)
                .unwrap();
            println!("{instance_metadata:?}");

            let surface = ash_window::create_surface(
                &entry,
                &instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
            .unwrap();
            let surface_loader = Surface::new(&entry, &instance);

            let required_extensions = [Swapchain::name()];
            let candidate = select_physical_device(&instance, &required_extensions).unwrap();
            println!("selected device: {}", candidate.profile().device_name());

            let queues = select_queue_families(
                &surface_loader,
                candidate.physical_device(),
                candidate.profile().queue_families(),
                surface,
            )
            .unwrap();
            println!(
                "queue families: graphics {} / present {}",
                queues.graphics, queues.present
            );

            let support =
                SurfaceSupport::query(&surface_loader, candidate.physical_device(), surface)
                    .unwrap();
            let size = window.inner_size();
            let params = SwapchainParameters::negotiate(
                &support,
                vk::Extent2D {
                    width: size.width,
                    height: size.height,
                },
            );
            println!("{params:?}");

            Self {
                _entry: entry,
                instance,
                debug_messenger,
                surface_loader,
                surface,
            }
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some(messenger) = self.debug_messenger {
                ash::extensions::ext::DebugUtils::new(&self._entry, &self.instance)
                    .destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}
