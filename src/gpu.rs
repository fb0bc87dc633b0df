//! GPU device and surface management.
//!
//! [`GpuContext`] owns the wgpu objects every pass in the renderer needs:
//! the device, the queue and (for windowed use) the surface plus its
//! configuration. It is created once and passed by reference to everything
//! that allocates GPU resources or records commands.
//!
//! The renderer itself never touches the window; the host application hands
//! a winit [`Window`] to [`GpuContext::new`] and drives the frame loop.
//! For offscreen rendering (tools, batch export) use
//! [`GpuContext::headless`], which skips surface creation entirely.
//!
//! [`Window`]: winit::window::Window

use std::sync::Arc;
use winit::window::Window;

/// Core GPU context holding wgpu resources.
///
/// All fields are public so host applications can reach the raw wgpu API
/// when the renderer's own surface is not enough.
pub struct GpuContext {
    /// The surface for presenting frames, `None` when running headless.
    pub surface: Option<wgpu::Surface<'static>>,
    /// The logical GPU device used to create resources and pipelines.
    pub device: wgpu::Device,
    /// The command queue work is submitted to.
    pub queue: wgpu::Queue,
    /// Current surface configuration (format, size, present mode). For a
    /// headless context this still tracks the logical viewport size.
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    /// Create a GPU context for a winit window.
    ///
    /// Performs the usual wgpu setup: instance, surface, adapter, device
    /// and queue, then configures the surface with an sRGB format and Fifo
    /// presentation.
    ///
    /// # Panics
    ///
    /// Panics if no suitable adapter is found or device creation fails;
    /// there is nothing sensible to render without one.
    pub fn new(window: Arc<Window>) -> Self {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window).unwrap();

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .expect("Failed to find a suitable GPU adapter");

        let (device, queue) = Self::request_device(&adapter);

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Self {
            surface: Some(surface),
            device,
            queue,
            config,
        }
    }

    /// Create a GPU context without a window surface.
    ///
    /// The `width` and `height` become the logical viewport that sizes the
    /// output pass targets; the final buffer can be read back or copied
    /// instead of presented.
    ///
    /// # Panics
    ///
    /// Panics if no suitable adapter is found or device creation fails.
    pub fn headless(width: u32, height: u32) -> Self {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .expect("Failed to find a suitable GPU adapter");

        let (device, queue) = Self::request_device(&adapter);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Opaque,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        Self {
            surface: None,
            device,
            queue,
            config,
        }
    }

    fn request_device(adapter: &wgpu::Adapter) -> (wgpu::Device, wgpu::Queue) {
        pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Dusk Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))
        .expect("Failed to create device")
    }

    /// Resize the surface (and logical viewport) to new dimensions.
    ///
    /// Zero-sized dimensions are ignored to avoid validation errors while a
    /// window is minimized.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            if let Some(surface) = &self.surface {
                surface.configure(&self.device, &self.config);
            }
        }
    }

    /// Returns the current viewport width in pixels.
    pub fn width(&self) -> u32 {
        self.config.width
    }

    /// Returns the current viewport height in pixels.
    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// Returns the current aspect ratio (width / height).
    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height as f32
    }
}
