use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;

use super::GpuOptions;

const MAX_FRAME_LATENCY: u32 = 3;

/// Device, queue and the presentation surface for one preview window.
pub(crate) struct GpuContext {
    _instance: wgpu::Instance,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: PhysicalSize<u32>,
    pub surface_format: wgpu::TextureFormat,
}

impl GpuContext {
    pub(crate) fn new<T>(target: &T, size: PhysicalSize<u32>, options: GpuOptions) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = presentation_surface(&instance, target)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: options.power,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("no GPU adapter can present to the preview window")?;
        let info = adapter.get_info();
        tracing::info!(adapter = %info.name, backend = ?info.backend, "using GPU adapter");

        let limits = adapter.limits();
        let largest = size.width.max(size.height);
        if largest > limits.max_texture_dimension_2d {
            bail!(
                "preview of {}x{} exceeds the adapter's {} texel limit",
                size.width,
                size.height,
                limits.max_texture_dimension_2d
            );
        }

        let caps = surface.get_capabilities(&adapter);
        let surface_format = linear_format(&caps.formats)
            .context("preview surface offers no texture formats")?;
        if surface_format.is_srgb() {
            // Composite already applies its own gamma; an sRGB target encodes twice.
            tracing::warn!(?surface_format, "only sRGB surface formats available");
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("singularity device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to open GPU device")?;

        let present_mode = present_mode(options.vsync, &caps.present_modes);
        let latency = options.frame_latency.clamp(1, MAX_FRAME_LATENCY);
        if latency != options.frame_latency {
            tracing::warn!(requested = options.frame_latency, latency, "frame latency clamped");
        }
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        tracing::debug!(?surface_format, ?present_mode, ?alpha_mode, latency, "surface settings");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: Vec::new(),
            desired_maximum_frame_latency: latency,
        };
        surface.configure(&device, &config);

        Ok(Self {
            _instance: instance,
            surface,
            device,
            queue,
            config,
            size,
            surface_format,
        })
    }

    /// A zero extent is remembered but the swapchain keeps its last
    /// configuration until the window has area again.
    pub(crate) fn resize(&mut self, size: PhysicalSize<u32>) {
        self.size = size;
        if self.is_zero_area() {
            return;
        }
        self.config.width = size.width;
        self.config.height = size.height;
        self.reconfigure();
    }

    pub(crate) fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }

    pub(crate) fn is_zero_area(&self) -> bool {
        self.size.width == 0 || self.size.height == 0
    }
}

fn presentation_surface<T>(instance: &wgpu::Instance, target: &T) -> Result<wgpu::Surface<'static>>
where
    T: HasDisplayHandle + HasWindowHandle,
{
    let raw_window_handle = target
        .window_handle()
        .map_err(|err| anyhow!("preview window has no window handle: {err}"))?
        .as_raw();
    let raw_display_handle = target
        .display_handle()
        .map_err(|err| anyhow!("preview window has no display handle: {err}"))?
        .as_raw();

    // SAFETY: `run_preview` drops the pipeline, which owns this surface,
    // before the window it was created from.
    unsafe {
        instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
            raw_display_handle,
            raw_window_handle,
        })
    }
    .context("failed to create preview surface")
}

/// First non-sRGB format, else whatever the surface lists first.
fn linear_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .copied()
        .find(|format| !format.is_srgb())
        .or_else(|| formats.first().copied())
}

/// Fifo is always supported, so it doubles as the fallback.
fn present_mode(vsync: bool, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
    if vsync {
        return wgpu::PresentMode::Fifo;
    }
    [wgpu::PresentMode::Immediate, wgpu::PresentMode::Mailbox]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(wgpu::PresentMode::Fifo)
}
