//! `wgpu` backend.
//!
//! - `context` owns the instance, adapter, device and surface, and knows how
//!   to reconfigure the swapchain when the window resizes.
//! - `device` implements [`RenderDevice`](crate::RenderDevice): GLSL programs
//!   built from the generated header in `compile`, offscreen `Rgba8Unorm`
//!   targets, mip-mapped noise textures and one command encoder per frame.

mod context;
mod device;

pub use device::GpuDevice;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuOptions {
    pub power: wgpu::PowerPreference,
    pub vsync: bool,
    pub frame_latency: u32,
}

impl Default for GpuOptions {
    fn default() -> Self {
        Self {
            power: wgpu::PowerPreference::HighPerformance,
            vsync: true,
            frame_latency: 2,
        }
    }
}
