//! Multi-pass black hole compositor.
//!
//! A frame is five fullscreen passes issued by [`Pipeline::render`]:
//!
//! ```text
//!   noise, dust, history.read ─▶ main ─▶ history.write
//!   history.write ─▶ bloom-extract ─▶ blur-horizontal ─▶ blur-vertical
//!   history.write + blur-vertical ─▶ composite ─▶ screen
//!   swap(history.read, history.write)
//! ```
//!
//! Everything that touches pixels goes through the [`RenderDevice`] trait.
//! [`gpu::GpuDevice`] renders with `wgpu` into a window surface;
//! [`software::SoftwareDevice`] runs the same passes on the CPU and is what the
//! tests and headless runs use. Parameters come from the `tuning` crate and
//! are copied into a single [`UniformStore`] that passes read through handles.

mod clock;
mod compile;
mod device;
pub mod gpu;
mod kernel;
mod noise;
mod pass;
mod pipeline;
pub mod software;
mod targets;
mod types;
mod uniforms;
mod window;

pub use clock::{FixedTimeSource, FrameClock, FrameTime, SystemTimeSource, TimeSource};
pub use device::{
    BoundInput, DeviceError, FrameAcquire, OutputKind, ProgramDescriptor, RenderDevice,
    ResourceCounts,
};
pub use kernel::{BLUR_RADIUS, BLUR_WEIGHTS};
pub use noise::{NoiseTexture, DUST_SIDE, NOISE_SIDE};
pub use pass::{InputDecl, InputScope, Output, Pass, PassLayout, PassRecord, TargetRole, LAYOUTS};
pub use pipeline::{
    FrameOutcome, FrameReport, Pipeline, PipelineError, PipelineOptions, SkipReason,
};
pub use targets::{RenderTargetPool, ResizeOutcome};
pub use types::{
    channel_index, Destination, FilterMode, PassKind, ProgramId, TargetDescriptor, TargetFormat,
    TargetId, TargetSize, TextureId, TextureRef, UniformValue, ValueKind, Viewport, CHANNEL_COUNT,
};
pub use uniforms::{parameter_values, CellId, Scope, UniformError, UniformStore};
pub use window::{run_preview, ParameterReloader, PreviewConfig};
