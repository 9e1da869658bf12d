//! The seam between the frame orchestrator and whatever executes draws.
//!
//! A [`RenderDevice`] owns every GPU-side (or CPU-side) resource and hands out
//! plain ids. Passes, the target pool and the orchestrator only ever hold ids,
//! which keeps the orchestration logic identical for the `wgpu` backend and the
//! deterministic software rasterizer used by tests and headless runs.

use crate::noise::NoiseTexture;
use crate::pass::InputDecl;
use crate::types::{
    Destination, PassKind, ProgramId, TargetDescriptor, TargetId, TextureId, UniformValue,
};

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("program '{program}' failed to compile: {message}")]
    Compile { program: String, message: String },
    #[error("failed to allocate {what}: {message}")]
    Allocation { what: String, message: String },
    #[error("unknown {kind} handle #{id}")]
    UnknownHandle { kind: &'static str, id: u32 },
    #[error("input '{name}' is invalid: {message}")]
    Input { name: String, message: String },
    #[error("no frame is in progress")]
    NoFrame,
    #[error("surface unavailable: {0}")]
    Surface(String),
}

impl DeviceError {
    pub(crate) fn input(name: &str, message: impl Into<String>) -> Self {
        Self::Input {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Where a program's output lands, which fixes its colour format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputKind {
    Offscreen,
    Screen,
}

/// Everything needed to build the program for one pass.
#[derive(Clone, Copy, Debug)]
pub struct ProgramDescriptor<'a> {
    pub pass: PassKind,
    pub inputs: &'a [InputDecl],
    pub output: OutputKind,
}

/// A named input with the value it holds for this draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundInput {
    pub name: &'static str,
    pub value: UniformValue,
}

/// Result of trying to open a frame on the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameAcquire {
    Ready,
    /// The presentation surface cannot accept a frame right now.
    Unavailable,
}

/// Live resource counts, used to verify teardown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceCounts {
    pub programs: usize,
    pub targets: usize,
    pub textures: usize,
}

impl ResourceCounts {
    pub fn is_empty(&self) -> bool {
        self.programs == 0 && self.targets == 0 && self.textures == 0
    }
}

pub trait RenderDevice {
    /// Builds the program for one pass. Failure is reported here, never at draw time.
    fn compile_program(&mut self, descriptor: &ProgramDescriptor<'_>)
        -> Result<ProgramId, DeviceError>;

    fn create_target(&mut self, descriptor: &TargetDescriptor) -> Result<TargetId, DeviceError>;

    /// Uploads a static texture including its full mip chain.
    fn upload_texture(
        &mut self,
        label: &'static str,
        texture: &NoiseTexture,
    ) -> Result<TextureId, DeviceError>;

    /// Tells the device the presentation surface changed size (device pixels).
    fn resize_surface(&mut self, width: u32, height: u32);

    fn begin_frame(&mut self) -> Result<FrameAcquire, DeviceError>;

    /// Issues one fullscreen draw. Draws execute in issue order.
    fn draw(
        &mut self,
        program: ProgramId,
        inputs: &[BoundInput],
        destination: Destination,
    ) -> Result<(), DeviceError>;

    /// Submits the frame's draws and presents the screen output.
    fn end_frame(&mut self) -> Result<(), DeviceError>;

    fn release_program(&mut self, id: ProgramId);
    fn release_target(&mut self, id: TargetId);
    fn release_texture(&mut self, id: TextureId);

    fn live_resources(&self) -> ResourceCounts;
}
