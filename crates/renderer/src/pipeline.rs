//! Frame orchestration: one `render(dt)` runs the five passes in dependency
//! order and flips the history pair once at the end.
//!
//! ```text
//!   history.read ──┐
//!   noise, dust ───┴─▶ main ─▶ history.write ─┬─▶ bloom ─▶ blur-h ─▶ blur-v ─┐
//!                                             └─────────────────────────────┴─▶ composite
//!   composite ─▶ screen, then swap(read, write)
//! ```

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tuning::ParameterSet;

use crate::clock::{FrameClock, FrameTime};
use crate::device::{DeviceError, FrameAcquire, RenderDevice};
use crate::noise::{NoiseTexture, DUST_SIDE, NOISE_SIDE};
use crate::pass::{Output, Pass, PassRecord, TargetRole, LAYOUTS};
use crate::targets::{RenderTargetPool, ResizeOutcome};
use crate::types::{
    Destination, PassKind, TargetId, TargetSize, TextureId, TextureRef, UniformValue, Viewport,
};
use crate::uniforms::{Scope, UniformError, UniformStore};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to compile the {pass} pass")]
    Compile {
        pass: PassKind,
        source: DeviceError,
    },
    #[error("failed to allocate {what}")]
    Allocation {
        what: &'static str,
        source: DeviceError,
    },
    #[error("the {pass} pass failed to draw")]
    Draw {
        pass: PassKind,
        source: DeviceError,
    },
    #[error("the {pass} pass has no value for '{name}'")]
    MissingInput { pass: PassKind, name: &'static str },
    #[error("failed to submit the frame")]
    Frame(#[source] DeviceError),
    #[error(transparent)]
    Uniform(#[from] UniformError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Seeds noise generation and the jitter sequence. `None` draws from OS
    /// entropy, so every mount looks slightly different.
    pub seed: Option<u64>,
}

impl PipelineOptions {
    pub fn seeded(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ZeroArea,
    SurfaceUnavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub time: FrameTime,
    pub target_size: TargetSize,
    /// Passes in the order they were issued.
    pub passes: Vec<PassRecord>,
}

impl FrameReport {
    pub fn pass(&self, kind: PassKind) -> Option<&PassRecord> {
        self.passes.iter().find(|record| record.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Rendered(FrameReport),
    Skipped(SkipReason),
}

impl FrameOutcome {
    pub fn report(&self) -> Option<&FrameReport> {
        match self {
            FrameOutcome::Rendered(report) => Some(report),
            FrameOutcome::Skipped(_) => None,
        }
    }
}

/// Target ids for the frame in progress.
#[derive(Clone, Copy)]
struct FrameTargets {
    read: TargetId,
    write: TargetId,
    bloom: TargetId,
    blur_horizontal: TargetId,
    blur_vertical: TargetId,
}

impl FrameTargets {
    fn destination(&self, output: Output) -> Destination {
        match output {
            Output::Screen => Destination::Screen,
            Output::Target(TargetRole::HistoryWrite) => Destination::Target(self.write),
            Output::Target(TargetRole::Bloom) => Destination::Target(self.bloom),
            Output::Target(TargetRole::BlurHorizontal) => Destination::Target(self.blur_horizontal),
            Output::Target(TargetRole::BlurVertical) => Destination::Target(self.blur_vertical),
        }
    }
}

pub struct Pipeline<D: RenderDevice> {
    device: D,
    viewport: Viewport,
    pending_viewport: Option<Viewport>,
    parameters: ParameterSet,
    targets: RenderTargetPool,
    uniforms: UniformStore,
    passes: Vec<Pass>,
    textures: Vec<TextureId>,
    noise: Option<TextureId>,
    dust: Option<TextureId>,
    clock: FrameClock,
    frame_index: u64,
    jitter_base: u32,
    skipping: bool,
}

impl<D: RenderDevice> Pipeline<D> {
    /// Generates noise, compiles every pass and sizes the targets. Any
    /// failure releases what was already created.
    pub fn mount(
        device: D,
        viewport: Viewport,
        parameters: ParameterSet,
        options: PipelineOptions,
    ) -> Result<Self, PipelineError> {
        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let noise = NoiseTexture::generate(NOISE_SIDE, &mut rng);
        let dust = NoiseTexture::generate(DUST_SIDE, &mut rng);
        let jitter_base = rng.gen_range(0..1024);

        let mut pipeline = Self {
            device,
            viewport,
            pending_viewport: None,
            parameters,
            targets: RenderTargetPool::new(),
            uniforms: UniformStore::new(),
            passes: Vec::with_capacity(LAYOUTS.len()),
            textures: Vec::with_capacity(2),
            noise: None,
            dust: None,
            clock: FrameClock::new(),
            frame_index: 0,
            jitter_base,
            skipping: false,
        };

        if let Err(error) = pipeline.build(&noise, &dust) {
            pipeline.teardown();
            return Err(error);
        }
        tracing::info!(
            width = viewport.width,
            height = viewport.height,
            pixel_ratio = viewport.pixel_ratio,
            seeded = options.seed.is_some(),
            "mounted black hole pipeline"
        );
        Ok(pipeline)
    }

    fn build(&mut self, noise: &NoiseTexture, dust: &NoiseTexture) -> Result<(), PipelineError> {
        let noise_id = self
            .device
            .upload_texture("noise", noise)
            .map_err(|source| PipelineError::Allocation {
                what: "noise texture",
                source,
            })?;
        self.textures.push(noise_id);
        self.noise = Some(noise_id);

        let dust_id = self
            .device
            .upload_texture("dust", dust)
            .map_err(|source| PipelineError::Allocation {
                what: "dust texture",
                source,
            })?;
        self.textures.push(dust_id);
        self.dust = Some(dust_id);

        let placeholder = TextureRef::Static(noise_id);
        for layout in &LAYOUTS {
            let pass = Pass::new(&mut self.device, layout, &mut self.uniforms, placeholder)?;
            self.passes.push(pass);
        }
        self.uniforms.apply_parameters(&self.parameters)?;

        let (width, height) = physical_size(self.viewport);
        self.device.resize_surface(width, height);
        self.targets
            .resize(&mut self.device, self.viewport, self.parameters.render_scale)
            .map_err(|source| PipelineError::Allocation {
                what: "render targets",
                source,
            })?;
        Ok(())
    }

    /// Records a new drawable size; it takes effect at the next frame boundary.
    pub fn resize(&mut self, width: u32, height: u32, pixel_ratio: f32) {
        self.pending_viewport = Some(Viewport::new(width, height, pixel_ratio));
    }

    /// Writes parameter-driven uniforms immediately. A new render scale is
    /// applied at the next frame boundary.
    pub fn set_parameters(&mut self, parameters: &ParameterSet) -> Result<(), PipelineError> {
        self.parameters = *parameters;
        self.uniforms.apply_parameters(parameters)?;
        Ok(())
    }

    pub fn render(&mut self, dt: Duration) -> Result<FrameOutcome, PipelineError> {
        let time = self.clock.advance(dt);

        if let Some(viewport) = self.pending_viewport.take() {
            self.viewport = viewport;
            let (width, height) = physical_size(viewport);
            self.device.resize_surface(width, height);
        }
        let resized = self
            .targets
            .resize(&mut self.device, self.viewport, self.parameters.render_scale)
            .map_err(|source| PipelineError::Allocation {
                what: "render targets",
                source,
            })?;
        match resized {
            ResizeOutcome::Skipped => return Ok(self.skip(SkipReason::ZeroArea)),
            ResizeOutcome::Reallocated(size) => {
                tracing::info!(%size, "render targets reallocated; history cleared");
            }
            ResizeOutcome::Unchanged => {}
        }
        let Some(frame_targets) = self.frame_targets() else {
            return Ok(self.skip(SkipReason::ZeroArea));
        };
        let Some(size) = self.targets.size() else {
            return Ok(self.skip(SkipReason::ZeroArea));
        };

        match self.device.begin_frame().map_err(PipelineError::Frame)? {
            FrameAcquire::Ready => {}
            FrameAcquire::Unavailable => return Ok(self.skip(SkipReason::SurfaceUnavailable)),
        }
        if self.skipping {
            tracing::info!("rendering resumed");
            self.skipping = false;
        }

        let seconds = time.seconds();
        self.uniforms.write_shared(
            [size.width as f32, size.height as f32, 1.0],
            seconds * self.parameters.temporal.time_scale,
            seconds * self.parameters.temporal.star_time_scale,
        )?;
        let jitter = jitter_offset(
            self.frame_index,
            self.jitter_base,
            self.parameters.temporal.jitter,
        );
        self.uniforms.set_named(
            Scope::Pass(PassKind::Main),
            "uJitterOffset",
            UniformValue::Vec2(jitter),
        )?;

        let mut records = Vec::with_capacity(self.passes.len());
        for pass in &self.passes {
            for (name, texture) in self.channel_sources(pass.kind(), &frame_targets) {
                self.uniforms.set_named(
                    Scope::Pass(pass.kind()),
                    name,
                    UniformValue::Texture(texture),
                )?;
            }
            let destination = frame_targets.destination(pass.output());
            records.push(pass.execute(&mut self.device, &self.uniforms, destination)?);
        }

        self.device.end_frame().map_err(PipelineError::Frame)?;
        self.targets.swap();

        let report = FrameReport {
            frame_index: self.frame_index,
            time,
            target_size: size,
            passes: records,
        };
        self.frame_index += 1;
        Ok(FrameOutcome::Rendered(report))
    }

    fn skip(&mut self, reason: SkipReason) -> FrameOutcome {
        if !self.skipping {
            tracing::warn!(?reason, "skipping frames");
            self.skipping = true;
        }
        FrameOutcome::Skipped(reason)
    }

    fn frame_targets(&self) -> Option<FrameTargets> {
        Some(FrameTargets {
            read: self.targets.history_read()?,
            write: self.targets.history_write()?,
            bloom: self.targets.bloom()?,
            blur_horizontal: self.targets.blur_horizontal()?,
            blur_vertical: self.targets.blur_vertical()?,
        })
    }

    /// Texture bindings each pass sees this frame.
    fn channel_sources(
        &self,
        kind: PassKind,
        targets: &FrameTargets,
    ) -> Vec<(&'static str, TextureRef)> {
        match kind {
            PassKind::Main => {
                let mut sources = Vec::with_capacity(3);
                if let Some(noise) = self.noise {
                    sources.push(("iChannel0", TextureRef::Static(noise)));
                }
                if let Some(dust) = self.dust {
                    sources.push(("iChannel1", TextureRef::Static(dust)));
                }
                sources.push(("iChannel2", TextureRef::Target(targets.read)));
                sources
            }
            PassKind::BloomExtract => vec![("iChannel0", TextureRef::Target(targets.write))],
            PassKind::BlurHorizontal => vec![("iChannel0", TextureRef::Target(targets.bloom))],
            PassKind::BlurVertical => {
                vec![("iChannel0", TextureRef::Target(targets.blur_horizontal))]
            }
            PassKind::Composite => vec![
                ("iChannel0", TextureRef::Target(targets.write)),
                ("iChannel3", TextureRef::Target(targets.blur_vertical)),
            ],
        }
    }

    /// Releases every target, texture and program and hands the device back.
    pub fn unmount(mut self) -> D {
        self.teardown();
        tracing::info!(frames = self.frame_index, "unmounted black hole pipeline");
        self.device
    }

    fn teardown(&mut self) {
        self.targets.release_all(&mut self.device);
        for pass in self.passes.drain(..) {
            self.device.release_program(pass.program());
        }
        for texture in self.textures.drain(..) {
            self.device.release_texture(texture);
        }
        self.noise = None;
        self.dust = None;
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn targets(&self) -> &RenderTargetPool {
        &self.targets
    }

    pub fn uniforms(&self) -> &UniformStore {
        &self.uniforms
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Number of frames rendered so far; skipped frames do not count.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn pass(&self, kind: PassKind) -> Option<&Pass> {
        self.passes.iter().find(|pass| pass.kind() == kind)
    }

    pub fn noise_textures(&self) -> Option<(TextureId, TextureId)> {
        Some((self.noise?, self.dust?))
    }
}

/// Surface extent in device pixels. Shares the floor-then-at-least-1 rule
/// with the targets so a non-empty drawable never gets an empty surface.
fn physical_size(viewport: Viewport) -> (u32, u32) {
    viewport
        .target_size(1.0)
        .map_or((0, 0), |size| (size.width, size.height))
}

/// Radical inverse of `index` in `base`.
fn halton(mut index: u32, base: u32) -> f32 {
    let mut fraction = 1.0_f32;
    let mut result = 0.0_f32;
    while index > 0 {
        fraction /= base as f32;
        result += fraction * (index % base) as f32;
        index /= base;
    }
    result
}

/// Sub-pixel offset in `[-amount / 2, amount / 2]` for one frame.
fn jitter_offset(frame: u64, base: u32, amount: f32) -> [f32; 2] {
    let index = (frame % 1024) as u32 + base + 1;
    [
        (halton(index, 2) - 0.5) * amount,
        (halton(index, 3) - 0.5) * amount,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halton_matches_known_values() {
        assert_eq!(halton(1, 2), 0.5);
        assert_eq!(halton(2, 2), 0.25);
        assert_eq!(halton(3, 2), 0.75);
        assert!((halton(1, 3) - 1.0 / 3.0).abs() < 1e-6);
        assert!((halton(5, 3) - 7.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn jitter_stays_within_half_the_amount() {
        for frame in 0..2048 {
            let [x, y] = jitter_offset(frame, 17, 1.5);
            assert!(x.abs() <= 0.75 && y.abs() <= 0.75, "{frame}: {x}, {y}");
        }
        assert_eq!(jitter_offset(3, 0, 0.0), [0.0, 0.0]);
        assert_eq!(jitter_offset(9, 5, 1.0), jitter_offset(9, 5, 1.0));
    }

    #[test]
    fn physical_size_floors() {
        assert_eq!(physical_size(Viewport::new(101, 50, 1.5)), (151, 75));
        assert_eq!(physical_size(Viewport::new(1, 3, 0.5)), (1, 1));
        assert_eq!(physical_size(Viewport::new(0, 3, 2.0)), (0, 0));
    }
}
