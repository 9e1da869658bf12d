//! Deterministic CPU implementation of [`RenderDevice`].
//!
//! Targets are `image::RgbaImage`s and programs are Rust closures over every
//! pixel centre, so a whole frame is reproducible bit for bit. Headless runs
//! and the test-suite use this backend; tests can swap the program of any pass
//! through [`SoftwareDevice::with_program`].

pub(crate) mod programs;
mod sampler;

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};
use image::{Rgba, RgbaImage};

use crate::device::{
    BoundInput, DeviceError, FrameAcquire, ProgramDescriptor, RenderDevice, ResourceCounts,
};
use crate::noise::NoiseTexture;
use crate::types::{
    channel_index, Destination, PassKind, ProgramId, TargetDescriptor, TargetId, TextureId,
    TextureRef, UniformValue, CHANNEL_COUNT,
};

pub use programs::{
    builtin, BlurProgram, BloomExtractProgram, CompositeProgram, MainProgram, BLOOM_THRESHOLD,
    LUMA,
};
pub use sampler::Channel;

/// A fragment program executed once per destination pixel.
pub trait FragmentProgram: Send + Sync {
    /// Inputs that must be declared for the program to build.
    fn required_inputs(&self) -> &[&'static str] {
        &[]
    }

    fn render(&self, inputs: &DrawInputs<'_>, output: &mut RgbaImage) -> Result<(), DeviceError>;
}

/// Values and channels bound for one draw.
pub struct DrawInputs<'a> {
    values: &'a [BoundInput],
    channels: [Option<Channel<'a>>; CHANNEL_COUNT],
}

impl<'a> DrawInputs<'a> {
    pub fn value(&self, name: &str) -> Result<UniformValue, DeviceError> {
        self.values
            .iter()
            .find(|input| input.name == name)
            .map(|input| input.value)
            .ok_or_else(|| DeviceError::input(name, "not bound"))
    }

    pub fn float(&self, name: &str) -> Result<f32, DeviceError> {
        match self.value(name)? {
            UniformValue::Float(value) => Ok(value),
            other => Err(DeviceError::input(name, format!("expected float, got {other:?}"))),
        }
    }

    pub fn vec2(&self, name: &str) -> Result<Vec2, DeviceError> {
        match self.value(name)? {
            UniformValue::Vec2(value) => Ok(Vec2::from_array(value)),
            other => Err(DeviceError::input(name, format!("expected vec2, got {other:?}"))),
        }
    }

    pub fn vec3(&self, name: &str) -> Result<Vec3, DeviceError> {
        match self.value(name)? {
            UniformValue::Vec3(value) => Ok(Vec3::from_array(value)),
            other => Err(DeviceError::input(name, format!("expected vec3, got {other:?}"))),
        }
    }

    pub fn channel(&self, index: usize) -> Result<Channel<'a>, DeviceError> {
        self.channels
            .get(index)
            .copied()
            .flatten()
            .ok_or_else(|| DeviceError::input(&format!("iChannel{index}"), "not bound"))
    }
}

/// Runs `shade` at every pixel centre (top-left origin) and stores the
/// result as clamped, rounded RGBA8.
pub fn shade_pixels<F>(output: &mut RgbaImage, mut shade: F)
where
    F: FnMut(Vec2) -> Vec4,
{
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        let color = shade(Vec2::new(x as f32 + 0.5, y as f32 + 0.5));
        *pixel = quantize(color);
    }
}

pub fn quantize(color: Vec4) -> Rgba<u8> {
    let bytes = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    Rgba([bytes.x as u8, bytes.y as u8, bytes.z as u8, bytes.w as u8])
}

struct CompiledProgram {
    pass: PassKind,
    program: Arc<dyn FragmentProgram>,
}

#[derive(Default)]
pub struct SoftwareDevice {
    next_id: u32,
    programs: HashMap<u32, CompiledProgram>,
    targets: HashMap<u32, RgbaImage>,
    textures: HashMap<u32, NoiseTexture>,
    overrides: HashMap<PassKind, Arc<dyn FragmentProgram>>,
    surface: (u32, u32),
    screen: RgbaImage,
    frame_open: bool,
    frames_presented: u64,
    draws: u64,
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `program` instead of the built-in one for every later compile of `pass`.
    pub fn with_program(mut self, pass: PassKind, program: Arc<dyn FragmentProgram>) -> Self {
        self.overrides.insert(pass, program);
        self
    }

    pub fn read_target(&self, id: TargetId) -> Option<&RgbaImage> {
        self.targets.get(&id.raw())
    }

    /// Replaces a target's contents; the image must match the target size.
    pub fn write_target(&mut self, id: TargetId, image: &RgbaImage) -> Result<(), DeviceError> {
        let target = self
            .targets
            .get_mut(&id.raw())
            .ok_or(DeviceError::UnknownHandle {
                kind: "target",
                id: id.raw(),
            })?;
        if target.dimensions() != image.dimensions() {
            return Err(DeviceError::input(
                "target",
                format!(
                    "size {:?} does not match target size {:?}",
                    image.dimensions(),
                    target.dimensions()
                ),
            ));
        }
        target.copy_from_slice(image.as_raw());
        Ok(())
    }

    pub fn read_texture(&self, id: TextureId) -> Option<&NoiseTexture> {
        self.textures.get(&id.raw())
    }

    /// Last image presented by a draw to the screen.
    pub fn screen(&self) -> &RgbaImage {
        &self.screen
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn draw_count(&self) -> u64 {
        self.draws
    }

    pub fn program_pass(&self, id: ProgramId) -> Option<PassKind> {
        self.programs.get(&id.raw()).map(|compiled| compiled.pass)
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    fn resolve_channels<'a>(
        targets: &'a HashMap<u32, RgbaImage>,
        textures: &'a HashMap<u32, NoiseTexture>,
        inputs: &[BoundInput],
    ) -> Result<[Option<Channel<'a>>; CHANNEL_COUNT], DeviceError> {
        let mut channels = [None; CHANNEL_COUNT];
        for input in inputs {
            let UniformValue::Texture(texture) = input.value else {
                continue;
            };
            let Some(slot) = channel_index(input.name) else {
                return Err(DeviceError::input(input.name, "textures bind to iChannel0-3"));
            };
            channels[slot] = Some(match texture {
                TextureRef::Target(id) => Channel::Target(targets.get(&id.raw()).ok_or(
                    DeviceError::UnknownHandle {
                        kind: "target",
                        id: id.raw(),
                    },
                )?),
                TextureRef::Static(id) => Channel::Texture(textures.get(&id.raw()).ok_or(
                    DeviceError::UnknownHandle {
                        kind: "texture",
                        id: id.raw(),
                    },
                )?),
            });
        }
        Ok(channels)
    }
}

impl RenderDevice for SoftwareDevice {
    fn compile_program(
        &mut self,
        descriptor: &ProgramDescriptor<'_>,
    ) -> Result<ProgramId, DeviceError> {
        let program = self
            .overrides
            .get(&descriptor.pass)
            .cloned()
            .unwrap_or_else(|| builtin(descriptor.pass));
        for required in program.required_inputs() {
            if !descriptor.inputs.iter().any(|input| input.name == *required) {
                return Err(DeviceError::Compile {
                    program: descriptor.pass.label().to_string(),
                    message: format!("'{required}' is not declared"),
                });
            }
        }
        let id = self.allocate_id();
        self.programs.insert(
            id,
            CompiledProgram {
                pass: descriptor.pass,
                program,
            },
        );
        Ok(ProgramId::new(id))
    }

    fn create_target(&mut self, descriptor: &TargetDescriptor) -> Result<TargetId, DeviceError> {
        let size = descriptor.size;
        if size.width == 0 || size.height == 0 {
            return Err(DeviceError::Allocation {
                what: descriptor.label.to_string(),
                message: format!("empty size {size}"),
            });
        }
        let id = self.allocate_id();
        self.targets
            .insert(id, RgbaImage::new(size.width, size.height));
        Ok(TargetId::new(id))
    }

    fn upload_texture(
        &mut self,
        _label: &'static str,
        texture: &NoiseTexture,
    ) -> Result<TextureId, DeviceError> {
        let id = self.allocate_id();
        self.textures.insert(id, texture.clone());
        Ok(TextureId::new(id))
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.surface = (width, height);
    }

    fn begin_frame(&mut self) -> Result<FrameAcquire, DeviceError> {
        let (width, height) = self.surface;
        if width == 0 || height == 0 {
            return Ok(FrameAcquire::Unavailable);
        }
        if self.screen.dimensions() != self.surface {
            self.screen = RgbaImage::new(width, height);
        }
        self.frame_open = true;
        Ok(FrameAcquire::Ready)
    }

    fn draw(
        &mut self,
        program: ProgramId,
        inputs: &[BoundInput],
        destination: Destination,
    ) -> Result<(), DeviceError> {
        if !self.frame_open {
            return Err(DeviceError::NoFrame);
        }
        let program = self
            .programs
            .get(&program.raw())
            .map(|compiled| Arc::clone(&compiled.program))
            .ok_or(DeviceError::UnknownHandle {
                kind: "program",
                id: program.raw(),
            })?;

        if let Destination::Target(id) = destination {
            let feedback = inputs
                .iter()
                .any(|input| input.value == UniformValue::Texture(TextureRef::Target(id)));
            if feedback {
                return Err(DeviceError::input(
                    "destination",
                    "a draw cannot sample the target it writes",
                ));
            }
        }

        let mut output = match destination {
            Destination::Target(id) => {
                self.targets
                    .remove(&id.raw())
                    .ok_or(DeviceError::UnknownHandle {
                        kind: "target",
                        id: id.raw(),
                    })?
            }
            Destination::Screen => std::mem::take(&mut self.screen),
        };

        let result = Self::resolve_channels(&self.targets, &self.textures, inputs).and_then(
            |channels| {
                let bound = DrawInputs {
                    values: inputs,
                    channels,
                };
                program.render(&bound, &mut output)
            },
        );

        match destination {
            Destination::Target(id) => {
                self.targets.insert(id.raw(), output);
            }
            Destination::Screen => self.screen = output,
        }
        self.draws += 1;
        result
    }

    fn end_frame(&mut self) -> Result<(), DeviceError> {
        if !self.frame_open {
            return Err(DeviceError::NoFrame);
        }
        self.frame_open = false;
        self.frames_presented += 1;
        Ok(())
    }

    fn release_program(&mut self, id: ProgramId) {
        self.programs.remove(&id.raw());
    }

    fn release_target(&mut self, id: TargetId) {
        self.targets.remove(&id.raw());
    }

    fn release_texture(&mut self, id: TextureId) {
        self.textures.remove(&id.raw());
    }

    fn live_resources(&self) -> ResourceCounts {
        ResourceCounts {
            programs: self.programs.len(),
            targets: self.targets.len(),
            textures: self.textures.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::layout;
    use crate::types::TargetSize;

    struct Fill(Vec4);

    impl FragmentProgram for Fill {
        fn render(&self, _: &DrawInputs<'_>, output: &mut RgbaImage) -> Result<(), DeviceError> {
            shade_pixels(output, |_| self.0);
            Ok(())
        }
    }

    struct NeedsMissing;

    impl FragmentProgram for NeedsMissing {
        fn required_inputs(&self) -> &[&'static str] {
            &["uMissing"]
        }

        fn render(&self, _: &DrawInputs<'_>, _: &mut RgbaImage) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    fn compile(device: &mut SoftwareDevice, pass: PassKind) -> Result<ProgramId, DeviceError> {
        let layout = layout(pass);
        device.compile_program(&ProgramDescriptor {
            pass,
            inputs: layout.inputs,
            output: layout.output.kind(),
        })
    }

    #[test]
    fn draws_land_in_the_destination() {
        let mut device = SoftwareDevice::new()
            .with_program(PassKind::Main, Arc::new(Fill(Vec4::new(1.0, 0.5, 0.0, 1.0))));
        let program = compile(&mut device, PassKind::Main).unwrap();
        let target = device
            .create_target(&TargetDescriptor::new("t", TargetSize::new(3, 2)))
            .unwrap();
        device.resize_surface(3, 2);
        assert_eq!(device.begin_frame().unwrap(), FrameAcquire::Ready);
        device
            .draw(program, &[], Destination::Target(target))
            .unwrap();
        device.end_frame().unwrap();
        let image = device.read_target(target).unwrap();
        assert!(image.pixels().all(|pixel| *pixel == Rgba([255, 128, 0, 255])));
        assert_eq!(device.draw_count(), 1);
    }

    #[test]
    fn missing_required_input_fails_compilation() {
        let mut device =
            SoftwareDevice::new().with_program(PassKind::BloomExtract, Arc::new(NeedsMissing));
        let err = compile(&mut device, PassKind::BloomExtract).unwrap_err();
        match err {
            DeviceError::Compile { program, message } => {
                assert_eq!(program, "bloom-extract");
                assert!(message.contains("uMissing"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn builtin_programs_compile_against_their_layouts() {
        let mut device = SoftwareDevice::new();
        for pass in PassKind::ALL {
            compile(&mut device, pass).unwrap();
        }
        assert_eq!(device.live_resources().programs, 5);
    }

    #[test]
    fn sampling_the_destination_is_rejected() {
        let mut device = SoftwareDevice::new();
        let program = compile(&mut device, PassKind::BloomExtract).unwrap();
        let target = device
            .create_target(&TargetDescriptor::new("t", TargetSize::new(2, 2)))
            .unwrap();
        device.resize_surface(2, 2);
        device.begin_frame().unwrap();
        let inputs = [
            BoundInput {
                name: "iResolution",
                value: UniformValue::Vec3([2.0, 2.0, 1.0]),
            },
            BoundInput {
                name: "iChannel0",
                value: UniformValue::Texture(TextureRef::Target(target)),
            },
        ];
        let err = device
            .draw(program, &inputs, Destination::Target(target))
            .unwrap_err();
        assert!(matches!(err, DeviceError::Input { .. }));
        assert!(device.read_target(target).is_some());
    }

    #[test]
    fn draw_outside_a_frame_is_an_error() {
        let mut device = SoftwareDevice::new();
        let program = compile(&mut device, PassKind::Composite).unwrap();
        let err = device.draw(program, &[], Destination::Screen).unwrap_err();
        assert!(matches!(err, DeviceError::NoFrame));
    }

    #[test]
    fn zero_surface_is_unavailable() {
        let mut device = SoftwareDevice::new();
        assert_eq!(device.begin_frame().unwrap(), FrameAcquire::Unavailable);
    }

    #[test]
    fn textures_must_bind_to_channel_slots() {
        let mut device = SoftwareDevice::new();
        let program = compile(&mut device, PassKind::BloomExtract).unwrap();
        let source = device
            .create_target(&TargetDescriptor::new("s", TargetSize::new(2, 2)))
            .unwrap();
        let dest = device
            .create_target(&TargetDescriptor::new("d", TargetSize::new(2, 2)))
            .unwrap();
        device.resize_surface(2, 2);
        device.begin_frame().unwrap();
        let inputs = [BoundInput {
            name: "uTexture",
            value: UniformValue::Texture(TextureRef::Target(source)),
        }];
        let err = device
            .draw(program, &inputs, Destination::Target(dest))
            .unwrap_err();
        assert!(matches!(err, DeviceError::Input { ref name, .. } if name == "uTexture"));
    }
}
