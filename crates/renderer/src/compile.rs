use std::borrow::Cow;
use std::fmt::Write as _;

use glam::Vec3;
use wgpu::naga::ShaderStage;

use crate::device::BoundInput;
use crate::kernel::{self, BLUR_RADIUS};
use crate::noise::{DUST_SIDE, NOISE_SIDE};
use crate::pass::InputDecl;
use crate::software::programs::{
    BLOOM_THRESHOLD, CAMERA_LIFT, DISC_COOL, DISC_HOT, DISC_OPACITY, FOCAL_LENGTH, GLOW_COLOR,
    GLOW_SCALE, HORIZON_RADIUS, LUMA, MARCH_STEPS, PHOTON_RING, STAR_ITERATIONS, STAR_VOLSTEPS,
    WARP_SCALE,
};
use crate::types::{PassKind, UniformValue, ValueKind, CHANNEL_COUNT};

const MAIN_BODY: &str = include_str!("shaders/main.frag.glsl");
const BLOOM_BODY: &str = include_str!("shaders/bloom.frag.glsl");
const BLUR_BODY: &str = include_str!("shaders/blur.frag.glsl");
const COMPOSITE_BODY: &str = include_str!("shaders/composite.frag.glsl");

/// Compiles the static full-screen triangle vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("fullscreen triangle vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(VERTEX_SHADER_GLSL),
            stage: ShaderStage::Vertex,
            defines: &[],
        },
    })
}

pub(crate) fn compile_fragment_shader(
    device: &wgpu::Device,
    pass: PassKind,
    source: String,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(pass.label()),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source),
            stage: ShaderStage::Fragment,
            defines: &[],
        },
    })
}

/// std140 placement of one scalar or vector input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct UniformField {
    pub name: &'static str,
    pub kind: ValueKind,
    pub offset: u32,
}

/// std140 layout of a pass's non-texture inputs, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct UniformLayout {
    fields: Vec<UniformField>,
    size: u32,
}

fn std140(kind: ValueKind) -> Option<(u32, u32)> {
    match kind {
        ValueKind::Float => Some((4, 4)),
        ValueKind::Vec2 => Some((8, 8)),
        ValueKind::Vec3 => Some((16, 12)),
        ValueKind::Texture => None,
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

impl UniformLayout {
    pub(crate) fn new(inputs: &[InputDecl]) -> Self {
        let mut fields = Vec::new();
        let mut cursor = 0;
        for input in inputs {
            let Some((alignment, size)) = std140(input.kind) else {
                continue;
            };
            let offset = align_to(cursor, alignment);
            fields.push(UniformField {
                name: input.name,
                kind: input.kind,
                offset,
            });
            cursor = offset + size;
        }
        Self {
            fields,
            size: align_to(cursor, 16).max(16),
        }
    }

    pub(crate) fn fields(&self) -> &[UniformField] {
        &self.fields
    }

    pub(crate) fn size(&self) -> u32 {
        self.size
    }

    /// Buffer contents for one draw. Inputs without a field are ignored.
    pub(crate) fn pack(&self, inputs: &[BoundInput]) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size as usize];
        for input in inputs {
            let Some(field) = self.fields.iter().find(|field| field.name == input.name) else {
                continue;
            };
            let floats: &[f32] = match &input.value {
                UniformValue::Float(value) => std::slice::from_ref(value),
                UniformValue::Vec2(value) => value,
                UniformValue::Vec3(value) => value,
                UniformValue::Texture(_) => continue,
            };
            let start = field.offset as usize;
            let data: &[u8] = bytemuck::cast_slice(floats);
            bytes[start..start + data.len()].copy_from_slice(data);
        }
        bytes
    }
}

fn glsl_type(kind: ValueKind) -> &'static str {
    match kind {
        ValueKind::Float => "float",
        ValueKind::Vec2 => "vec2",
        ValueKind::Vec3 => "vec3",
        ValueKind::Texture => "texture2D",
    }
}

fn float(value: f32) -> String {
    format!("{value:?}")
}

fn vec3(value: Vec3) -> String {
    format!("vec3({}, {}, {})", float(value.x), float(value.y), float(value.z))
}

/// Full fragment source for `pass`: generated header followed by the pass body.
pub(crate) fn fragment_source(pass: PassKind, inputs: &[InputDecl]) -> String {
    let layout = UniformLayout::new(inputs);
    let mut source = header(&layout);
    if let Some(direction) = blur_direction(pass) {
        let _ = writeln!(source, "#define BLUR_DIRECTION {direction}");
    }
    source.push_str("#line 1\n");
    source.push_str(body(pass));
    source
}

fn body(pass: PassKind) -> &'static str {
    match pass {
        PassKind::Main => MAIN_BODY,
        PassKind::BloomExtract => BLOOM_BODY,
        PassKind::BlurHorizontal | PassKind::BlurVertical => BLUR_BODY,
        PassKind::Composite => COMPOSITE_BODY,
    }
}

fn blur_direction(pass: PassKind) -> Option<&'static str> {
    match pass {
        PassKind::BlurHorizontal => Some("ivec2(1, 0)"),
        PassKind::BlurVertical => Some("ivec2(0, 1)"),
        _ => None,
    }
}

/// Uniform block, channel bindings and shared constants.
///
/// Names in the block carry a leading underscore and are re-exposed through
/// macros so pass bodies refer to inputs by their plain names.
pub(crate) fn header(layout: &UniformLayout) -> String {
    let mut out = String::from("#version 450\n");
    out.push_str("layout(location = 0) in vec2 v_uv;\n");
    out.push_str("layout(location = 0) out vec4 outColor;\n\n");

    out.push_str("layout(std140, set = 0, binding = 0) uniform PassInputs {\n");
    if layout.fields().is_empty() {
        out.push_str("    float _unused;\n");
    }
    for field in layout.fields() {
        let _ = writeln!(out, "    {} _{};", glsl_type(field.kind), field.name);
    }
    out.push_str("} ubo;\n\n");
    for field in layout.fields() {
        let _ = writeln!(out, "#define {0} ubo._{0}", field.name);
    }
    out.push('\n');

    for channel in 0..CHANNEL_COUNT {
        let _ = writeln!(
            out,
            "layout(set = 1, binding = {}) uniform texture2D channel{channel}_texture;",
            channel * 2
        );
        let _ = writeln!(
            out,
            "layout(set = 1, binding = {}) uniform sampler channel{channel}_sampler;",
            channel * 2 + 1
        );
    }
    for channel in 0..CHANNEL_COUNT {
        let _ = writeln!(
            out,
            "#define iChannel{channel} sampler2D(channel{channel}_texture, channel{channel}_sampler)"
        );
    }
    out.push('\n');

    let _ = writeln!(out, "const vec3 LUMA = {};", vec3(LUMA));
    let _ = writeln!(out, "const float BLOOM_THRESHOLD = {};", float(BLOOM_THRESHOLD));
    let _ = writeln!(out, "const int BLUR_RADIUS = {BLUR_RADIUS};");
    let _ = writeln!(out, "{}", kernel::glsl_weights());
    let _ = writeln!(out, "const int MARCH_STEPS = {MARCH_STEPS};");
    let _ = writeln!(out, "const float HORIZON_RADIUS = {};", float(HORIZON_RADIUS));
    let _ = writeln!(out, "const float PHOTON_RING = {};", float(PHOTON_RING));
    let _ = writeln!(out, "const float CAMERA_LIFT = {};", float(CAMERA_LIFT));
    let _ = writeln!(out, "const float FOCAL_LENGTH = {};", float(FOCAL_LENGTH));
    let _ = writeln!(out, "const float WARP_SCALE = {};", float(WARP_SCALE));
    let _ = writeln!(out, "const float DISC_OPACITY = {};", float(DISC_OPACITY));
    let _ = writeln!(out, "const float GLOW_SCALE = {};", float(GLOW_SCALE));
    let _ = writeln!(out, "const vec3 DISC_COOL = {};", vec3(DISC_COOL));
    let _ = writeln!(out, "const vec3 DISC_HOT = {};", vec3(DISC_HOT));
    let _ = writeln!(out, "const vec3 GLOW_COLOR = {};", vec3(GLOW_COLOR));
    let _ = writeln!(out, "const int STAR_VOLSTEPS = {STAR_VOLSTEPS};");
    let _ = writeln!(out, "const int STAR_ITERATIONS = {STAR_ITERATIONS};");
    let _ = writeln!(out, "const float NOISE_SIDE = {};", float(NOISE_SIDE as f32));
    let _ = writeln!(out, "const float DUST_SIDE = {};", float(DUST_SIDE as f32));
    out.push_str("const float TAU = 6.28318530718;\n");
    out
}

/// Full-screen triangle. `v_uv` follows texture orientation: (0, 0) is the
/// top-left corner of the destination.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    vec2 pos = positions[gl_VertexIndex];
    v_uv = vec2(pos.x * 0.5 + 0.5, 0.5 - pos.y * 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::{layout, LAYOUTS};

    #[test]
    fn std140_packs_vec3_then_float_into_one_slot() {
        let layout = UniformLayout::new(layout(PassKind::Main).inputs);
        let offsets: Vec<(&str, u32)> = layout
            .fields()
            .iter()
            .map(|field| (field.name, field.offset))
            .collect();
        assert_eq!(offsets[0], ("iResolution", 0));
        assert_eq!(offsets[1], ("iTime", 12));
        assert_eq!(offsets[2], ("uWarpAmount", 16));
        assert!(offsets.contains(&("uViewOffset", 40)));
        assert!(offsets.contains(&("uJitterOffset", 56)));
        assert_eq!(layout.size(), 64);
        assert!(layout.fields().iter().all(|field| field.kind != ValueKind::Texture));
    }

    #[test]
    fn filter_block_rounds_up_to_sixteen_bytes() {
        let layout = UniformLayout::new(layout(PassKind::BloomExtract).inputs);
        assert_eq!(layout.fields().len(), 1);
        assert_eq!(layout.size(), 16);
    }

    #[test]
    fn pack_writes_values_at_their_offsets() {
        let layout = UniformLayout::new(layout(PassKind::Main).inputs);
        let bytes = layout.pack(&[
            BoundInput {
                name: "iTime",
                value: UniformValue::Float(2.5),
            },
            BoundInput {
                name: "uJitterOffset",
                value: UniformValue::Vec2([0.25, -0.5]),
            },
        ]);
        let floats: &[f32] = bytemuck::cast_slice(&bytes);
        assert_eq!(floats[3], 2.5);
        assert_eq!(floats[14], 0.25);
        assert_eq!(floats[15], -0.5);
        assert_eq!(floats[0], 0.0);
    }

    #[test]
    fn every_pass_source_defines_its_inputs() {
        for pass_layout in &LAYOUTS {
            let source = fragment_source(pass_layout.kind, pass_layout.inputs);
            assert!(source.starts_with("#version 450"));
            assert!(source.contains("void main()"));
            for input in pass_layout.inputs {
                if input.kind == ValueKind::Texture {
                    assert!(source.contains(&format!("#define {} sampler2D", input.name)));
                } else {
                    assert!(source.contains(&format!("#define {0} ubo._{0}", input.name)));
                }
            }
        }
    }

    #[test]
    fn only_blur_passes_get_a_direction() {
        let horizontal = layout(PassKind::BlurHorizontal);
        let source = fragment_source(horizontal.kind, horizontal.inputs);
        assert!(source.contains("#define BLUR_DIRECTION ivec2(1, 0)"));
        let bloom = layout(PassKind::BloomExtract);
        let source = fragment_source(bloom.kind, bloom.inputs);
        assert!(!source.contains("BLUR_DIRECTION ivec2"));
    }
}
