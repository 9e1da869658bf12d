//! CPU versions of the five pass programs.
//!
//! Each program mirrors the GLSL source of the same pass in `src/shaders`;
//! the numeric constants below are also injected into the GLSL header so the
//! two backends agree on them.

use std::f32::consts::TAU;
use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};
use image::RgbaImage;

use super::{shade_pixels, Channel, DrawInputs, FragmentProgram};
use crate::device::DeviceError;
use crate::kernel::{self, BLUR_RADIUS};
use crate::noise::{DUST_SIDE, NOISE_SIDE};
use crate::types::PassKind;

/// Rec. 709 luma weights.
pub const LUMA: Vec3 = Vec3::new(0.2126, 0.7152, 0.0722);
/// Pixels whose luma is at or below this produce no bloom.
pub const BLOOM_THRESHOLD: f32 = 0.75;

pub(crate) const MARCH_STEPS: u32 = 64;
pub(crate) const HORIZON_RADIUS: f32 = 1.0;
pub(crate) const PHOTON_RING: f32 = 1.5;
pub(crate) const CAMERA_LIFT: f32 = 0.18;
pub(crate) const FOCAL_LENGTH: f32 = 1.6;
pub(crate) const WARP_SCALE: f32 = 0.1;
pub(crate) const DISC_OPACITY: f32 = 0.65;
pub(crate) const GLOW_SCALE: f32 = 0.02;
pub(crate) const STAR_VOLSTEPS: u32 = 16;
pub(crate) const STAR_ITERATIONS: u32 = 15;

pub(crate) const DISC_COOL: Vec3 = Vec3::new(0.85, 0.32, 0.08);
pub(crate) const DISC_HOT: Vec3 = Vec3::new(1.0, 0.86, 0.62);
pub(crate) const GLOW_COLOR: Vec3 = Vec3::new(1.0, 0.62, 0.32);

/// Built-in program for `pass`.
pub fn builtin(pass: PassKind) -> Arc<dyn FragmentProgram> {
    match pass {
        PassKind::Main => Arc::new(MainProgram),
        PassKind::BloomExtract => Arc::new(BloomExtractProgram),
        PassKind::BlurHorizontal => Arc::new(BlurProgram::horizontal()),
        PassKind::BlurVertical => Arc::new(BlurProgram::vertical()),
        PassKind::Composite => Arc::new(CompositeProgram),
    }
}

pub(crate) fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn pow3(base: Vec3, exponent: Vec3) -> Vec3 {
    Vec3::new(
        base.x.powf(exponent.x),
        base.y.powf(exponent.y),
        base.z.powf(exponent.z),
    )
}

fn rotate(a: f32, b: f32, angle: f32) -> (f32, f32) {
    let (sin, cos) = angle.sin_cos();
    (a * cos + b * sin, -a * sin + b * cos)
}

/// Mip level that keeps a `side`-texel texture near one texel per pixel.
fn texture_lod(side: u32, target_height: f32) -> f32 {
    (side as f32 / target_height.max(1.0)).log2().max(0.0)
}

fn texel_coords(frag_coord: Vec2) -> (i64, i64) {
    (frag_coord.x.floor() as i64, frag_coord.y.floor() as i64)
}

/// Raymarched accretion disc blended with the previous frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct MainProgram;

struct MainUniforms {
    resolution: Vec2,
    time: f32,
    warp: f32,
    disc_radius: f32,
    disc_width: f32,
    far: f32,
    eye_depth: f32,
    view_offset: Vec2,
    blend: f32,
    jitter: Vec2,
}

impl MainUniforms {
    fn read(inputs: &DrawInputs<'_>) -> Result<Self, DeviceError> {
        Ok(Self {
            resolution: inputs.vec3("iResolution")?.truncate(),
            time: inputs.float("iTime")?,
            warp: inputs.float("uWarpAmount")?,
            disc_radius: inputs.float("uDiscRadius")?,
            disc_width: inputs.float("uDiscWidth")?,
            far: inputs.float("uFar")?,
            eye_depth: inputs.float("uEyeDepth")?,
            view_offset: inputs.vec2("uViewOffset")?,
            blend: inputs.float("uTemporalBlend")?,
            jitter: inputs.vec2("uJitterOffset")?,
        })
    }
}

struct DiscTextures<'a> {
    noise: Channel<'a>,
    dust: Channel<'a>,
    noise_lod: f32,
    dust_lod: f32,
}

impl MainProgram {
    fn march(u: &MainUniforms, textures: &DiscTextures<'_>, frag_coord: Vec2) -> Vec4 {
        let mut uv = (frag_coord - 0.5 * u.resolution) / u.resolution.y;
        uv.y = -uv.y;
        uv += u.view_offset;

        let eye = Vec3::new(0.0, u.eye_depth * CAMERA_LIFT, -u.eye_depth);
        let forward = (-eye).normalize();
        let right = Vec3::Y.cross(forward).normalize();
        let up = forward.cross(right);
        let mut dir = (forward * FOCAL_LENGTH + right * uv.x + up * uv.y).normalize();

        let step = u.far / MARCH_STEPS as f32;
        let mut pos = eye;
        let mut color = Vec3::ZERO;
        let mut transmittance = 1.0_f32;
        for _ in 0..MARCH_STEPS {
            let r = pos.length();
            if r < HORIZON_RADIUS {
                break;
            }
            dir = (dir - pos * (u.warp * WARP_SCALE * step / (r * r * r))).normalize();
            let previous = pos;
            pos += dir * step;

            if previous.y * pos.y < 0.0 {
                let t = previous.y / (previous.y - pos.y);
                let hit = previous.lerp(pos, t);
                let distance = Vec2::new(hit.x, hit.z).length();
                let density = Self::disc_density(u, distance);
                if density > 0.0 {
                    let emission = Self::disc_emission(u, textures, hit, distance);
                    color += transmittance * emission * density;
                    transmittance *= 1.0 - DISC_OPACITY * density;
                }
            }

            let glow = (-(r - PHOTON_RING).abs() * 6.0).exp() * GLOW_SCALE * step;
            color += transmittance * glow * GLOW_COLOR;
            if transmittance < 0.01 {
                break;
            }
        }
        color.clamp(Vec3::ZERO, Vec3::ONE).extend(1.0)
    }

    fn disc_density(u: &MainUniforms, distance: f32) -> f32 {
        let half_width = u.disc_width * 0.5;
        let band = (1.0 - (distance - u.disc_radius).abs() / half_width).clamp(0.0, 1.0);
        band * band * smoothstep(HORIZON_RADIUS * 1.1, HORIZON_RADIUS * 1.6, distance)
    }

    fn disc_emission(
        u: &MainUniforms,
        textures: &DiscTextures<'_>,
        hit: Vec3,
        distance: f32,
    ) -> Vec3 {
        let angle = hit.z.atan2(hit.x) / TAU;
        let flow = u.time * 0.35 / distance.max(0.5);
        let grain = textures
            .noise
            .sample_level(Vec2::new(angle * 2.0 + flow * 0.1, distance * 0.08), textures.noise_lod)
            .x;
        let dust = textures
            .dust
            .sample_level(Vec2::new(angle * 4.0 - flow * 0.07, distance * 0.21), textures.dust_lod)
            .y;
        let turbulence = 0.35 + 0.65 * grain * (0.6 + 0.8 * dust);
        let heat = (1.8 / distance).clamp(0.0, 1.0);
        let beaming = 1.0 + 0.4 * (hit.x / distance.max(1e-3));
        DISC_COOL.lerp(DISC_HOT, heat) * turbulence * (0.9 + 1.6 * heat) * beaming
    }
}

const MAIN_REQUIRED: &[&str] = &[
    "iResolution",
    "iTime",
    "uWarpAmount",
    "uDiscRadius",
    "uDiscWidth",
    "uFar",
    "uEyeDepth",
    "uViewOffset",
    "uTemporalBlend",
    "uJitterOffset",
    "iChannel0",
    "iChannel1",
    "iChannel2",
];

impl FragmentProgram for MainProgram {
    fn required_inputs(&self) -> &[&'static str] {
        MAIN_REQUIRED
    }

    fn render(&self, inputs: &DrawInputs<'_>, output: &mut RgbaImage) -> Result<(), DeviceError> {
        let u = MainUniforms::read(inputs)?;
        let textures = DiscTextures {
            noise: inputs.channel(0)?,
            dust: inputs.channel(1)?,
            noise_lod: texture_lod(NOISE_SIDE, u.resolution.y),
            dust_lod: texture_lod(DUST_SIDE, u.resolution.y),
        };
        let history = inputs.channel(2)?;
        let keep = u.blend;
        shade_pixels(output, |frag_coord| {
            let sample = Self::march(&u, &textures, frag_coord + u.jitter);
            let (x, y) = texel_coords(frag_coord);
            sample * (1.0 - keep) + history.texel(x, y) * keep
        });
        Ok(())
    }
}

/// Keeps only pixels brighter than [`BLOOM_THRESHOLD`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BloomExtractProgram;

impl BloomExtractProgram {
    pub fn response(color: Vec4) -> Vec4 {
        let rgb = color.truncate();
        let luma = rgb.dot(LUMA);
        if luma <= BLOOM_THRESHOLD {
            return Vec4::ZERO;
        }
        let strength = ((luma - BLOOM_THRESHOLD) / (1.0 - BLOOM_THRESHOLD)).min(1.0);
        (rgb * strength).extend(strength)
    }
}

impl FragmentProgram for BloomExtractProgram {
    fn required_inputs(&self) -> &[&'static str] {
        &["iChannel0"]
    }

    fn render(&self, inputs: &DrawInputs<'_>, output: &mut RgbaImage) -> Result<(), DeviceError> {
        let source = inputs.channel(0)?;
        shade_pixels(output, |frag_coord| {
            let (x, y) = texel_coords(frag_coord);
            Self::response(source.texel(x, y))
        });
        Ok(())
    }
}

/// One axis of the separable Gaussian blur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlurProgram {
    step: (i64, i64),
}

impl BlurProgram {
    pub fn horizontal() -> Self {
        Self { step: (1, 0) }
    }

    pub fn vertical() -> Self {
        Self { step: (0, 1) }
    }
}

impl FragmentProgram for BlurProgram {
    fn required_inputs(&self) -> &[&'static str] {
        &["iChannel0"]
    }

    fn render(&self, inputs: &DrawInputs<'_>, output: &mut RgbaImage) -> Result<(), DeviceError> {
        let source = inputs.channel(0)?;
        let radius = BLUR_RADIUS as i64;
        shade_pixels(output, |frag_coord| {
            let (x, y) = texel_coords(frag_coord);
            (-radius..=radius).fold(Vec4::ZERO, |sum, offset| {
                let texel = source.texel(x + offset * self.step.0, y + offset * self.step.1);
                sum + texel * kernel::weight(offset as i32)
            })
        });
        Ok(())
    }
}

/// Colour grading, alpha matte and the starfield behind the hole.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompositeProgram;

struct CompositeUniforms {
    resolution: Vec2,
    star_time: f32,
    bloom_strength: f32,
    exposure: f32,
    highlight_clamp: f32,
    tone_map_power: Vec3,
    gamma: f32,
    saturation: f32,
    gain: Vec3,
    alpha_threshold: f32,
    alpha_softness: f32,
    star_zoom: f32,
    star_speed: f32,
    star_brightness: f32,
    star_darkmatter: f32,
    star_distfading: f32,
    star_saturation: f32,
    star_formuparam: f32,
    star_tile: f32,
    star_step: f32,
    star_center: Vec2,
    view_offset: Vec2,
    hole_radius: f32,
    hole_softness: f32,
}

impl CompositeUniforms {
    fn read(inputs: &DrawInputs<'_>) -> Result<Self, DeviceError> {
        Ok(Self {
            resolution: inputs.vec3("iResolution")?.truncate(),
            star_time: inputs.float("iStarTime")?,
            bloom_strength: inputs.float("uBloomStrength")?,
            exposure: inputs.float("uExposure")?,
            highlight_clamp: inputs.float("uHighlightClamp")?,
            tone_map_power: inputs.vec3("uToneMapPower")?,
            gamma: inputs.float("uFinalGamma")?,
            saturation: inputs.float("uSaturation")?,
            gain: inputs.vec3("uColorGain")?,
            alpha_threshold: inputs.float("uAlphaThreshold")?,
            alpha_softness: inputs.float("uAlphaSoftness")?,
            star_zoom: inputs.float("uStarZoom")?,
            star_speed: inputs.float("uStarSpeed")?,
            star_brightness: inputs.float("uStarBrightness")?,
            star_darkmatter: inputs.float("uStarDarkmatter")?,
            star_distfading: inputs.float("uStarDistfading")?,
            star_saturation: inputs.float("uStarSaturation")?,
            star_formuparam: inputs.float("uStarFormuparam")?,
            star_tile: inputs.float("uStarTile")?,
            star_step: inputs.float("uStarStepsize")?,
            star_center: inputs.vec2("uStarCenter")?,
            view_offset: inputs.vec2("uViewOffset")?,
            hole_radius: inputs.float("uStarHoleRadius")?,
            hole_softness: inputs.float("uStarHoleSoftness")?,
        })
    }
}

impl CompositeProgram {
    /// Graded colour and matte alpha for one pixel of the history and blur.
    fn grade(u: &CompositeUniforms, base: Vec3, bloom: Vec3) -> (Vec3, f32) {
        let mut color = base + bloom * u.bloom_strength;
        color *= u.exposure / 100.0;
        color = color.min(Vec3::splat(u.highlight_clamp));
        color = pow3(color, u.tone_map_power);
        color = pow3(color, Vec3::splat(u.gamma));
        let luma = color.dot(LUMA);
        color = Vec3::splat(luma).lerp(color, u.saturation).max(Vec3::ZERO);
        color *= u.gain;
        let alpha = smoothstep(
            u.alpha_threshold,
            u.alpha_threshold + u.alpha_softness,
            color.dot(LUMA),
        );
        (color, alpha)
    }

    /// Star Nest volumetric fractal, `uv` with a bottom-left origin.
    fn stars(u: &CompositeUniforms, uv: Vec2) -> Vec3 {
        let aspect = Vec2::new(u.resolution.x / u.resolution.y.max(1.0), 1.0);
        let centred = (uv - u.star_center) * aspect * u.star_zoom;
        let mut dir = centred.extend(1.0);
        let time = u.star_time * u.star_speed + 0.25;
        let a1 = 0.5 + u.view_offset.x * 0.5;
        let a2 = 0.8 + u.view_offset.y * 0.5;
        (dir.x, dir.z) = rotate(dir.x, dir.z, a1);
        (dir.x, dir.y) = rotate(dir.x, dir.y, a2);
        let mut from = Vec3::new(1.0, 0.5, 0.5) + Vec3::new(time * 2.0, time, -2.0);
        (from.x, from.z) = rotate(from.x, from.z, a1);
        (from.x, from.y) = rotate(from.x, from.y, a2);

        let tile = Vec3::splat(u.star_tile);
        let mut s = 0.1_f32;
        let mut fade = 1.0_f32;
        let mut v = Vec3::ZERO;
        for r in 0..STAR_VOLSTEPS {
            let mut p = from + s * dir * 0.5;
            p = (tile - p.rem_euclid(tile * 2.0)).abs();
            let mut previous_length = 0.0_f32;
            let mut a = 0.0_f32;
            for _ in 0..STAR_ITERATIONS {
                p = p.abs() / p.dot(p).max(1e-6) - u.star_formuparam;
                let length = p.length();
                a += (length - previous_length).abs();
                previous_length = length;
            }
            let dark = (u.star_darkmatter - a * a * 0.001).max(0.0);
            a *= a * a;
            if r > 6 {
                fade *= 1.0 - dark;
            }
            v += Vec3::splat(fade);
            v += Vec3::new(s, s * s, s * s * s * s) * a * u.star_brightness * fade;
            fade *= u.star_distfading;
            s += u.star_step;
        }
        Vec3::splat(v.length()).lerp(v, u.star_saturation) * 0.01
    }

    fn hole_mask(u: &CompositeUniforms, uv: Vec2) -> f32 {
        let aspect = Vec2::new(u.resolution.x / u.resolution.y.max(1.0), 1.0);
        let distance = ((uv - u.star_center) * aspect).length();
        smoothstep(u.hole_radius, u.hole_radius + u.hole_softness, distance)
    }
}

impl FragmentProgram for CompositeProgram {
    fn required_inputs(&self) -> &[&'static str] {
        &["iResolution", "iStarTime", "iChannel0", "iChannel3"]
    }

    fn render(&self, inputs: &DrawInputs<'_>, output: &mut RgbaImage) -> Result<(), DeviceError> {
        let u = CompositeUniforms::read(inputs)?;
        let history = inputs.channel(0)?;
        let blurred = inputs.channel(3)?;
        let (width, height) = output.dimensions();
        let screen = Vec2::new(width as f32, height as f32);
        shade_pixels(output, |frag_coord| {
            let uv = frag_coord / screen;
            let base = history.sample(uv).truncate();
            let bloom = blurred.sample(uv).truncate();
            let (color, alpha) = Self::grade(&u, base, bloom);
            let star_uv = Vec2::new(uv.x, 1.0 - uv.y);
            let stars = Self::stars(&u, star_uv) * Self::hole_mask(&u, star_uv);
            (color * alpha + stars * (1.0 - alpha)).extend(alpha)
        });
        Ok(())
    }
}
