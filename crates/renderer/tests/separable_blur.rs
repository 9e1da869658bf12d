use std::sync::Arc;
use std::time::Duration;

use glam::Vec4;
use image::RgbaImage;
use renderer::software::{shade_pixels, DrawInputs, FragmentProgram, SoftwareDevice};
use renderer::{
    DeviceError, PassKind, Pipeline, PipelineOptions, Viewport, BLUR_RADIUS, BLUR_WEIGHTS,
};
use tuning::ParameterSet;

/// Scattered bright sparks of varying intensity over a dim gradient.
struct Sparks;

impl FragmentProgram for Sparks {
    fn render(&self, _inputs: &DrawInputs<'_>, output: &mut RgbaImage) -> Result<(), DeviceError> {
        shade_pixels(output, |frag_coord| {
            let (x, y) = (frag_coord.x as u32, frag_coord.y as u32);
            if (x * 7 + y * 13) % 11 == 0 {
                let level = 0.8 + 0.1 * ((x + y) % 3) as f32;
                Vec4::new(level, level * 0.95, 1.0, 1.0)
            } else {
                Vec4::new(x as f32 / 64.0, 0.1, y as f32 / 64.0, 1.0)
            }
        });
        Ok(())
    }
}

fn weight(offset: i64) -> f32 {
    BLUR_WEIGHTS
        .get(offset.unsigned_abs() as usize)
        .copied()
        .unwrap_or(0.0)
}

/// Direct 2D convolution with the outer product of the 1D kernel, edges clamped.
fn convolve_2d(source: &RgbaImage) -> Vec<[f32; 4]> {
    let (width, height) = source.dimensions();
    let radius = BLUR_RADIUS as i64;
    let mut out = Vec::with_capacity((width * height) as usize);
    for y in 0..i64::from(height) {
        for x in 0..i64::from(width) {
            let mut sum = [0.0_f32; 4];
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let sx = (x + dx).clamp(0, i64::from(width) - 1) as u32;
                    let sy = (y + dy).clamp(0, i64::from(height) - 1) as u32;
                    let texel = source.get_pixel(sx, sy);
                    let k = weight(dx) * weight(dy);
                    for (channel, value) in sum.iter_mut().enumerate() {
                        *value += k * f32::from(texel[channel]) / 255.0;
                    }
                }
            }
            out.push(sum);
        }
    }
    out
}

#[test]
fn two_passes_match_the_full_kernel() {
    let device = SoftwareDevice::new().with_program(PassKind::Main, Arc::new(Sparks));
    let mut pipeline = Pipeline::mount(
        device,
        Viewport::new(40, 28, 1.0),
        ParameterSet::default(),
        PipelineOptions::seeded(5),
    )
    .unwrap();
    pipeline.render(Duration::from_millis(16)).unwrap();

    let targets = pipeline.targets();
    let bloom = pipeline.device().read_target(targets.bloom().unwrap()).unwrap();
    let blurred = pipeline
        .device()
        .read_target(targets.blur_vertical().unwrap())
        .unwrap();
    assert!(bloom.pixels().any(|pixel| pixel[3] > 0), "no pixel passed the bloom threshold");

    let expected = convolve_2d(bloom);
    let tolerance = 2.0 / 255.0;
    for ((x, y, actual), expected) in blurred.enumerate_pixels().zip(expected) {
        for channel in 0..4 {
            let actual = f32::from(actual[channel]) / 255.0;
            assert!(
                (actual - expected[channel]).abs() <= tolerance,
                "({x}, {y}) channel {channel}: {actual} vs {}",
                expected[channel]
            );
        }
    }
}
