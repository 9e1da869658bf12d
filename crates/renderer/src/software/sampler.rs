//! Texture lookups for the software rasterizer.
//!
//! Render targets are sampled clamp-to-edge with bilinear filtering; noise
//! textures repeat and filter trilinearly across their mip chain.

use glam::{Vec2, Vec4};
use image::RgbaImage;

use crate::noise::NoiseTexture;

#[derive(Clone, Copy, Debug)]
pub enum Channel<'a> {
    Target(&'a RgbaImage),
    Texture(&'a NoiseTexture),
}

#[derive(Clone, Copy)]
enum Address {
    Clamp,
    Repeat,
}

impl<'a> Channel<'a> {
    pub fn size(&self) -> (u32, u32) {
        match self {
            Channel::Target(image) => image.dimensions(),
            Channel::Texture(texture) => texture.base().dimensions(),
        }
    }

    /// Exact texel read with the channel's addressing applied to `x, y`.
    pub fn texel(&self, x: i64, y: i64) -> Vec4 {
        match self {
            Channel::Target(image) => fetch(image, x, y, Address::Clamp),
            Channel::Texture(texture) => fetch(texture.base(), x, y, Address::Repeat),
        }
    }

    /// Bilinear lookup at normalised coordinates on the base level.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        self.sample_level(uv, 0.0)
    }

    /// Lookup at an explicit level of detail. Targets have no mips and ignore it.
    pub fn sample_level(&self, uv: Vec2, lod: f32) -> Vec4 {
        match self {
            Channel::Target(image) => bilinear(image, uv, Address::Clamp),
            Channel::Texture(texture) => {
                let levels = texture.levels();
                let max_level = (levels.len() - 1) as f32;
                let lod = lod.clamp(0.0, max_level);
                let lower = lod.floor() as usize;
                let upper = (lower + 1).min(levels.len() - 1);
                let near = bilinear(&levels[lower], uv, Address::Repeat);
                if upper == lower {
                    return near;
                }
                let far = bilinear(&levels[upper], uv, Address::Repeat);
                near.lerp(far, lod - lower as f32)
            }
        }
    }
}

fn fetch(image: &RgbaImage, x: i64, y: i64, address: Address) -> Vec4 {
    let (width, height) = image.dimensions();
    let (x, y) = match address {
        Address::Clamp => (
            x.clamp(0, i64::from(width) - 1),
            y.clamp(0, i64::from(height) - 1),
        ),
        Address::Repeat => (x.rem_euclid(i64::from(width)), y.rem_euclid(i64::from(height))),
    };
    let pixel = image.get_pixel(x as u32, y as u32);
    Vec4::new(
        f32::from(pixel[0]),
        f32::from(pixel[1]),
        f32::from(pixel[2]),
        f32::from(pixel[3]),
    ) / 255.0
}

fn bilinear(image: &RgbaImage, uv: Vec2, address: Address) -> Vec4 {
    let (width, height) = image.dimensions();
    let x = uv.x * width as f32 - 0.5;
    let y = uv.y * height as f32 - 0.5;
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let top = fetch(image, x0, y0, address).lerp(fetch(image, x0 + 1, y0, address), fx);
    let bottom = fetch(image, x0, y0 + 1, address).lerp(fetch(image, x0 + 1, y0 + 1, address), fx);
    top.lerp(bottom, fy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient() -> RgbaImage {
        RgbaImage::from_fn(4, 2, |x, y| Rgba([(x * 60) as u8, (y * 200) as u8, 0, 255]))
    }

    #[test]
    fn texel_centres_sample_exactly() {
        let image = gradient();
        let channel = Channel::Target(&image);
        let value = channel.sample(Vec2::new(2.5 / 4.0, 0.5 / 2.0));
        assert!((value.x - 120.0 / 255.0).abs() < 1e-5);
        assert!(value.y.abs() < 1e-5);
    }

    #[test]
    fn targets_clamp_and_textures_repeat() {
        let image = gradient();
        let target = Channel::Target(&image);
        assert_eq!(target.texel(-3, 0), target.texel(0, 0));
        assert_eq!(target.texel(9, 5), target.texel(3, 1));

        let texture = NoiseTexture::from_base(gradient());
        let noise = Channel::Texture(&texture);
        assert_eq!(noise.texel(-1, 0), noise.texel(3, 0));
        assert_eq!(noise.texel(4, 3), noise.texel(0, 1));
    }

    #[test]
    fn coarse_levels_average_the_base() {
        let base = RgbaImage::from_fn(2, 2, |x, _| {
            if x == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        let texture = NoiseTexture::from_base(base);
        let channel = Channel::Texture(&texture);
        let coarse = channel.sample_level(Vec2::new(0.3, 0.3), 1.0);
        assert!((coarse.x - 0.5).abs() < 0.01, "got {}", coarse.x);
    }
}
