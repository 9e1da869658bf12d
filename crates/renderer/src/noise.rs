//! Random RGBA noise used as static sampler inputs by the main pass.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use rand::Rng;

/// Side length of the large noise texture bound to `iChannel0`.
pub const NOISE_SIDE: u32 = 256;
/// Side length of the dust texture bound to `iChannel1`.
pub const DUST_SIDE: u32 = 128;

/// Square noise texture with its full mip chain, level 0 first.
#[derive(Clone, Debug, PartialEq)]
pub struct NoiseTexture {
    levels: Vec<RgbaImage>,
}

impl NoiseTexture {
    /// Fills `side x side` texels with independent random bytes per colour
    /// channel and an opaque alpha, then builds the mip chain down to 1x1.
    pub fn generate<R: Rng + ?Sized>(side: u32, rng: &mut R) -> Self {
        let side = side.max(1);
        let base = RgbaImage::from_fn(side, side, |_, _| {
            Rgba([rng.gen::<u8>(), rng.gen::<u8>(), rng.gen::<u8>(), 255])
        });
        Self::from_base(base)
    }

    pub fn from_base(base: RgbaImage) -> Self {
        let mut levels = vec![base];
        loop {
            let Some(previous) = levels.last() else { break };
            let (width, height) = previous.dimensions();
            if width <= 1 && height <= 1 {
                break;
            }
            let next = imageops::resize(
                previous,
                (width / 2).max(1),
                (height / 2).max(1),
                FilterType::Triangle,
            );
            levels.push(next);
        }
        Self { levels }
    }

    pub fn base(&self) -> &RgbaImage {
        &self.levels[0]
    }

    pub fn side(&self) -> u32 {
        self.base().width()
    }

    pub fn levels(&self) -> &[RgbaImage] {
        &self.levels
    }

    pub fn mip_count(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Tightly packed bytes of every level, largest first.
    pub fn packed_levels(&self) -> Vec<u8> {
        let total = self.levels.iter().map(|level| level.as_raw().len()).sum();
        let mut bytes = Vec::with_capacity(total);
        for level in &self.levels {
            bytes.extend_from_slice(level.as_raw());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn same_seed_same_texels() {
        let a = NoiseTexture::generate(32, &mut StdRng::seed_from_u64(7));
        let b = NoiseTexture::generate(32, &mut StdRng::seed_from_u64(7));
        let c = NoiseTexture::generate(32, &mut StdRng::seed_from_u64(8));
        assert_eq!(a, b);
        assert_ne!(a.base(), c.base());
    }

    #[test]
    fn alpha_is_opaque_and_channels_vary() {
        let texture = NoiseTexture::generate(64, &mut StdRng::seed_from_u64(1));
        assert!(texture.base().pixels().all(|pixel| pixel[3] == 255));
        let distinct_red = texture
            .base()
            .pixels()
            .map(|pixel| pixel[0])
            .collect::<std::collections::BTreeSet<_>>();
        assert!(distinct_red.len() > 100);
        assert!(texture.base().pixels().any(|pixel| pixel[0] != pixel[1]));
    }

    #[test]
    fn mip_chain_reaches_one_texel() {
        let texture = NoiseTexture::generate(NOISE_SIDE, &mut StdRng::seed_from_u64(3));
        assert_eq!(texture.mip_count(), 9);
        let sides: Vec<u32> = texture.levels().iter().map(|level| level.width()).collect();
        assert_eq!(sides, vec![256, 128, 64, 32, 16, 8, 4, 2, 1]);
        let expected_bytes: usize = sides.iter().map(|side| (side * side * 4) as usize).sum();
        assert_eq!(texture.packed_levels().len(), expected_bytes);
    }
}
