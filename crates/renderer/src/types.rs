use std::fmt;

/// Programs see at most four texture channels (`iChannel0-3`).
pub const CHANNEL_COUNT: usize = 4;

/// Maps a channel uniform name (`iChannel2`) to its binding slot.
pub fn channel_index(name: &str) -> Option<usize> {
    let digit = name.strip_prefix("iChannel")?;
    let index: usize = digit.parse().ok()?;
    (index < CHANNEL_COUNT).then_some(index)
}

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub fn new(raw: u32) -> Self {
                Self(raw)
            }

            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

resource_id!(
    /// Handle to an offscreen colour buffer owned by a render device.
    TargetId
);
resource_id!(
    /// Handle to a static sampled texture (noise) owned by a render device.
    TextureId
);
resource_id!(
    /// Handle to a compiled fragment program owned by a render device.
    ProgramId
);

/// Non-owning reference to anything a pass can sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureRef {
    Static(TextureId),
    Target(TargetId),
}

/// Where a draw lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Destination {
    Target(TargetId),
    Screen,
}

impl Destination {
    pub fn target(self) -> Option<TargetId> {
        match self {
            Destination::Target(id) => Some(id),
            Destination::Screen => None,
        }
    }
}

/// Shape of a uniform input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Float,
    Vec2,
    Vec3,
    Texture,
}

/// Current value of a uniform cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Texture(TextureRef),
}

impl UniformValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            UniformValue::Float(_) => ValueKind::Float,
            UniformValue::Vec2(_) => ValueKind::Vec2,
            UniformValue::Vec3(_) => ValueKind::Vec3,
            UniformValue::Texture(_) => ValueKind::Texture,
        }
    }

    pub fn as_texture(&self) -> Option<TextureRef> {
        match self {
            UniformValue::Texture(texture) => Some(*texture),
            _ => None,
        }
    }
}

/// The five passes of a frame, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassKind {
    Main,
    BloomExtract,
    BlurHorizontal,
    BlurVertical,
    Composite,
}

impl PassKind {
    pub const ALL: [PassKind; 5] = [
        PassKind::Main,
        PassKind::BloomExtract,
        PassKind::BlurHorizontal,
        PassKind::BlurVertical,
        PassKind::Composite,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PassKind::Main => "main",
            PassKind::BloomExtract => "bloom-extract",
            PassKind::BlurHorizontal => "blur-horizontal",
            PassKind::BlurVertical => "blur-vertical",
            PassKind::Composite => "composite",
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Dimensions shared by every pooled render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Drawable area reported by the host, before render scaling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// Drawable width in logical pixels.
    pub width: u32,
    /// Drawable height in logical pixels.
    pub height: u32,
    /// Device pixels per logical pixel.
    pub pixel_ratio: f32,
}

impl Viewport {
    pub fn new(width: u32, height: u32, pixel_ratio: f32) -> Self {
        Self {
            width,
            height,
            pixel_ratio,
        }
    }

    pub fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Offscreen target size for this viewport, or `None` when the drawable
    /// has no area. Non-empty drawables never produce less than 1x1.
    pub fn target_size(&self, render_scale: f32) -> Option<TargetSize> {
        if self.is_zero_area() {
            return None;
        }
        let factor = f64::from(self.pixel_ratio) * f64::from(render_scale);
        let scaled = |extent: u32| ((f64::from(extent) * factor).floor() as u32).max(1);
        Some(TargetSize::new(scaled(self.width), scaled(self.height)))
    }
}

/// Texel layout of pooled targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TargetFormat {
    #[default]
    Rgba8Unorm,
}

/// Min/mag filtering applied when a target is sampled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

/// Everything a device needs to allocate one offscreen target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub label: &'static str,
    pub size: TargetSize,
    pub format: TargetFormat,
    pub filter: FilterMode,
}

impl TargetDescriptor {
    pub fn new(label: &'static str, size: TargetSize) -> Self {
        Self {
            label,
            size,
            format: TargetFormat::default(),
            filter: FilterMode::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_map_to_slots() {
        assert_eq!(channel_index("iChannel0"), Some(0));
        assert_eq!(channel_index("iChannel3"), Some(3));
        assert_eq!(channel_index("iChannel4"), None);
        assert_eq!(channel_index("uBloom"), None);
    }

    #[test]
    fn target_size_floors_and_clamps() {
        let viewport = Viewport::new(801, 600, 1.5);
        assert_eq!(viewport.target_size(0.5), Some(TargetSize::new(600, 450)));
        assert_eq!(
            Viewport::new(1, 1, 0.5).target_size(0.5),
            Some(TargetSize::new(1, 1))
        );
        assert_eq!(Viewport::new(0, 600, 2.0).target_size(1.0), None);
        assert_eq!(Viewport::new(800, 0, 2.0).target_size(1.0), None);
    }
}
