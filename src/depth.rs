pub mod fallback;
pub mod process;
pub mod provider;

/// A depth bitmap as delivered by a provider, before normalization.
#[derive(Clone, Debug)]
pub struct RawDepth {
    pub image: image::DynamicImage,
    /// Label of the provider that produced it (`"fallback"` for the local generator).
    pub method: String,
}

/// Canonical N×N depth: normalized luminance replicated into R, G and B, alpha 255.
#[derive(Clone, Debug)]
pub struct DepthMap {
    pub image: image::RgbaImage,
    pub method: String,
}

impl DepthMap {
    pub fn resolution(&self) -> u32 {
        self.image.width()
    }

    /// Normalized depth value at texel `(x, y)`.
    pub fn value_at(&self, x: u32, y: u32) -> u8 {
        self.image.get_pixel(x, y).0[0]
    }
}
