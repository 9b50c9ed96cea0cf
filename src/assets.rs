pub mod decode;

use std::sync::Arc;

use crate::{DrapeResult, render::FrameRGBA};

/// An uploaded base photo: the encoded bytes (forwarded to depth providers) plus the decoded
/// straight-alpha raster.
#[derive(Clone, Debug)]
pub struct SourceImage {
    pub bytes: Arc<[u8]>,
    pub image: Arc<image::RgbaImage>,
}

impl SourceImage {
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> DrapeResult<Self> {
        let bytes = bytes.into();
        let image = decode::decode_raster(&bytes)?;
        Ok(Self {
            bytes,
            image: Arc::new(image),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A decoded design ready to hand to a compositor.
#[derive(Clone, Debug)]
pub struct DesignImage {
    pub name: String,
    pub image: Arc<image::RgbaImage>,
}

impl DesignImage {
    pub fn decode(name: impl Into<String>, bytes: &[u8]) -> DrapeResult<Self> {
        Ok(Self {
            name: name.into(),
            image: Arc::new(decode::decode_design(bytes)?),
        })
    }
}

/// PNG-encode a straight-alpha frame.
pub fn encode_png(frame: &FrameRGBA) -> DrapeResult<Vec<u8>> {
    decode::encode_png_rgba8(&frame.to_straight_rgba8(), frame.width, frame.height)
}
