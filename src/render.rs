pub mod engine;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod software;

use std::sync::Arc;

use crate::{
    config::{GpuConfig, ShadingParams},
    depth::DepthMap,
    foundation::core::{Placement, SurfaceSize},
    foundation::error::{DrapeError, DrapeResult},
    lighting::LightingMasks,
};

/// A rendered frame as RGBA8 pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether `data` is premultiplied alpha.
    pub premultiplied: bool,
}

impl FrameRGBA {
    /// The 1×1 transparent stand-in used for failed batch items.
    pub fn placeholder() -> Self {
        Self {
            width: 1,
            height: 1,
            data: vec![0; 4],
            premultiplied: false,
        }
    }

    pub fn to_straight_rgba8(&self) -> Vec<u8> {
        let mut data = self.data.clone();
        if self.premultiplied {
            crate::composite_cpu::unpremultiply_rgba8_in_place(&mut data);
        }
        data
    }

    pub fn into_image(self) -> DrapeResult<image::RgbaImage> {
        let data = self.to_straight_rgba8();
        image::RgbaImage::from_raw(self.width, self.height, data)
            .ok_or_else(|| DrapeError::evaluation("frame buffer does not match its dimensions"))
    }
}

/// The four persistent inputs of a render session, all aligned to the base photo.
#[derive(Clone, Debug)]
pub struct SceneLayers {
    pub base: Arc<image::RgbaImage>,
    pub depth: Arc<DepthMap>,
    pub masks: Arc<LightingMasks>,
}

impl SceneLayers {
    pub fn new(
        base: Arc<image::RgbaImage>,
        depth: Arc<DepthMap>,
        masks: Arc<LightingMasks>,
    ) -> DrapeResult<Self> {
        if base.width() == 0 || base.height() == 0 {
            return Err(DrapeError::validation("base image is empty"));
        }
        if depth.image.width() == 0 || depth.image.height() == 0 {
            return Err(DrapeError::validation("depth map is empty"));
        }
        if masks.shadow.dimensions() != base.dimensions()
            || masks.highlight.dimensions() != base.dimensions()
        {
            return Err(DrapeError::validation(
                "lighting masks must match the base image dimensions",
            ));
        }
        Ok(Self { base, depth, masks })
    }
}

/// Everything a single render needs besides the layers and the design texture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameParams {
    pub shading: ShadingParams,
    pub placement: Placement,
    /// `false` draws the base photo alone (no design, no lighting).
    pub filters: bool,
}

impl FrameParams {
    pub fn new(shading: ShadingParams, placement: Placement) -> Self {
        Self {
            shading,
            placement,
            filters: true,
        }
    }

    pub fn unfiltered(self) -> Self {
        Self {
            filters: false,
            ..self
        }
    }
}

/// Which compositor to bring up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// GPU when available, software otherwise (and on GPU failure).
    #[default]
    Auto,
    Gpu,
    Software,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositorKind {
    Gpu,
    Software,
}

/// Shared contract of the GPU and software compositors.
pub trait Compositor {
    fn kind(&self) -> CompositorKind;

    /// Replace the active design. Latest write wins.
    fn set_design(&mut self, design: &image::RgbaImage) -> DrapeResult<()>;

    fn clear_design(&mut self);

    fn render(&mut self, params: &FrameParams) -> DrapeResult<FrameRGBA>;

    /// Release backend resources. Calling it twice is harmless.
    fn destroy(&mut self);
}

/// Create a compositor for `kind`. `Auto` is resolved by the engine, which owns the fallback.
pub fn create_compositor(
    kind: CompositorKind,
    layers: &SceneLayers,
    surface: SurfaceSize,
    _gpu: &GpuConfig,
) -> DrapeResult<Box<dyn Compositor>> {
    match kind {
        CompositorKind::Software => Ok(Box::new(software::SoftwareCompositor::new(
            layers, surface,
        )?)),
        #[cfg(feature = "gpu")]
        CompositorKind::Gpu => Ok(Box::new(gpu::GpuCompositor::new(layers, surface, _gpu)?)),
        #[allow(unreachable_patterns)]
        _ => Err(DrapeError::renderer_init(
            "gpu compositor is not available (built without the `gpu` feature)",
        )),
    }
}
