//! CPU fallback used when no GPU compositor can be brought up.
//!
//! There is no shader here, so the result is an approximation: the design is drawn flat at its
//! placement (normal pass at 0.9, then a multiply pass at 0.3). No depth warp and no lighting
//! masks are applied.

use std::sync::Arc;

use image::imageops::{self, FilterType};

use crate::{
    composite_cpu::{multiply_in_place, over_in_place, premultiply_rgba8_in_place},
    foundation::core::{Rect, SurfaceSize, fit_rect},
    foundation::error::{DrapeError, DrapeResult},
    render::{Compositor, CompositorKind, FrameParams, FrameRGBA, SceneLayers},
};

pub const DESIGN_OVER_OPACITY: f32 = 0.9;
pub const DESIGN_MULTIPLY_OPACITY: f32 = 0.3;

pub struct SoftwareCompositor {
    surface: SurfaceSize,
    /// Base drawn onto a transparent surface, premultiplied.
    backdrop: Option<Vec<u8>>,
    design: Option<Arc<image::RgbaImage>>,
}

impl SoftwareCompositor {
    pub fn new(layers: &SceneLayers, surface: SurfaceSize) -> DrapeResult<Self> {
        let rect = fit_rect(layers.base.width(), layers.base.height(), surface);
        let mut backdrop = vec![0u8; surface_len(surface)];
        draw_image_at(&mut backdrop, surface, &layers.base, rect)?;
        Ok(Self {
            surface,
            backdrop: Some(backdrop),
            design: None,
        })
    }
}

impl Compositor for SoftwareCompositor {
    fn kind(&self) -> CompositorKind {
        CompositorKind::Software
    }

    fn set_design(&mut self, design: &image::RgbaImage) -> DrapeResult<()> {
        self.design = Some(Arc::new(design.clone()));
        Ok(())
    }

    fn clear_design(&mut self) {
        self.design = None;
    }

    fn render(&mut self, params: &FrameParams) -> DrapeResult<FrameRGBA> {
        let backdrop = self
            .backdrop
            .as_ref()
            .ok_or_else(|| DrapeError::evaluation("software compositor was destroyed"))?;
        let mut data = backdrop.clone();

        if let (true, Some(design)) = (params.filters, self.design.as_ref()) {
            let p = params.placement;
            let rect = Rect::new(p.x, p.y, p.x + p.width, p.y + p.height);
            let mut layer = vec![0u8; data.len()];
            draw_image_at(&mut layer, self.surface, design, rect)?;
            over_in_place(&mut data, &layer, DESIGN_OVER_OPACITY)?;
            multiply_in_place(&mut data, &layer, DESIGN_MULTIPLY_OPACITY)?;
        }

        tracing::debug!(filters = params.filters, "software frame");
        Ok(FrameRGBA {
            width: self.surface.width,
            height: self.surface.height,
            data,
            premultiplied: true,
        })
    }

    fn destroy(&mut self) {
        self.backdrop = None;
        self.design = None;
    }
}

fn surface_len(surface: SurfaceSize) -> usize {
    (surface.width as usize) * (surface.height as usize) * 4
}

/// Resize `img` to `rect` (rounded to whole pixels) and copy it, premultiplied, into `dst`.
/// Parts falling outside the surface are cropped.
fn draw_image_at(
    dst: &mut [u8],
    surface: SurfaceSize,
    img: &image::RgbaImage,
    rect: Rect,
) -> DrapeResult<()> {
    if dst.len() != surface_len(surface) {
        return Err(DrapeError::evaluation("surface buffer has the wrong length"));
    }
    let x0 = rect.x0.round() as i64;
    let y0 = rect.y0.round() as i64;
    let w = rect.width().round().max(0.0) as u32;
    let h = rect.height().round().max(0.0) as u32;
    if w == 0 || h == 0 {
        return Ok(());
    }

    let scaled = if img.dimensions() == (w, h) {
        img.clone()
    } else {
        imageops::resize(img, w, h, FilterType::Triangle)
    };
    let mut src = scaled.into_raw();
    premultiply_rgba8_in_place(&mut src);

    let sw = i64::from(surface.width);
    let sh = i64::from(surface.height);
    for row in 0..i64::from(h) {
        let ty = y0 + row;
        if !(0..sh).contains(&ty) {
            continue;
        }
        let cx0 = x0.max(0);
        let cx1 = (x0 + i64::from(w)).min(sw);
        if cx0 >= cx1 {
            continue;
        }
        let src_start = ((row * i64::from(w) + (cx0 - x0)) * 4) as usize;
        let dst_start = ((ty * sw + cx0) * 4) as usize;
        let len = ((cx1 - cx0) * 4) as usize;
        dst[dst_start..dst_start + len].copy_from_slice(&src[src_start..src_start + len]);
    }
    Ok(())
}
