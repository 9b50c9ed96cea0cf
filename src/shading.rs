//! The per-pixel compositing model.
//!
//! `render/gpu.rs` runs the same math in WGSL. This module is the CPU reference: it keeps the
//! model testable without an adapter and backs the GPU parity tests. Sampling is nearest-texel
//! with edge clamping on both sides.

use crate::{
    config::ShadingParams,
    foundation::core::{Placement, Rect, SurfaceSize, fit_rect},
    render::{FrameParams, FrameRGBA, SceneLayers},
};

/// Scale from the depth-centred value to a UV offset, on top of `strength`.
pub const WARP_SCALE: f32 = 0.2;
/// How strongly the shadow mask darkens at `shadow_power == 1`.
pub const SHADOW_SCALE: f32 = 0.6;
/// How strongly the highlight mask brightens at `highlight_power == 1`.
pub const HIGHLIGHT_SCALE: f32 = 0.4;

/// UV offset applied before sampling the design.
pub fn warp_offset(depth: f32, strength: f32) -> f32 {
    (depth - 0.5) * strength * WARP_SCALE
}

/// Multiply-style design blend, capped so the base always shows through.
pub fn blend_design(base: [f32; 3], design: [f32; 4], params: &ShadingParams) -> [f32; 3] {
    if design[3] <= params.alpha_threshold {
        return base;
    }
    let t = design[3] * params.blend_cap;
    let mut out = [0f32; 3];
    for i in 0..3 {
        out[i] = mix(base[i], base[i] * design[i], t);
    }
    out
}

/// Reapply the photo's own shading on top of the blended color, then clamp.
pub fn apply_lighting(
    rgb: [f32; 3],
    shadow: f32,
    highlight: f32,
    params: &ShadingParams,
) -> [f32; 3] {
    let darken = 1.0 - shadow * params.shadow_power * SHADOW_SCALE;
    let lift = highlight * params.highlight_power * HIGHLIGHT_SCALE;
    rgb.map(|c| (c * darken + lift).clamp(0.0, 1.0))
}

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

/// Nearest texel at normalized `(u, v)`, clamped to the image edge.
pub fn sample_nearest(img: &image::RgbaImage, u: f32, v: f32) -> [f32; 4] {
    let (w, h) = img.dimensions();
    let tx = ((u * w as f32).floor() as i64).clamp(0, i64::from(w) - 1) as u32;
    let ty = ((v * h as f32).floor() as i64).clamp(0, i64::from(h) - 1) as u32;
    img.get_pixel(tx, ty).0.map(|c| f32::from(c) / 255.0)
}

/// Design texel under surface pixel position `(px, py)`, transparent outside the placement.
fn sample_design(design: &image::RgbaImage, px: f32, py: f32, placement: &Placement) -> [f32; 4] {
    let lu = (px - placement.x as f32) / placement.width as f32;
    let lv = (py - placement.y as f32) / placement.height as f32;
    if !(0.0..1.0).contains(&lu) || !(0.0..1.0).contains(&lv) {
        return [0.0; 4];
    }
    sample_nearest(design, lu, lv)
}

fn base_uv(rect: &Rect, px: f32, py: f32) -> Option<(f32, f32)> {
    let u = (px - rect.x0 as f32) / rect.width() as f32;
    let v = (py - rect.y0 as f32) / rect.height() as f32;
    if (0.0..1.0).contains(&u) && (0.0..1.0).contains(&v) {
        Some((u, v))
    } else {
        None
    }
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Render one frame on the CPU with exactly the shader's model. Output is straight alpha.
pub fn shade_frame(
    layers: &SceneLayers,
    design: Option<&image::RgbaImage>,
    params: &FrameParams,
    surface: SurfaceSize,
) -> FrameRGBA {
    let rect = fit_rect(layers.base.width(), layers.base.height(), surface);
    let sw = surface.width as f32;
    let sh = surface.height as f32;
    let p = &params.placement;
    let design = design.filter(|_| p.width > 0.0 && p.height > 0.0);
    let s = &params.shading;

    let mut data = vec![0u8; (surface.width as usize) * (surface.height as usize) * 4];
    for (i, out) in data.chunks_exact_mut(4).enumerate() {
        let x = (i as u32) % surface.width;
        let y = (i as u32) / surface.width;
        let px = x as f32 + 0.5;
        let py = y as f32 + 0.5;

        let Some((u, v)) = base_uv(&rect, px, py) else {
            continue;
        };
        let base = sample_nearest(&layers.base, u, v);
        if !params.filters {
            out.copy_from_slice(&base.map(to_u8));
            continue;
        }

        let depth = sample_nearest(&layers.depth.image, u, v)[0];
        let shadow = sample_nearest(&layers.masks.shadow, u, v)[0];
        let highlight = sample_nearest(&layers.masks.highlight, u, v)[0];

        let mut rgb = [base[0], base[1], base[2]];
        if let Some(design) = design {
            let offset = warp_offset(depth, s.strength);
            let du = (px / sw + offset).clamp(0.0, 1.0);
            let dv = (py / sh + offset).clamp(0.0, 1.0);
            let texel = sample_design(design, du * sw, dv * sh, p);
            rgb = blend_design(rgb, texel, s);
        }
        let rgb = apply_lighting(rgb, shadow, highlight, s);

        out.copy_from_slice(&[to_u8(rgb[0]), to_u8(rgb[1]), to_u8(rgb[2]), to_u8(base[3])]);
    }

    FrameRGBA {
        width: surface.width,
        height: surface.height,
        data,
        premultiplied: false,
    }
}
