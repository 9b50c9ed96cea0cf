use image::imageops::{self, FilterType};

use crate::{
    DrapeError, DrapeResult,
    blur_cpu::blur_luma_f32,
    config::DepthConfig,
    depth::{DepthMap, RawDepth},
};

/// Ranges narrower than this are treated as uniform input (f32 resampling noise stays below it,
/// one 16-bit step stays above it).
const UNIFORM_EPSILON: f32 = 1e-6;

/// Resample, denoise and min-max normalize a raw depth bitmap into the canonical N×N map.
#[tracing::instrument(skip(raw), fields(method = %raw.method))]
pub fn process_depth_map(raw: &RawDepth, cfg: &DepthConfig) -> DrapeResult<DepthMap> {
    let (w, h) = (raw.image.width(), raw.image.height());
    if w == 0 || h == 0 {
        return Err(DrapeError::validation("raw depth map is empty"));
    }
    if cfg.resolution == 0 {
        return Err(DrapeError::validation("depth.resolution must be > 0"));
    }
    let n = cfg.resolution;

    // f32 keeps 16-bit provider output intact until the final quantization.
    let luma = raw.image.to_luma32f();
    let resized = if (w, h) == (n, n) {
        luma
    } else {
        imageops::resize(&luma, n, n, FilterType::Triangle)
    };

    let blurred = blur_luma_f32(resized.as_raw(), n, n, cfg.blur_radius, cfg.blur_sigma)?;

    let (min, max) = blurred
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    let uniform = !range.is_finite() || range < UNIFORM_EPSILON;
    tracing::debug!(min, max, uniform, "depth range");

    let mut out = image::RgbaImage::new(n, n);
    for (dst, &v) in out.pixels_mut().zip(blurred.iter()) {
        let norm = if uniform { v } else { (v - min) / range };
        let q = (norm.clamp(0.0, 1.0) * 255.0).round() as u8;
        *dst = image::Rgba([q, q, q, 255]);
    }

    Ok(DepthMap {
        image: out,
        method: raw.method.clone(),
    })
}
