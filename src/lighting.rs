/// Grayscale shadow/highlight masks aligned with the base photo.
#[derive(Clone, Debug)]
pub struct LightingMasks {
    pub shadow: image::RgbaImage,
    pub highlight: image::RgbaImage,
}

/// Weighted-RGB luminance in `[0, 1]`.
pub fn luminance(r: u8, g: u8, b: u8) -> f32 {
    (0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)) / 255.0
}

/// Split the photo's luminance around mid-gray: darker pixels feed the shadow mask, brighter ones
/// the highlight mask. A pixel is never positive in both. Alpha is copied from the source.
#[tracing::instrument(skip_all, fields(w = base.width(), h = base.height()))]
pub fn extract_lighting_masks(base: &image::RgbaImage) -> LightingMasks {
    let (w, h) = base.dimensions();
    let mut shadow = image::RgbaImage::new(w, h);
    let mut highlight = image::RgbaImage::new(w, h);

    for ((src, s), hl) in base
        .pixels()
        .zip(shadow.pixels_mut())
        .zip(highlight.pixels_mut())
    {
        let [r, g, b, a] = src.0;
        let l = luminance(r, g, b);
        let sv = to_u8((0.5 - l).clamp(0.0, 1.0));
        let hv = to_u8((l - 0.5).clamp(0.0, 1.0));
        *s = image::Rgba([sv, sv, sv, a]);
        *hl = image::Rgba([hv, hv, hv, a]);
    }

    LightingMasks { shadow, highlight }
}

fn to_u8(v: f32) -> u8 {
    (v * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_and_highlight_are_exclusive() {
        let base = image::RgbaImage::from_fn(64, 64, |x, y| {
            image::Rgba([(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8, 255])
        });
        let masks = extract_lighting_masks(&base);
        for (s, h) in masks.shadow.pixels().zip(masks.highlight.pixels()) {
            assert!(!(s.0[0] > 0 && h.0[0] > 0));
        }
    }

    #[test]
    fn extremes_map_to_half_scale() {
        let base = image::RgbaImage::from_raw(
            3,
            1,
            vec![0, 0, 0, 255, 255, 255, 255, 128, 128, 128, 128, 7],
        )
        .unwrap();
        let masks = extract_lighting_masks(&base);

        assert_eq!(masks.shadow.get_pixel(0, 0).0, [128, 128, 128, 255]);
        assert_eq!(masks.highlight.get_pixel(0, 0).0, [0, 0, 0, 255]);

        assert_eq!(masks.shadow.get_pixel(1, 0).0, [0, 0, 0, 128]);
        let white = masks.highlight.get_pixel(1, 0).0;
        assert!(white[0] >= 127 && white[0] == white[1] && white[1] == white[2]);
        assert_eq!(white[3], 128);

        // 128/255 is just above mid-gray.
        assert_eq!(masks.shadow.get_pixel(2, 0).0, [0, 0, 0, 7]);
        assert_eq!(masks.highlight.get_pixel(2, 0).0[3], 7);
    }

    #[test]
    fn luminance_is_monotonic_in_gray() {
        let mut prev = -1.0f32;
        for v in 0..=255u8 {
            let l = luminance(v, v, v);
            assert!(l >= prev);
            prev = l;
        }
        assert!((luminance(255, 255, 255) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn masks_match_base_dimensions() {
        let base = image::RgbaImage::new(13, 7);
        let masks = extract_lighting_masks(&base);
        assert_eq!(masks.shadow.dimensions(), (13, 7));
        assert_eq!(masks.highlight.dimensions(), (13, 7));
    }
}
