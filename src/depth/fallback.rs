//! Local schematic depth used when every remote provider fails.
//!
//! The shape is a rough garment: a tall elliptical torso bulge in the middle with two smaller
//! shoulder bulges above it. It only depends on the output dimensions, so it is deterministic.

pub const FALLBACK_METHOD: &str = "fallback";

/// Edge length used when the source dimensions are unknown or empty.
pub const DEFAULT_FALLBACK_DIM: u32 = 1024;

const TORSO_CENTER: (f32, f32) = (0.5, 0.55);
const TORSO_RADII: (f32, f32) = (0.3, 0.4);
const SHOULDER_CENTERS: [(f32, f32); 2] = [(0.28, 0.22), (0.72, 0.22)];
const SHOULDER_RADIUS: f32 = 0.18;
const SHOULDER_PEAK: f32 = 200.0;

pub fn synthesize_garment_depth(width: u32, height: u32) -> image::GrayImage {
    let (width, height) = if width == 0 || height == 0 {
        (DEFAULT_FALLBACK_DIM, DEFAULT_FALLBACK_DIM)
    } else {
        (width, height)
    };

    image::GrayImage::from_fn(width, height, |x, y| {
        let nx = (x as f32 + 0.5) / width as f32;
        let ny = (y as f32 + 0.5) / height as f32;

        let tx = (nx - TORSO_CENTER.0) / TORSO_RADII.0;
        let ty = (ny - TORSO_CENTER.1) / TORSO_RADII.1;
        let torso = (1.0 - (tx * tx + ty * ty).sqrt()).clamp(0.0, 1.0) * 255.0;

        let shoulders = SHOULDER_CENTERS
            .iter()
            .map(|&(cx, cy)| {
                let d = ((nx - cx).powi(2) + (ny - cy).powi(2)).sqrt();
                (1.0 - d / SHOULDER_RADIUS).clamp(0.0, 1.0) * SHOULDER_PEAK
            })
            .fold(0.0f32, f32::max);

        image::Luma([torso.max(shoulders).round() as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_deterministic_and_sized() {
        let a = synthesize_garment_depth(64, 48);
        let b = synthesize_garment_depth(64, 48);
        assert_eq!(a.dimensions(), (64, 48));
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn fallback_torso_is_brightest_and_corners_are_dark() {
        let img = synthesize_garment_depth(100, 100);
        let center = img.get_pixel(50, 55).0[0];
        assert!(center > 240, "{center}");
        assert_eq!(img.get_pixel(0, 99).0[0], 0);
        assert_eq!(img.get_pixel(99, 99).0[0], 0);
        let shoulder = img.get_pixel(28, 22).0[0];
        assert!(shoulder >= 150, "{shoulder}");
    }

    #[test]
    fn fallback_handles_empty_dimensions() {
        let img = synthesize_garment_depth(0, 10);
        assert_eq!(img.dimensions(), (DEFAULT_FALLBACK_DIM, DEFAULT_FALLBACK_DIM));
    }
}
