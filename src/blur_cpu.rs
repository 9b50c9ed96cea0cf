use crate::{DrapeError, DrapeResult};

/// Separable gaussian blur over a single-channel `f32` plane, clamping at the edges.
pub fn blur_luma_f32(
    src: &[f32],
    width: u32,
    height: u32,
    radius: u32,
    sigma: f32,
) -> DrapeResult<Vec<f32>> {
    let expected_len = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| DrapeError::evaluation("blur buffer size overflow"))?;
    if src.len() != expected_len {
        return Err(DrapeError::evaluation(
            "blur_luma_f32 expects src matching width*height",
        ));
    }
    if radius == 0 || expected_len == 0 {
        return Ok(src.to_vec());
    }

    let kernel = gaussian_kernel(radius, sigma)?;
    let mut tmp = vec![0f32; expected_len];
    let mut out = vec![0f32; expected_len];

    horizontal_pass(src, &mut tmp, width, height, &kernel);
    vertical_pass(&tmp, &mut out, width, height, &kernel);
    Ok(out)
}

fn gaussian_kernel(radius: u32, sigma: f32) -> DrapeResult<Vec<f32>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(DrapeError::validation("blur sigma must be > 0"));
    }

    let r = radius as i32;
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;
    let weights: Vec<f64> = (-r..=r)
        .map(|i| {
            let x = f64::from(i);
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    if sum <= 0.0 {
        return Err(DrapeError::evaluation("gaussian kernel sum is zero"));
    }

    Ok(weights.into_iter().map(|w| (w / sum) as f32).collect())
}

fn horizontal_pass(src: &[f32], dst: &mut [f32], width: u32, height: u32, k: &[f32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    for y in 0..height as i32 {
        let row = (y * w) as usize;
        for x in 0..w {
            let mut acc = 0f64;
            for (ki, &kw) in k.iter().enumerate() {
                let sx = (x + ki as i32 - radius).clamp(0, w - 1);
                acc += f64::from(kw) * f64::from(src[row + sx as usize]);
            }
            dst[row + x as usize] = acc as f32;
        }
    }
}

fn vertical_pass(src: &[f32], dst: &mut [f32], width: u32, height: u32, k: &[f32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    let h = height as i32;
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f64;
            for (ki, &kw) in k.iter().enumerate() {
                let sy = (y + ki as i32 - radius).clamp(0, h - 1);
                acc += f64::from(kw) * f64::from(src[(sy * w + x) as usize]);
            }
            dst[(y * w + x) as usize] = acc as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_radius_0_is_identity() {
        let src = vec![0.1f32, 0.2, 0.3, 0.4];
        let out = blur_luma_f32(&src, 2, 2, 0, 1.0).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn blur_constant_plane_stays_constant() {
        let (w, h) = (6u32, 5u32);
        let src = vec![0.42f32; (w * h) as usize];
        let out = blur_luma_f32(&src, w, h, 3, 1.5).unwrap();
        for v in out {
            assert!((v - 0.42).abs() < 1e-6, "{v}");
        }
    }

    #[test]
    fn blur_spreads_energy_from_single_pixel() {
        let (w, h) = (7u32, 7u32);
        let mut src = vec![0f32; (w * h) as usize];
        src[(3 * w + 3) as usize] = 1.0;

        let out = blur_luma_f32(&src, w, h, 3, 1.5).unwrap();

        assert!(out.iter().filter(|&&v| v > 0.0).count() > 1);
        let sum: f32 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4, "{sum}");
        assert!(out[(3 * w + 3) as usize] < 1.0);
    }

    #[test]
    fn blur_rejects_mismatched_len_and_bad_sigma() {
        assert!(blur_luma_f32(&[0.0; 3], 2, 2, 1, 1.0).is_err());
        assert!(blur_luma_f32(&[0.0; 4], 2, 2, 1, 0.0).is_err());
    }
}
