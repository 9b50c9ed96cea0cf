use crate::DrapeResult;

pub type PremulRgba8 = [u8; 4];

/// Source-over with an extra layer opacity, premultiplied in and out.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = opacity_u16(opacity);
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = add_sat_u8(sa, mul_div255(u16::from(dst[3]), inv));

    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = add_sat_u8(sc, dc);
    }
    out
}

/// Separable multiply blend (`Cs·Cb + Cs·(1−αb) + Cb·(1−αs)`), premultiplied in and out.
pub fn multiply(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = opacity_u16(opacity);
    let s = [
        mul_div255(u16::from(src[0]), op),
        mul_div255(u16::from(src[1]), op),
        mul_div255(u16::from(src[2]), op),
        mul_div255(u16::from(src[3]), op),
    ];
    if s[3] == 0 {
        return dst;
    }

    let inv_sa = 255u16 - u16::from(s[3]);
    let inv_da = 255u16 - u16::from(dst[3]);

    let mut out = [0u8; 4];
    out[3] = add_sat_u8(s[3], mul_div255(u16::from(dst[3]), inv_sa));
    for i in 0..3 {
        let both = mul_div255(u16::from(s[i]), u16::from(dst[i]));
        let src_only = mul_div255(u16::from(s[i]), inv_da);
        let dst_only = mul_div255(u16::from(dst[i]), inv_sa);
        out[i] = add_sat_u8(add_sat_u8(both, src_only), dst_only);
    }
    out
}

pub fn over_in_place(dst: &mut [u8], src: &[u8], opacity: f32) -> DrapeResult<()> {
    blend_in_place(dst, src, opacity, over, "over_in_place")
}

pub fn multiply_in_place(dst: &mut [u8], src: &[u8], opacity: f32) -> DrapeResult<()> {
    blend_in_place(dst, src, opacity, multiply, "multiply_in_place")
}

fn blend_in_place(
    dst: &mut [u8],
    src: &[u8],
    opacity: f32,
    op: fn(PremulRgba8, PremulRgba8, f32) -> PremulRgba8,
    name: &str,
) -> DrapeResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(crate::DrapeError::evaluation(format!(
            "{name} expects equal-length rgba8 buffers"
        )));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = op([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], opacity);
        d.copy_from_slice(&out);
    }
    Ok(())
}

pub fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        for c in &mut px[..3] {
            *c = mul_div255(u16::from(*c), a);
        }
    }
}

pub fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u32::from(px[3]);
        if a == 0 || a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((u32::from(*c) * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

fn opacity_u16(opacity: f32) -> u16 {
    ((opacity * 255.0).round() as i32).clamp(0, 255) as u16
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_opacity_0_is_noop() {
        let dst = [1, 2, 3, 4];
        let src = [200, 200, 200, 200];
        assert_eq!(over(dst, src, 0.0), dst);
    }

    #[test]
    fn over_src_opaque_replaces_dst() {
        let dst = [0, 0, 0, 255];
        let src = [255, 0, 0, 255];
        assert_eq!(over(dst, src, 1.0), src);
    }

    #[test]
    fn over_partial_opacity_keeps_some_dst() {
        let dst = [0, 0, 255, 255];
        let src = [255, 0, 0, 255];
        let out = over(dst, src, 0.9);
        assert_eq!(out[3], 255);
        assert!(out[0] > 200);
        assert!(out[2] > 0 && out[2] < 40);
    }

    #[test]
    fn multiply_with_white_is_identity_on_opaque() {
        let dst = [120, 60, 30, 255];
        let white = [255, 255, 255, 255];
        assert_eq!(multiply(dst, white, 1.0), dst);
    }

    #[test]
    fn multiply_with_black_darkens_by_opacity() {
        let dst = [200, 200, 200, 255];
        let black = [0, 0, 0, 255];
        assert_eq!(multiply(dst, black, 1.0), [0, 0, 0, 255]);
        let partial = multiply(dst, black, 0.3);
        assert!(partial[0] > 130 && partial[0] < 145, "{partial:?}");
        assert_eq!(partial[3], 255);
    }

    #[test]
    fn premultiply_roundtrip_is_close() {
        let mut px = vec![200u8, 100, 50, 128, 10, 20, 30, 0, 1, 2, 3, 255];
        let orig = px.clone();
        premultiply_rgba8_in_place(&mut px);
        assert_eq!(&px[4..8], &[0, 0, 0, 0]);
        unpremultiply_rgba8_in_place(&mut px);
        for i in [0usize, 1, 2] {
            assert!((i32::from(px[i]) - i32::from(orig[i])).abs() <= 2);
        }
        assert_eq!(&px[8..], &orig[8..]);
    }

    #[test]
    fn in_place_rejects_mismatched_buffers() {
        let mut dst = vec![0u8; 8];
        assert!(over_in_place(&mut dst, &[0u8; 4], 1.0).is_err());
        assert!(multiply_in_place(&mut dst, &[0u8; 8], 1.0).is_ok());
    }
}
