use std::io::Cursor;

use crate::{DrapeError, DrapeResult};

const MAX_SVG_DIM: u32 = 16_384;

/// Decode any raster format `image` understands into straight-alpha RGBA8.
pub fn decode_raster(bytes: &[u8]) -> DrapeResult<image::RgbaImage> {
    let dyn_img = image::load_from_memory(bytes)
        .map_err(|e| DrapeError::decode(format!("decode image from memory: {e}")))?;
    let rgba = dyn_img.to_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(DrapeError::decode("image has zero width or height"));
    }
    Ok(rgba)
}

/// Decode a design file. SVG documents are rasterized at their intrinsic size first.
pub fn decode_design(bytes: &[u8]) -> DrapeResult<image::RgbaImage> {
    if looks_like_svg(bytes) {
        let tree = parse_svg(bytes)?;
        return rasterize_svg(&tree);
    }
    decode_raster(bytes)
}

pub fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(512)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg"))
}

pub fn parse_svg(bytes: &[u8]) -> DrapeResult<usvg::Tree> {
    let opts = usvg::Options::default();
    usvg::Tree::from_data(bytes, &opts)
        .map_err(|e| DrapeError::decode(format!("parse svg tree: {e}")))
}

/// Rasterize an SVG tree at its intrinsic size into straight-alpha RGBA8.
pub fn rasterize_svg(tree: &usvg::Tree) -> DrapeResult<image::RgbaImage> {
    fn to_px(v: f32) -> DrapeResult<u32> {
        if !v.is_finite() || v <= 0.0 {
            return Err(DrapeError::decode("svg has invalid width/height"));
        }
        Ok((v.ceil() as u32).max(1))
    }

    let size = tree.size();
    let width = to_px(size.width())?;
    let height = to_px(size.height())?;
    if width > MAX_SVG_DIM || height > MAX_SVG_DIM {
        return Err(DrapeError::decode(format!(
            "svg raster size too large: {width}x{height} (max {MAX_SVG_DIM}x{MAX_SVG_DIM})"
        )));
    }

    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| DrapeError::evaluation("failed to allocate svg pixmap"))?;
    let sx = (width as f32) / size.width();
    let sy = (height as f32) / size.height();
    resvg::render(
        tree,
        resvg::tiny_skia::Transform::from_scale(sx, sy),
        &mut pixmap.as_mut(),
    );

    let mut data = pixmap.take();
    crate::composite_cpu::unpremultiply_rgba8_in_place(&mut data);
    image::RgbaImage::from_raw(width, height, data)
        .ok_or_else(|| DrapeError::evaluation("svg pixmap size mismatch"))
}

pub fn encode_png_rgba8(data: &[u8], width: u32, height: u32) -> DrapeResult<Vec<u8>> {
    let img = image::RgbaImage::from_raw(width, height, data.to_vec())
        .ok_or_else(|| DrapeError::evaluation("png encode expects width*height*4 bytes"))?;
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| DrapeError::evaluation(format!("encode png: {e}")))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(img: image::RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn decode_raster_png_keeps_straight_alpha() {
        let img = image::RgbaImage::from_raw(1, 1, vec![100, 50, 200, 128]).unwrap();
        let decoded = decode_raster(&png_bytes(img)).unwrap();
        assert_eq!(decoded.dimensions(), (1, 1));
        assert_eq!(decoded.as_raw().as_slice(), &[100, 50, 200, 128]);
    }

    #[test]
    fn decode_raster_rejects_garbage() {
        let err = decode_raster(b"definitely not an image").unwrap_err();
        assert!(matches!(err, DrapeError::Decode(_)));
    }

    #[test]
    fn svg_is_sniffed_and_rasterized() {
        let svg = br##"<?xml version="1.0"?>
<svg xmlns="http://www.w3.org/2000/svg" width="8" height="4">
  <rect x="0" y="0" width="8" height="4" fill="#ff0000"/>
</svg>"##;
        assert!(looks_like_svg(svg));
        let img = decode_design(svg).unwrap();
        assert_eq!(img.dimensions(), (8, 4));
        let px = img.get_pixel(4, 2).0;
        assert_eq!(px, [255, 0, 0, 255]);
    }

    #[test]
    fn broken_svg_is_a_decode_error() {
        let err = decode_design(b"<svg").unwrap_err();
        assert!(matches!(err, DrapeError::Decode(_)));
    }

    #[test]
    fn png_encode_decode_is_lossless() {
        let data: Vec<u8> = (0..(5 * 3 * 4)).map(|i| (i * 7 % 256) as u8).collect();
        let png = encode_png_rgba8(&data, 5, 3).unwrap();
        let back = decode_raster(&png).unwrap();
        assert_eq!(back.dimensions(), (5, 3));
        assert_eq!(back.as_raw(), &data);
    }
}
