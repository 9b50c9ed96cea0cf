use std::sync::Arc;

use drape::{
    FrameParams, Placement, SceneLayers, ShadingParams, SurfaceSize,
    assets::{decode::decode_raster, encode_png},
    depth::{DepthMap, RawDepth, process::process_depth_map},
    lighting::extract_lighting_masks,
    shading::shade_frame,
};

fn scene(w: u32, h: u32) -> SceneLayers {
    let base = image::RgbaImage::from_fn(w, h, |x, y| {
        let v = ((x + y) * 255 / (w + h)) as u8;
        image::Rgba([v, 255 - v, (x * 5) as u8, 255])
    });
    let raw = RawDepth {
        image: image::DynamicImage::ImageLuma8(image::GrayImage::from_fn(w, h, |x, _| {
            image::Luma([(x * 255 / w) as u8])
        })),
        method: "test".to_string(),
    };
    let cfg = drape::config::DepthConfig {
        resolution: 32,
        ..Default::default()
    };
    let depth: DepthMap = process_depth_map(&raw, &cfg).unwrap();
    let masks = extract_lighting_masks(&base);
    SceneLayers::new(Arc::new(base), Arc::new(depth), Arc::new(masks)).unwrap()
}

#[test]
fn white_design_at_zero_strength_is_lighting_only() {
    let layers = scene(40, 30);
    let surface = SurfaceSize::new(40, 30).unwrap();
    let shading = ShadingParams {
        strength: 0.0,
        ..ShadingParams::default()
    };
    let placement = Placement::new(5.0, 5.0, 30.0, 20.0);
    let white = image::RgbaImage::from_pixel(3, 3, image::Rgba([255, 255, 255, 255]));

    let with = shade_frame(&layers, Some(&white), &FrameParams::new(shading, placement), surface);
    let without = shade_frame(&layers, None, &FrameParams::new(shading, placement), surface);
    let max_diff = with
        .data
        .iter()
        .zip(&without.data)
        .map(|(a, b)| a.abs_diff(*b))
        .max()
        .unwrap();
    assert!(max_diff <= 1, "max channel difference {max_diff}");
}

#[test]
fn captured_frame_round_trips_through_png() {
    let layers = scene(24, 16);
    let surface = SurfaceSize::new(24, 16).unwrap();
    let design = image::RgbaImage::from_pixel(4, 4, image::Rgba([0, 128, 255, 200]));
    let params = FrameParams::new(ShadingParams::default(), Placement::new(2.0, 2.0, 12.0, 8.0));
    let frame = shade_frame(&layers, Some(&design), &params, surface);

    let png = encode_png(&frame).unwrap();
    let back = decode_raster(&png).unwrap();
    assert_eq!(back.dimensions(), (24, 16));
    assert_eq!(back.into_raw(), frame.data);
}

#[test]
fn warp_moves_the_design_with_depth() {
    let layers = scene(64, 64);
    let surface = SurfaceSize::new(64, 64).unwrap();
    let design = image::RgbaImage::from_fn(8, 8, |x, _| {
        if x < 4 {
            image::Rgba([0, 0, 0, 255])
        } else {
            image::Rgba([255, 0, 0, 255])
        }
    });
    let placement = Placement::new(0.0, 0.0, 64.0, 64.0);
    let flat = FrameParams::new(
        ShadingParams {
            strength: 0.0,
            ..ShadingParams::default()
        },
        placement,
    );
    let warped = FrameParams::new(
        ShadingParams {
            strength: 1.0,
            ..ShadingParams::default()
        },
        placement,
    );

    let a = shade_frame(&layers, Some(&design), &flat, surface);
    let b = shade_frame(&layers, Some(&design), &warped, surface);
    assert_ne!(a.data, b.data);
}
