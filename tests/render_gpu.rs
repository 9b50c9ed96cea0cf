#[cfg(feature = "gpu")]
mod gpu {
    use std::sync::Arc;

    use drape::{
        BackendKind, CompositeEngine, CompositorKind, FrameParams, Placement, SceneLayers,
        ShadingParams, SurfaceSize,
        config::GpuConfig,
        depth::DepthMap,
        lighting::extract_lighting_masks,
        render::{Compositor, create_compositor},
        shading::shade_frame,
    };

    fn layers(w: u32, h: u32) -> SceneLayers {
        let base = image::RgbaImage::from_fn(w, h, |x, y| {
            image::Rgba([(x * 255 / w) as u8, (y * 255 / h) as u8, 140, 255])
        });
        let depth = image::RgbaImage::from_fn(32, 32, |x, y| {
            let v = ((x + y) * 4) as u8;
            image::Rgba([v, v, v, 255])
        });
        let masks = extract_lighting_masks(&base);
        SceneLayers::new(
            Arc::new(base),
            Arc::new(DepthMap {
                image: depth,
                method: "test".to_string(),
            }),
            Arc::new(masks),
        )
        .unwrap()
    }

    fn gpu_or_skip(layers: &SceneLayers, surface: SurfaceSize) -> Option<Box<dyn Compositor>> {
        match create_compositor(CompositorKind::Gpu, layers, surface, &GpuConfig::default()) {
            Ok(c) => Some(c),
            Err(e) if e.is_renderer_init() => None,
            Err(e) => panic!("unexpected gpu init error: {e}"),
        }
    }

    #[test]
    fn gpu_matches_cpu_reference() {
        let layers = layers(96, 64);
        let surface = SurfaceSize::new(96, 64).unwrap();
        let Some(mut gpu) = gpu_or_skip(&layers, surface) else {
            return;
        };

        let design = image::RgbaImage::from_fn(16, 16, |x, y| {
            image::Rgba([(x * 16) as u8, 40, (y * 16) as u8, if x < 2 { 0 } else { 230 }])
        });
        gpu.set_design(&design).unwrap();
        let params = FrameParams::new(
            ShadingParams {
                strength: 0.5,
                ..ShadingParams::default()
            },
            Placement::new(10.0, 8.0, 60.0, 40.0),
        );

        let got = gpu.render(&params).unwrap();
        let want = shade_frame(&layers, Some(&design), &params, surface);
        assert_eq!(got.data.len(), want.data.len());

        // Nearest sampling can land on the neighbouring texel right at a texel edge.
        let off = got
            .data
            .chunks_exact(4)
            .zip(want.data.chunks_exact(4))
            .filter(|(a, b)| a.iter().zip(b.iter()).any(|(x, y)| x.abs_diff(*y) > 2))
            .count();
        let total = (surface.width * surface.height) as usize;
        assert!(off * 100 <= total, "{off} of {total} pixels differ");
    }

    #[test]
    fn gpu_unfiltered_is_the_base() {
        let layers = layers(32, 32);
        let surface = SurfaceSize::new(32, 32).unwrap();
        let Some(mut gpu) = gpu_or_skip(&layers, surface) else {
            return;
        };
        let params = FrameParams::new(ShadingParams::default(), Placement::new(0.0, 0.0, 8.0, 8.0))
            .unfiltered();
        let frame = gpu.render(&params).unwrap();
        assert_eq!(frame.data, layers.base.as_raw().clone());
    }

    #[test]
    fn gpu_engine_capture_and_destroy() {
        let mut engine = CompositeEngine::new(BackendKind::Gpu, None, GpuConfig::default());
        match engine.initialize(layers(20, 20)) {
            Ok(kind) => assert_eq!(kind, CompositorKind::Gpu),
            Err(e) if e.is_renderer_init() => return,
            Err(e) => panic!("unexpected gpu init error: {e}"),
        }
        let params = FrameParams::new(
            ShadingParams::default(),
            Placement::new(0.0, 0.0, 10.0, 10.0),
        );
        let png = engine.capture_frame(&params).unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (20, 20));

        engine.destroy();
        engine.destroy();
        assert!(engine.render(&params).is_err());
    }

    fn gpu_engine_or_skip(layers: SceneLayers) -> Option<CompositeEngine> {
        let mut engine = CompositeEngine::new(BackendKind::Gpu, None, GpuConfig::default());
        match engine.initialize(layers) {
            Ok(kind) => {
                assert_eq!(kind, CompositorKind::Gpu);
                Some(engine)
            }
            Err(e) if e.is_renderer_init() => None,
            Err(e) => panic!("unexpected gpu init error: {e}"),
        }
    }

    #[test]
    fn gpu_capture_of_white_design_at_zero_strength_is_lighting_only() {
        let Some(mut engine) = gpu_engine_or_skip(layers(48, 36)) else {
            return;
        };
        let params = FrameParams::new(
            ShadingParams {
                strength: 0.0,
                ..ShadingParams::default()
            },
            Placement::new(6.0, 4.0, 30.0, 24.0),
        );

        let lighting_only = engine.capture_frame(&params).unwrap();
        let white = image::RgbaImage::from_pixel(5, 5, image::Rgba([255, 255, 255, 255]));
        engine.set_design(Arc::new(white)).unwrap();
        let with_design = engine.capture_frame(&params).unwrap();

        let a = image::load_from_memory(&lighting_only).unwrap().to_rgba8();
        let b = image::load_from_memory(&with_design).unwrap().to_rgba8();
        let max_diff = a
            .as_raw()
            .iter()
            .zip(b.as_raw())
            .map(|(x, y)| x.abs_diff(*y))
            .max()
            .unwrap();
        assert!(max_diff <= 2, "max channel difference {max_diff}");
    }

    #[test]
    fn gpu_rejects_design_over_texture_limit() {
        let Some(mut engine) = gpu_engine_or_skip(layers(16, 16)) else {
            return;
        };
        // The device is requested with the default limits.
        let limit = wgpu::Limits::default().max_texture_dimension_2d;
        let wide = image::RgbaImage::new(limit + 808, 4);
        assert!(matches!(
            engine.set_design(Arc::new(wide)),
            Err(drape::DrapeError::Validation(_))
        ));
        assert!(engine.design().is_none());

        let params = FrameParams::new(
            ShadingParams::default(),
            Placement::new(0.0, 0.0, 8.0, 8.0),
        );
        assert!(engine.render(&params).is_ok());
    }
}
