use std::{sync::Arc, time::Duration};

use drape::{
    BackendKind, CompositorKind, DesignImage, DrapeConfig, DrapeError, MockupSession, Point,
    assets::decode::encode_png_rgba8,
    depth::provider::DepthProvider,
    scheduler::run_frame_loop,
    session::DepthOutcome,
};

fn config() -> DrapeConfig {
    let mut cfg = DrapeConfig {
        backend: BackendKind::Software,
        ..DrapeConfig::default()
    };
    cfg.depth.resolution = 48;
    cfg.interaction.min_width = 10.0;
    cfg.interaction.min_height = 10.0;
    cfg
}

fn photo(w: u32, h: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(w, h, |x, y| {
        image::Rgba([(x * 3) as u8, (y * 3) as u8, 90, 255])
    });
    encode_png_rgba8(img.as_raw(), w, h).unwrap()
}

fn design(name: &str, w: u32, h: u32) -> DesignImage {
    DesignImage {
        name: name.to_string(),
        image: Arc::new(image::RgbaImage::from_pixel(w, h, image::Rgba([30, 60, 200, 255]))),
    }
}

#[tokio::test]
async fn upload_place_drag_and_snapshot() {
    let mut session = MockupSession::with_provider(config(), DepthProvider::default()).unwrap();
    let kind = session.load_source_and_wait(photo(80, 60)).await.unwrap();
    assert_eq!(kind, CompositorKind::Software);
    assert_eq!(session.depth().unwrap().method, "fallback");
    assert_eq!(session.depth().unwrap().resolution(), 48);

    let placed = session.set_design(design("logo", 20, 10)).unwrap();
    assert_eq!((placed.width, placed.height), (40.0, 20.0));

    let controller = session.controller_mut().unwrap();
    controller.pointer_down(Point::new(placed.x + 5.0, placed.y + 5.0));
    let moved = controller.pointer_move(Point::new(0.0, 0.0)).unwrap();
    controller.pointer_up();
    assert_eq!((moved.x, moved.y), (0.0, 0.0));

    let frame = session.render_current().unwrap();
    assert_eq!((frame.width, frame.height), (80, 60));

    let png = session.snapshot_png().unwrap();
    let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), (80, 60));
    assert_eq!(decoded.into_raw(), frame.to_straight_rgba8());
}

#[tokio::test]
async fn late_depth_for_a_replaced_photo_is_dropped() {
    let mut session = MockupSession::with_provider(config(), DepthProvider::default()).unwrap();
    let old = session.load_source(photo(40, 40)).unwrap();
    let old_version = old.version();
    let new = session.load_source(photo(64, 32)).unwrap();

    // The new photo's depth lands first, then the old one straggles in.
    assert!(session.apply_depth(new.run().await).unwrap());
    assert!(!session.apply_depth(old.run().await).unwrap());
    assert!(old_version < session.version());
    assert_eq!(session.engine().surface().unwrap().width, 64);
}

#[tokio::test]
async fn failed_depth_processing_surfaces_the_error() {
    let mut session = MockupSession::with_provider(config(), DepthProvider::default()).unwrap();
    let job = session.load_source(photo(16, 16)).unwrap();
    let outcome = DepthOutcome {
        version: job.version(),
        depth: Err(DrapeError::validation("raw depth map is empty")),
    };
    assert!(session.apply_depth(outcome).is_err());
    assert!(session.depth().is_none());
    assert!(session.render_current().is_err());
}

#[tokio::test]
async fn unfiltered_render_shows_the_base_only() {
    let mut session = MockupSession::with_provider(config(), DepthProvider::default()).unwrap();
    session.load_source_and_wait(photo(30, 20)).await.unwrap();
    session.set_design(design("d", 4, 4)).unwrap();
    session.set_filters(false);

    let frame = session.render_current().unwrap();
    let base = image::load_from_memory(&photo(30, 20)).unwrap().to_rgba8();
    assert_eq!(frame.to_straight_rgba8(), base.into_raw());
}

#[tokio::test(start_paused = true)]
async fn frame_loop_renders_coalesced_placements() {
    let mut session = MockupSession::with_provider(config(), DepthProvider::default()).unwrap();
    session.load_source_and_wait(photo(50, 50)).await.unwrap();
    session.set_design(design("d", 10, 10)).unwrap();

    let rx = session.scheduler().subscribe();
    let controller = session.controller_mut().unwrap();
    let start = controller.placement().unwrap();
    controller.pointer_down(Point::new(start.x + 1.0, start.y + 1.0));
    for dx in 0..20 {
        controller.pointer_move(Point::new(start.x + 1.0 - f64::from(dx), start.y + 1.0));
    }
    controller.pointer_up();
    let last = controller.placement().unwrap();

    let mut seen = Vec::new();
    let loop_task = run_frame_loop(rx, Duration::from_millis(16), |p| seen.push(p));
    // The session keeps a scheduler handle, so stop the loop with a timeout.
    let _ = tokio::time::timeout(Duration::from_millis(50), loop_task).await;
    assert_eq!(seen, vec![last]);

    let frame = session.render_at(last).unwrap();
    assert_eq!((frame.width, frame.height), (50, 50));
}
