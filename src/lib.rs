//! Drape composites a design image onto a product photo so it looks printed on the product.
//!
//! A depth map of the photo warps the design, and shadow/highlight masks taken from the photo's
//! own luminance are reapplied on top. The flow is session-oriented:
//!
//! - Load a base photo into a [`MockupSession`] and run the returned [`session::DepthJob`]
//! - Pick a design, move it with the [`interaction::InteractionController`]
//! - Render frames, take a PNG snapshot, or batch-render many designs
#![forbid(unsafe_code)]

mod foundation;

pub mod assets;
pub mod batch;
pub mod blur_cpu;
pub mod composite_cpu;
pub mod config;
pub mod depth;
pub mod interaction;
pub mod lighting;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod shading;

pub use crate::foundation::core::{Placement, Point, Rect, Size, SurfaceSize, Vec2, fit_rect};
pub use crate::foundation::error::{DrapeError, DrapeResult};

pub use crate::assets::{DesignImage, SourceImage};
pub use crate::batch::{BatchRenderer, CompositeResult, DesignFile};
pub use crate::config::{DrapeConfig, ShadingParams};
pub use crate::render::engine::{CompositeEngine, EngineState};
pub use crate::render::{BackendKind, CompositorKind, FrameParams, FrameRGBA, SceneLayers};
pub use crate::session::MockupSession;
