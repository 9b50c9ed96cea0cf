//! The interactive mockup flow: one base photo, its depth and lighting layers, at most one active
//! design, and the engine that composites them.
//!
//! Depth estimation is slow and may finish after the user has already replaced the photo. Every
//! [`DepthJob`] carries the [`ImageVersion`] it was started for, and [`MockupSession::apply_depth`]
//! drops results whose version is no longer current.

use std::sync::Arc;

use crate::{
    DrapeError, DrapeResult,
    assets::{DesignImage, SourceImage},
    batch::{BatchRenderer, CompositeResult, DesignFile},
    config::{DepthConfig, DrapeConfig},
    depth::{DepthMap, process::process_depth_map, provider::DepthProvider},
    foundation::core::{Placement, SurfaceSize},
    interaction::InteractionController,
    lighting::{LightingMasks, extract_lighting_masks},
    render::{CompositorKind, FrameParams, FrameRGBA, SceneLayers, engine::CompositeEngine},
    scheduler::RenderScheduler,
};

/// Monotonic tag of the currently loaded base photo.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageVersion(u64);

impl ImageVersion {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Depth work for one base photo. Runs without borrowing the session.
pub struct DepthJob {
    version: ImageVersion,
    source: SourceImage,
    provider: Arc<DepthProvider>,
    cfg: DepthConfig,
}

/// Output of [`DepthJob::run`], still tagged with the version it was started for.
#[derive(Debug)]
pub struct DepthOutcome {
    pub version: ImageVersion,
    pub depth: DrapeResult<DepthMap>,
}

impl DepthJob {
    pub fn version(&self) -> ImageVersion {
        self.version
    }

    pub async fn run(self) -> DepthOutcome {
        let raw = self.provider.get_depth_map(&self.source).await;
        DepthOutcome {
            version: self.version,
            depth: process_depth_map(&raw, &self.cfg),
        }
    }
}

pub struct MockupSession {
    config: DrapeConfig,
    provider: Arc<DepthProvider>,
    engine: CompositeEngine,
    scheduler: RenderScheduler,

    version: ImageVersion,
    source: Option<SourceImage>,
    masks: Option<Arc<LightingMasks>>,
    depth: Option<Arc<DepthMap>>,
    controller: Option<InteractionController>,
    design: Option<DesignImage>,
    filters: bool,
}

impl MockupSession {
    pub fn new(config: DrapeConfig) -> DrapeResult<Self> {
        let provider = DepthProvider::from_configs(&config.providers)?;
        Self::with_provider(config, provider)
    }

    pub fn with_provider(config: DrapeConfig, provider: DepthProvider) -> DrapeResult<Self> {
        config.validate()?;
        let engine = CompositeEngine::new(config.backend, config.surface, config.gpu);
        Ok(Self {
            config,
            provider: Arc::new(provider),
            engine,
            scheduler: RenderScheduler::new(),
            version: ImageVersion::default(),
            source: None,
            masks: None,
            depth: None,
            controller: None,
            design: None,
            filters: true,
        })
    }

    pub fn version(&self) -> ImageVersion {
        self.version
    }

    pub fn engine(&self) -> &CompositeEngine {
        &self.engine
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    pub fn controller(&self) -> Option<&InteractionController> {
        self.controller.as_ref()
    }

    pub fn controller_mut(&mut self) -> Option<&mut InteractionController> {
        self.controller.as_mut()
    }

    pub fn depth(&self) -> Option<&Arc<DepthMap>> {
        self.depth.as_ref()
    }

    pub fn masks(&self) -> Option<&Arc<LightingMasks>> {
        self.masks.as_ref()
    }

    pub fn set_filters(&mut self, enabled: bool) {
        self.filters = enabled;
    }

    /// Replace the base photo. The previous engine resources are released, lighting masks are
    /// extracted immediately and the returned job produces the depth map.
    #[tracing::instrument(skip_all, fields(len = bytes.len()))]
    pub fn load_source(&mut self, bytes: Vec<u8>) -> DrapeResult<DepthJob> {
        let source = SourceImage::from_bytes(bytes)?;

        self.engine.destroy();
        self.engine =
            CompositeEngine::new(self.config.backend, self.config.surface, self.config.gpu);
        self.version = self.version.next();

        let surface = match self.config.surface {
            Some(s) => s,
            None => SurfaceSize::new(source.width(), source.height())?,
        };
        let mut controller = InteractionController::new(
            surface.to_kurbo(),
            &self.config.interaction,
            self.scheduler.clone(),
        );
        if let Some(design) = &self.design {
            controller.reset_for_design(design.image.width(), design.image.height());
        }

        self.masks = Some(Arc::new(extract_lighting_masks(&source.image)));
        self.depth = None;
        self.controller = Some(controller);
        self.source = Some(source.clone());

        tracing::info!(version = self.version.0, "base photo loaded");
        Ok(DepthJob {
            version: self.version,
            source,
            provider: self.provider.clone(),
            cfg: self.config.depth,
        })
    }

    /// Install a finished depth map. Returns `Ok(false)` when the result belongs to a photo that
    /// has since been replaced, or when depth for the current photo is already installed.
    pub fn apply_depth(&mut self, outcome: DepthOutcome) -> DrapeResult<bool> {
        if outcome.version != self.version {
            tracing::debug!(
                stale = outcome.version.0,
                current = self.version.0,
                "discarding stale depth"
            );
            return Ok(false);
        }
        if self.depth.is_some() {
            return Ok(false);
        }

        let depth = Arc::new(outcome.depth?);
        let (Some(source), Some(masks)) = (self.source.as_ref(), self.masks.as_ref()) else {
            return Err(DrapeError::evaluation("no base photo loaded"));
        };
        let layers = SceneLayers::new(source.image.clone(), depth.clone(), masks.clone())?;
        self.engine.initialize(layers)?;
        if let Some(design) = &self.design {
            self.engine.set_design(design.image.clone())?;
        }
        self.depth = Some(depth);
        Ok(true)
    }

    /// Convenience for callers without their own executor juggling.
    pub async fn load_source_and_wait(&mut self, bytes: Vec<u8>) -> DrapeResult<CompositorKind> {
        let job = self.load_source(bytes)?;
        let outcome = job.run().await;
        self.apply_depth(outcome)?;
        self.engine
            .kind()
            .ok_or_else(|| DrapeError::evaluation("composite engine is not initialized"))
    }

    /// Make `design` the active design and reset its placement to the default.
    pub fn set_design(&mut self, design: DesignImage) -> DrapeResult<Placement> {
        let controller = self
            .controller
            .as_mut()
            .ok_or_else(|| DrapeError::validation("load a base photo before choosing a design"))?;
        let placement = controller.reset_for_design(design.image.width(), design.image.height());
        if self.depth.is_some() {
            self.engine.set_design(design.image.clone())?;
        }
        tracing::debug!(name = %design.name, "design selected");
        self.design = Some(design);
        Ok(placement)
    }

    pub fn clear_design(&mut self) {
        self.design = None;
        self.engine.clear_design();
        if let Some(c) = self.controller.as_mut() {
            c.clear();
        }
    }

    fn frame_params(&self) -> FrameParams {
        let placement = self
            .controller
            .as_ref()
            .and_then(|c| c.placement())
            .unwrap_or(Placement::new(0.0, 0.0, 0.0, 0.0));
        let params = FrameParams::new(self.config.shading, placement);
        if self.filters { params } else { params.unfiltered() }
    }

    /// Render the current placement, e.g. from the frame loop.
    pub fn render_current(&mut self) -> DrapeResult<FrameRGBA> {
        let params = self.frame_params();
        self.engine.render(&params)
    }

    /// Render the current state with an explicit placement (what the frame loop hands over).
    pub fn render_at(&mut self, placement: Placement) -> DrapeResult<FrameRGBA> {
        let params = FrameParams {
            placement,
            ..self.frame_params()
        };
        self.engine.render(&params)
    }

    /// PNG of what is currently on screen.
    pub fn snapshot_png(&mut self) -> DrapeResult<Vec<u8>> {
        let params = self.frame_params();
        self.engine.capture_frame(&params)
    }

    /// Batch-render `designs` through this session's engine at the current placement, or at each
    /// design's default placement when none is set.
    pub async fn generate_results(
        &mut self,
        designs: &[DesignFile],
    ) -> DrapeResult<Vec<CompositeResult>> {
        if self.depth.is_none() {
            return Err(DrapeError::validation(
                "depth for the base photo is not ready yet",
            ));
        }
        let placement = self.controller.as_ref().and_then(|c| c.placement());
        let mut batch = BatchRenderer::new(
            &mut self.engine,
            self.config.shading,
            self.config.interaction.min_size(),
        );
        if let Some(p) = placement {
            batch = batch.with_placement(p);
        }
        Ok(batch.generate_results(designs).await)
    }

    pub fn destroy(&mut self) {
        self.engine.destroy();
        self.source = None;
        self.masks = None;
        self.depth = None;
        self.controller = None;
    }
}
