use std::sync::Arc;

use crate::{
    assets::encode_png,
    config::GpuConfig,
    foundation::core::SurfaceSize,
    foundation::error::{DrapeError, DrapeResult},
    render::{
        BackendKind, Compositor, CompositorKind, FrameParams, FrameRGBA, SceneLayers,
        create_compositor,
    },
};

/// Lifecycle of a [`CompositeEngine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initialized,
    Rendering,
    Destroyed,
}

/// Owns the active compositor, the scene layers it was built from and the single active design.
///
/// Draws are serialized through `&mut self`. With [`BackendKind::Auto`] a GPU compositor that
/// cannot be created, or that fails a frame, is replaced by the software compositor.
pub struct CompositeEngine {
    backend: BackendKind,
    surface_override: Option<SurfaceSize>,
    gpu: GpuConfig,

    state: EngineState,
    surface: Option<SurfaceSize>,
    layers: Option<SceneLayers>,
    design: Option<Arc<image::RgbaImage>>,
    compositor: Option<Box<dyn Compositor>>,
}

impl CompositeEngine {
    /// `surface = None` renders at the base photo's own dimensions.
    pub fn new(backend: BackendKind, surface: Option<SurfaceSize>, gpu: GpuConfig) -> Self {
        Self {
            backend,
            surface_override: surface,
            gpu,
            state: EngineState::Uninitialized,
            surface: None,
            layers: None,
            design: None,
            compositor: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Kind of the compositor currently in use, if any.
    pub fn kind(&self) -> Option<CompositorKind> {
        self.compositor.as_ref().map(|c| c.kind())
    }

    pub fn surface(&self) -> Option<SurfaceSize> {
        self.surface
    }

    pub fn layers(&self) -> Option<&SceneLayers> {
        self.layers.as_ref()
    }

    pub fn design(&self) -> Option<&Arc<image::RgbaImage>> {
        self.design.as_ref()
    }

    /// Build the compositor for `layers`. Any previous compositor is released first and the active
    /// design, if one is set, is uploaded to the new one.
    #[tracing::instrument(skip_all, fields(backend = ?self.backend))]
    pub fn initialize(&mut self, layers: SceneLayers) -> DrapeResult<CompositorKind> {
        if let Some(mut old) = self.compositor.take() {
            old.destroy();
        }

        let surface = match self.surface_override {
            Some(s) => s,
            None => SurfaceSize::new(layers.base.width(), layers.base.height())?,
        };

        let mut compositor = self.build_compositor(&layers, surface)?;
        if let Some(design) = &self.design {
            compositor.set_design(design)?;
        }
        let kind = compositor.kind();

        tracing::info!(
            ?kind,
            width = surface.width,
            height = surface.height,
            depth_method = %layers.depth.method,
            "composite engine initialized"
        );

        self.surface = Some(surface);
        self.layers = Some(layers);
        self.compositor = Some(compositor);
        self.state = EngineState::Initialized;
        Ok(kind)
    }

    fn build_compositor(
        &self,
        layers: &SceneLayers,
        surface: SurfaceSize,
    ) -> DrapeResult<Box<dyn Compositor>> {
        match self.backend {
            BackendKind::Software => {
                create_compositor(CompositorKind::Software, layers, surface, &self.gpu)
            }
            BackendKind::Gpu => create_compositor(CompositorKind::Gpu, layers, surface, &self.gpu),
            BackendKind::Auto => {
                match create_compositor(CompositorKind::Gpu, layers, surface, &self.gpu) {
                    Ok(c) => Ok(c),
                    Err(e) => {
                        tracing::warn!(error = %e, "gpu compositor unavailable; using software");
                        create_compositor(CompositorKind::Software, layers, surface, &self.gpu)
                    }
                }
            }
        }
    }

    fn ensure_usable(&self) -> DrapeResult<()> {
        match self.state {
            EngineState::Destroyed => Err(DrapeError::evaluation("composite engine was destroyed")),
            _ => Ok(()),
        }
    }

    /// Replace the active design. Latest write wins.
    pub fn set_design(&mut self, design: Arc<image::RgbaImage>) -> DrapeResult<()> {
        self.ensure_usable()?;
        if design.width() == 0 || design.height() == 0 {
            return Err(DrapeError::validation("design image is empty"));
        }
        if let Some(c) = self.compositor.as_mut() {
            c.set_design(&design)?;
        }
        self.design = Some(design);
        Ok(())
    }

    pub fn clear_design(&mut self) {
        if let Some(c) = self.compositor.as_mut() {
            c.clear_design();
        }
        self.design = None;
    }

    /// Restore a design previously read through [`Self::design`].
    pub fn restore_design(&mut self, design: Option<Arc<image::RgbaImage>>) -> DrapeResult<()> {
        match design {
            Some(d) => self.set_design(d),
            None => {
                self.clear_design();
                Ok(())
            }
        }
    }

    pub fn render(&mut self, params: &FrameParams) -> DrapeResult<FrameRGBA> {
        self.ensure_usable()?;
        let compositor = self
            .compositor
            .as_mut()
            .ok_or_else(|| DrapeError::evaluation("composite engine is not initialized"))?;
        let kind = compositor.kind();

        self.state = EngineState::Rendering;
        let result = compositor.render(params);
        self.state = EngineState::Initialized;

        match result {
            Ok(frame) => Ok(frame),
            Err(e) if self.backend == BackendKind::Auto && kind == CompositorKind::Gpu => {
                tracing::warn!(error = %e, "gpu frame failed; degrading to software");
                self.degrade_to_software()?;
                self.render(params)
            }
            Err(e) => Err(e),
        }
    }

    fn degrade_to_software(&mut self) -> DrapeResult<()> {
        let (Some(layers), Some(surface)) = (self.layers.as_ref(), self.surface) else {
            return Err(DrapeError::evaluation("composite engine is not initialized"));
        };
        let mut software = create_compositor(CompositorKind::Software, layers, surface, &self.gpu)?;
        if let Some(design) = &self.design {
            software.set_design(design)?;
        }
        if let Some(mut old) = self.compositor.replace(software) {
            old.destroy();
        }
        Ok(())
    }

    /// Render one frame and encode it as PNG. GPU readback waits on the map fence, never a delay.
    pub fn capture_frame(&mut self, params: &FrameParams) -> DrapeResult<Vec<u8>> {
        let frame = self.render(params)?;
        encode_png(&frame)
    }

    /// Release the compositor and everything it holds. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        if let Some(mut c) = self.compositor.take() {
            c.destroy();
        }
        if self.state != EngineState::Destroyed {
            tracing::debug!("composite engine destroyed");
        }
        self.layers = None;
        self.design = None;
        self.state = EngineState::Destroyed;
    }
}

impl Drop for CompositeEngine {
    fn drop(&mut self) {
        if let Some(mut c) = self.compositor.take() {
            c.destroy();
        }
    }
}
