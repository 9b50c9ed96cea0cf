use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;

use crate::{
    DrapeError, DrapeResult,
    assets::{decode::decode_design, encode_png},
    config::ShadingParams,
    foundation::core::{Placement, Size},
    render::{FrameParams, FrameRGBA, engine::CompositeEngine},
};

/// Display name of the unfiltered base result that always comes first.
pub const ORIGINAL_NAME: &str = "Original";

/// A design on disk; `name` is the file stem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesignFile {
    pub name: String,
    pub path: PathBuf,
}

impl DesignFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }
}

#[derive(Clone, Debug)]
pub struct CompositeResult {
    pub name: String,
    pub frame: FrameRGBA,
    pub failed: bool,
}

impl CompositeResult {
    fn ok(name: impl Into<String>, frame: FrameRGBA) -> Self {
        Self {
            name: name.into(),
            frame,
            failed: false,
        }
    }

    fn failed(name: &str) -> Self {
        Self {
            name: format!("{name} (Failed)"),
            frame: FrameRGBA::placeholder(),
            failed: true,
        }
    }

    pub fn png_bytes(&self) -> DrapeResult<Vec<u8>> {
        encode_png(&self.frame)
    }
}

/// Drives one engine across many designs, strictly one at a time.
pub struct BatchRenderer<'e> {
    engine: &'e mut CompositeEngine,
    shading: ShadingParams,
    min_size: Size,
    placement: Option<Placement>,
}

impl<'e> BatchRenderer<'e> {
    pub fn new(engine: &'e mut CompositeEngine, shading: ShadingParams, min_size: Size) -> Self {
        Self {
            engine,
            shading,
            min_size,
            placement: None,
        }
    }

    /// Use one placement for every design instead of each design's default.
    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = Some(placement);
        self
    }

    /// "Original" first, then one result per design in input order. A design that cannot be read,
    /// decoded or rendered becomes a failed placeholder and the batch carries on. The engine's
    /// active design is restored afterwards.
    #[tracing::instrument(skip_all, fields(designs = designs.len()))]
    pub async fn generate_results(&mut self, designs: &[DesignFile]) -> Vec<CompositeResult> {
        let previous = self.engine.design().cloned();
        let mut results = Vec::with_capacity(designs.len() + 1);

        results.push(match self.capture_original() {
            Ok(frame) => CompositeResult::ok(ORIGINAL_NAME, frame),
            Err(err) => {
                tracing::warn!(%err, "failed to capture the original");
                CompositeResult::failed(ORIGINAL_NAME)
            }
        });

        for design in designs {
            match self.render_design(design).await {
                Ok(frame) => {
                    tracing::debug!(name = %design.name, "design rendered");
                    results.push(CompositeResult::ok(design.name.clone(), frame));
                }
                Err(err) => {
                    tracing::warn!(name = %design.name, %err, "design failed");
                    results.push(CompositeResult::failed(&design.name));
                }
            }
        }

        if let Err(err) = self.engine.restore_design(previous) {
            tracing::warn!(%err, "failed to restore the previous design");
        }
        results
    }

    fn capture_original(&mut self) -> DrapeResult<FrameRGBA> {
        let placement = self.placement.unwrap_or(Placement::new(0.0, 0.0, 0.0, 0.0));
        self.engine.render(&FrameParams::new(self.shading, placement).unfiltered())
    }

    async fn render_design(&mut self, design: &DesignFile) -> DrapeResult<FrameRGBA> {
        let bytes = read_design(&design.path).await?;
        let image = decode_design(&bytes)?;
        let surface = self
            .engine
            .surface()
            .ok_or_else(|| DrapeError::evaluation("composite engine is not initialized"))?;
        let placement = self.placement.unwrap_or_else(|| {
            Placement::centered_default(
                surface.to_kurbo(),
                image.width(),
                image.height(),
                self.min_size,
            )
        });

        self.engine.set_design(Arc::new(image))?;
        self.engine.render(&FrameParams::new(self.shading, placement))
    }
}

async fn read_design(path: &Path) -> DrapeResult<Vec<u8>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read design '{}'", path.display()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn design_name_is_the_file_stem() {
        let d = DesignFile::from_path("/tmp/designs/logo.final.svg");
        assert_eq!(d.name, "logo.final");
        assert_eq!(d.path, PathBuf::from("/tmp/designs/logo.final.svg"));
    }

    #[test]
    fn failed_result_is_a_named_placeholder() {
        let r = CompositeResult::failed("shirt");
        assert_eq!(r.name, "shirt (Failed)");
        assert!(r.failed);
        assert_eq!(r.frame, FrameRGBA::placeholder());
        let png = r.png_bytes().unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (1, 1));
    }
}
