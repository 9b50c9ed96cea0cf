use std::{fs::File, io::BufReader, path::Path, time::Duration};

use anyhow::Context as _;

use crate::{
    foundation::core::{Size, SurfaceSize},
    foundation::error::{DrapeError, DrapeResult},
    render::BackendKind,
};

/// Per-pixel shading parameters shared by the GPU shader and the CPU reference.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ShadingParams {
    /// Warp magnitude applied to the depth-derived offset.
    pub strength: f32,
    pub shadow_power: f32,
    pub highlight_power: f32,
    /// Design texels at or below this alpha leave the base untouched.
    pub alpha_threshold: f32,
    /// Maximum fraction of the base replaced by the design.
    pub blend_cap: f32,
}

impl Default for ShadingParams {
    fn default() -> Self {
        Self {
            strength: 0.1,
            shadow_power: 0.3,
            highlight_power: 0.2,
            alpha_threshold: 0.1,
            blend_cap: 0.8,
        }
    }
}

impl ShadingParams {
    pub fn validate(&self) -> DrapeResult<()> {
        let fields = [
            ("strength", self.strength),
            ("shadow_power", self.shadow_power),
            ("highlight_power", self.highlight_power),
            ("alpha_threshold", self.alpha_threshold),
            ("blend_cap", self.blend_cap),
        ];
        for (name, v) in fields {
            if !v.is_finite() || v < 0.0 {
                return Err(DrapeError::validation(format!(
                    "shading.{name} must be finite and >= 0 (got {v})"
                )));
            }
        }
        if self.alpha_threshold > 1.0 || self.blend_cap > 1.0 {
            return Err(DrapeError::validation(
                "shading.alpha_threshold and shading.blend_cap must be <= 1",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DepthConfig {
    /// Canonical N for the N×N processed depth map.
    pub resolution: u32,
    pub blur_radius: u32,
    pub blur_sigma: f32,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            resolution: 1024,
            blur_radius: 3,
            blur_sigma: 1.5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub min_width: f64,
    pub min_height: f64,
    /// Side of the square resize handle at the placement's bottom-right corner.
    pub handle_size: f64,
    pub refresh_interval_ms: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            min_width: 50.0,
            min_height: 50.0,
            handle_size: 16.0,
            refresh_interval_ms: 16,
        }
    }
}

impl InteractionConfig {
    pub fn min_size(&self) -> Size {
        Size::new(self.min_width, self.min_height)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

/// One remote depth-estimation endpoint, tried in list order.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProviderConfig {
    pub label: String,
    pub endpoint: String,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_provider_timeout_ms() -> u64 {
    30_000
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GpuConfig {
    /// Bound on waiting for texture uploads and frame readback.
    pub fence_timeout_ms: u64,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            fence_timeout_ms: 5_000,
        }
    }
}

impl GpuConfig {
    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DrapeConfig {
    pub shading: ShadingParams,
    pub depth: DepthConfig,
    pub interaction: InteractionConfig,
    pub providers: Vec<ProviderConfig>,
    pub gpu: GpuConfig,
    pub backend: BackendKind,
    /// Render surface; `None` uses the base photo's dimensions.
    pub surface: Option<SurfaceSize>,
}

impl DrapeConfig {
    pub fn from_json_file(path: &Path) -> DrapeResult<Self> {
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse config JSON '{}'", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> DrapeResult<()> {
        self.shading.validate()?;

        if self.depth.resolution == 0 {
            return Err(DrapeError::validation("depth.resolution must be > 0"));
        }
        if !self.depth.blur_sigma.is_finite() || self.depth.blur_sigma <= 0.0 {
            return Err(DrapeError::validation("depth.blur_sigma must be > 0"));
        }

        let ix = &self.interaction;
        if !positive(ix.min_width) || !positive(ix.min_height) {
            return Err(DrapeError::validation(
                "interaction min_width/min_height must be > 0",
            ));
        }
        if !positive(ix.handle_size) {
            return Err(DrapeError::validation("interaction.handle_size must be > 0"));
        }
        if ix.refresh_interval_ms == 0 {
            return Err(DrapeError::validation(
                "interaction.refresh_interval_ms must be > 0",
            ));
        }

        for p in &self.providers {
            if p.endpoint.trim().is_empty() {
                return Err(DrapeError::validation(format!(
                    "provider '{}' has an empty endpoint",
                    p.label
                )));
            }
            if p.timeout_ms == 0 {
                return Err(DrapeError::validation(format!(
                    "provider '{}' timeout_ms must be > 0",
                    p.label
                )));
            }
        }

        if self.gpu.fence_timeout_ms == 0 {
            return Err(DrapeError::validation("gpu.fence_timeout_ms must be > 0"));
        }

        if let Some(s) = self.surface {
            SurfaceSize::new(s.width, s.height)?;
            if f64::from(s.width) < ix.min_width || f64::from(s.height) < ix.min_height {
                return Err(DrapeError::validation(
                    "surface must be at least the minimum design size",
                ));
            }
        }
        Ok(())
    }
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}
