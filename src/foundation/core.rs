use crate::foundation::error::{DrapeError, DrapeResult};

pub use kurbo::{Point, Rect, Size, Vec2};

/// Render surface (container) dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SurfaceSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl SurfaceSize {
    /// Create a validated, non-empty surface size.
    pub fn new(width: u32, height: u32) -> DrapeResult<Self> {
        if width == 0 || height == 0 {
            return Err(DrapeError::validation("surface width/height must be > 0"));
        }
        Ok(Self { width, height })
    }

    pub fn to_kurbo(self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }
}

/// Where the design sits, in container pixel space.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Placement {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn origin(self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn to_rect(self) -> Rect {
        Rect::from_origin_size(self.origin(), self.size())
    }

    pub fn from_rect(rect: Rect) -> Self {
        Self::new(rect.x0, rect.y0, rect.width(), rect.height())
    }

    /// Default placement for a freshly uploaded design: half the container width, the design's
    /// aspect ratio, centered, never smaller than `min` nor larger than the container.
    pub fn centered_default(container: Size, design_w: u32, design_h: u32, min: Size) -> Self {
        let aspect = if design_w == 0 || design_h == 0 {
            1.0
        } else {
            f64::from(design_h) / f64::from(design_w)
        };

        let mut width = container.width * 0.5;
        let mut height = width * aspect;
        if height > container.height {
            height = container.height * 0.5;
            width = height / aspect;
        }
        let width = width.min(container.width).max(min.width.min(container.width));
        let height = height
            .min(container.height)
            .max(min.height.min(container.height));

        Self::new(
            ((container.width - width) * 0.5).max(0.0),
            ((container.height - height) * 0.5).max(0.0),
            width,
            height,
        )
    }

    /// Whether the rectangle lies inside `[0, container]` on both axes.
    pub fn is_within(self, container: Size) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.x + self.width <= container.width
            && self.y + self.height <= container.height
    }
}

/// Rectangle occupied by the base photo on a surface: 1:1 when the dimensions match, otherwise
/// uniformly scaled to fit and centered.
pub fn fit_rect(image_w: u32, image_h: u32, surface: SurfaceSize) -> Rect {
    if image_w == surface.width && image_h == surface.height {
        return Rect::new(0.0, 0.0, f64::from(image_w), f64::from(image_h));
    }
    if image_w == 0 || image_h == 0 {
        return Rect::ZERO;
    }

    let sw = f64::from(surface.width);
    let sh = f64::from(surface.height);
    let scale = (sw / f64::from(image_w)).min(sh / f64::from(image_h));
    let w = f64::from(image_w) * scale;
    let h = f64::from(image_h) * scale;
    Rect::from_origin_size(Point::new((sw - w) * 0.5, (sh - h) * 0.5), Size::new(w, h))
}
