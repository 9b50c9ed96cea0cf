use crate::{
    config::InteractionConfig,
    foundation::core::{Placement, Point, Rect, Size, Vec2},
    scheduler::RenderScheduler,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InteractionState {
    Idle,
    /// `offset` is the pointer position relative to the placement origin at pointer-down.
    Dragging { offset: Vec2 },
    Resizing,
}

/// Drag/resize state machine over the design placement.
///
/// Every placement change is forwarded to the [`RenderScheduler`]; rendering itself never happens
/// here.
#[derive(Debug)]
pub struct InteractionController {
    container: Size,
    min_size: Size,
    handle_size: f64,
    placement: Option<Placement>,
    state: InteractionState,
    scheduler: RenderScheduler,
}

impl InteractionController {
    pub fn new(container: Size, cfg: &InteractionConfig, scheduler: RenderScheduler) -> Self {
        Self {
            container,
            min_size: cfg.min_size(),
            handle_size: cfg.handle_size,
            placement: None,
            state: InteractionState::Idle,
            scheduler,
        }
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn placement(&self) -> Option<Placement> {
        self.placement
    }

    pub fn container(&self) -> Size {
        self.container
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    /// Place a freshly selected design at its default position and size.
    pub fn reset_for_design(&mut self, design_w: u32, design_h: u32) -> Placement {
        let p = Placement::centered_default(self.container, design_w, design_h, self.min_size);
        self.state = InteractionState::Idle;
        self.commit(p);
        p
    }

    /// Place the design explicitly. Size is kept within `[min_size, container]` and the origin
    /// inside the container, as for pointer edits.
    pub fn set_placement(&mut self, p: Placement) -> Placement {
        let min = self.effective_min();
        let width = clamp_to(p.width, min.width, self.container.width);
        let height = clamp_to(p.height, min.height, self.container.height);
        let clamped = Placement::new(
            clamp_to(p.x, 0.0, self.container.width - width),
            clamp_to(p.y, 0.0, self.container.height - height),
            width,
            height,
        );
        self.state = InteractionState::Idle;
        self.commit(clamped);
        clamped
    }

    /// Forget the placement, e.g. when the design is removed.
    pub fn clear(&mut self) {
        self.placement = None;
        self.state = InteractionState::Idle;
    }

    /// Square grab area whose bottom-right corner is the placement's bottom-right corner.
    pub fn handle_rect(&self) -> Option<Rect> {
        self.placement.map(|p| {
            let br = Point::new(p.x + p.width, p.y + p.height);
            Rect::new(br.x - self.handle_size, br.y - self.handle_size, br.x, br.y)
        })
    }

    pub fn pointer_down(&mut self, p: Point) -> InteractionState {
        let Some(placement) = self.placement else {
            self.state = InteractionState::Idle;
            return self.state;
        };

        self.state = if self.handle_rect().is_some_and(|h| contains_closed(h, p)) {
            InteractionState::Resizing
        } else if contains_closed(placement.to_rect(), p) {
            InteractionState::Dragging {
                offset: p - placement.origin(),
            }
        } else {
            InteractionState::Idle
        };
        self.state
    }

    /// Apply a pointer move. Returns the new placement when it changed.
    pub fn pointer_move(&mut self, p: Point) -> Option<Placement> {
        let current = self.placement?;
        let min = self.effective_min();
        let next = match self.state {
            InteractionState::Idle => return None,
            InteractionState::Dragging { offset } => {
                let origin = p - offset;
                Placement::new(
                    clamp_to(origin.x, 0.0, self.container.width - current.width),
                    clamp_to(origin.y, 0.0, self.container.height - current.height),
                    current.width,
                    current.height,
                )
            }
            InteractionState::Resizing => Placement::new(
                current.x,
                current.y,
                clamp_to(
                    p.x - current.x,
                    min.width,
                    self.container.width - current.x,
                ),
                clamp_to(
                    p.y - current.y,
                    min.height,
                    self.container.height - current.y,
                ),
            ),
        };

        if next == current {
            return None;
        }
        self.commit(next);
        Some(next)
    }

    pub fn pointer_up(&mut self) {
        self.state = InteractionState::Idle;
    }

    /// Minimum size capped by the container, so photos smaller than the minimum still bound the
    /// placement.
    fn effective_min(&self) -> Size {
        Size::new(
            self.min_size.width.min(self.container.width),
            self.min_size.height.min(self.container.height),
        )
    }

    fn commit(&mut self, p: Placement) {
        self.placement = Some(p);
        self.scheduler.request(p);
    }
}

fn contains_closed(r: Rect, p: Point) -> bool {
    p.x >= r.x0 && p.x <= r.x1 && p.y >= r.y0 && p.y <= r.y1
}

/// Clamp into `[lo, hi]`; when the range is inverted the lower bound wins.
fn clamp_to(v: f64, lo: f64, hi: f64) -> f64 {
    v.min(hi).max(lo)
}
