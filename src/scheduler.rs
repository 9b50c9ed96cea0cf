use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

use crate::foundation::core::Placement;

/// Coalesces re-render requests: any number of requests between two display refreshes collapse
/// into one render of the latest placement.
#[derive(Clone, Debug)]
pub struct RenderScheduler {
    tx: Arc<watch::Sender<Option<Placement>>>,
}

impl Default for RenderScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderScheduler {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Record `placement` as the next frame to draw. Latest request wins.
    pub fn request(&self, placement: Placement) {
        self.tx.send_replace(Some(placement));
    }

    /// Receiver for [`run_frame_loop`]. Requests made before subscribing are treated as seen.
    pub fn subscribe(&self) -> watch::Receiver<Option<Placement>> {
        self.tx.subscribe()
    }

    /// Most recently requested placement, rendered or not.
    pub fn latest(&self) -> Option<Placement> {
        *self.tx.borrow()
    }
}

/// Tick at `refresh` and call `on_frame` at most once per tick with the latest pending placement.
///
/// Returns the number of frames drawn once every [`RenderScheduler`] handle is dropped. A request
/// still pending at that point is drawn before returning.
pub async fn run_frame_loop<F>(
    mut rx: watch::Receiver<Option<Placement>>,
    refresh: Duration,
    mut on_frame: F,
) -> usize
where
    F: FnMut(Placement),
{
    let mut ticker = tokio::time::interval(refresh);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut drawn = 0usize;
    let mut last: Option<Placement> = None;
    loop {
        ticker.tick().await;
        match rx.has_changed() {
            Ok(false) => continue,
            Ok(true) => {}
            Err(_) => {
                let pending = *rx.borrow();
                if let Some(p) = pending.filter(|p| last != Some(*p)) {
                    on_frame(p);
                    drawn += 1;
                }
                break;
            }
        }

        let pending = *rx.borrow_and_update();
        if let Some(p) = pending {
            tracing::trace!(x = p.x, y = p.y, w = p.width, h = p.height, "frame");
            on_frame(p);
            last = Some(p);
            drawn += 1;
        }
    }
    tracing::debug!(drawn, "frame loop stopped");
    drawn
}
