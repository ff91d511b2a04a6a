use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::LOG_INTERNAL;
use crate::error::BridgeError;
use crate::frames::web_frames::WebFrames;
use crate::protocol::bridge::PageBridge;
use crate::protocol::messages::{FrameInfo, FrameRef, Point, Rect};

#[derive(Debug, Default)]
struct LocatorState {
    rect: Option<Rect>,
    scroll: HashMap<String, (f64, f64)>,
    /// Ancestor scroll since construction, not yet part of `origin`.
    ancestor_shift: Point,
}

/// Tracks where one field sits in the main viewport.
///
/// The ancestor chain is resolved once at construction. Afterwards only
/// scroll events of frames on that chain move the rectangle, by the
/// opposite of the scroll delta, so overlays follow the field without a
/// geometry query per tick.
#[derive(Debug)]
pub struct FieldLocator {
    element_id: String,
    frame: FrameRef,
    chain: Vec<String>,
    origin: Point,
    state: Mutex<LocatorState>,
    updates: watch::Sender<Option<Rect>>,
}

impl FieldLocator {
    pub fn new(element_id: impl Into<String>, frame: &FrameRef, frames: &WebFrames) -> Self {
        let chain = frames.frames_in_path(frame.href());
        let scroll = chain
            .iter()
            .filter_map(|href| {
                frames
                    .frame_info(href)
                    .map(|info| (href.clone(), (info.scroll_x, info.scroll_y)))
            })
            .collect();
        let (updates, _) = watch::channel(None);
        FieldLocator {
            element_id: element_id.into(),
            frame: frame.clone(),
            origin: frames.viewport_offset(frame.href()),
            chain,
            state: Mutex::new(LocatorState {
                rect: None,
                scroll,
                ancestor_shift: Point::default(),
            }),
            updates,
        }
    }

    pub fn element_id(&self) -> &str {
        &self.element_id
    }

    pub fn frame(&self) -> &FrameRef {
        &self.frame
    }

    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// Latest known rectangle in main-viewport coordinates.
    pub fn current(&self) -> Option<Rect> {
        self.state.lock().rect
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Rect>> {
        self.updates.subscribe()
    }

    /// Query the field's geometry from the page.
    pub async fn refresh(&self, bridge: &dyn PageBridge) -> Result<Option<Rect>, BridgeError> {
        let rects = bridge
            .get_element_rects(std::slice::from_ref(&self.element_id), &self.frame)
            .await?;
        let measured = rects.into_iter().next().flatten();
        match measured {
            Some(rect) => self.set_measured(rect),
            None => debug!(target: LOG_INTERNAL, id = %self.element_id, "no rect for field"),
        }
        Ok(self.current())
    }

    /// Store a rectangle measured in the field's own frame coordinates.
    pub fn set_measured(&self, frame_rect: Rect) {
        let rect = {
            let mut state = self.state.lock();
            let shift = state.ancestor_shift;
            let rect = frame_rect.offset_by(self.origin.x - shift.x, self.origin.y - shift.y);
            state.rect = Some(rect);
            rect
        };
        self.updates.send_replace(Some(rect));
    }

    /// Apply a frame scroll. Returns whether the rectangle moved.
    pub fn frame_scrolled(&self, info: &FrameInfo) -> bool {
        if !self.chain.iter().any(|href| *href == info.href) {
            return false;
        }
        let moved = {
            let mut state = self.state.lock();
            let (last_x, last_y) = state
                .scroll
                .get(&info.href)
                .copied()
                .unwrap_or((info.scroll_x, info.scroll_y));
            let (dx, dy) = (info.scroll_x - last_x, info.scroll_y - last_y);
            state
                .scroll
                .insert(info.href.clone(), (info.scroll_x, info.scroll_y));
            if dx == 0.0 && dy == 0.0 {
                None
            } else {
                if self.chain.first() != Some(&info.href) {
                    state.ancestor_shift.x += dx;
                    state.ancestor_shift.y += dy;
                }
                state.rect = state.rect.map(|r| r.offset_by(-dx, -dy));
                Some(state.rect)
            }
        };
        match moved {
            Some(rect) => {
                self.updates.send_replace(rect);
                true
            }
            None => false,
        }
    }
}
