use std::collections::HashMap;

use crate::protocol::messages::{FrameInfo, Point};

/// Ancestor walks stop after this many hops, which also breaks cycles in
/// malformed parent links.
pub const MAX_FRAME_DEPTH: usize = 10;

/// Geometry of every frame of the page, keyed by href.
#[derive(Debug, Default, Clone)]
pub struct WebFrames {
    frames: HashMap<String, FrameInfo>,
    main_href: Option<String>,
}

impl WebFrames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self, main_href: &str) {
        self.frames.clear();
        self.main_href = Some(main_href.to_string());
        self.frames
            .insert(main_href.to_string(), FrameInfo::root(main_href));
    }

    pub fn main_href(&self) -> Option<&str> {
        self.main_href.as_deref()
    }

    pub fn set_frame_info(&mut self, info: FrameInfo) {
        self.frames.insert(info.href.clone(), info);
    }

    pub fn set_frames(&mut self, frames: impl IntoIterator<Item = FrameInfo>) {
        for info in frames {
            self.set_frame_info(info);
        }
    }

    /// Record a scroll position, returning the updated frame info.
    /// Unknown frames are registered as roots.
    pub fn set_frame_info_scroll(&mut self, href: &str, scroll_x: f64, scroll_y: f64) -> FrameInfo {
        let info = self
            .frames
            .entry(href.to_string())
            .or_insert_with(|| FrameInfo::root(href));
        info.scroll_x = scroll_x;
        info.scroll_y = scroll_y;
        info.clone()
    }

    pub fn frame_info(&self, href: &str) -> Option<&FrameInfo> {
        self.frames.get(href)
    }

    /// `href` followed by its known ancestors, innermost first.
    pub fn frames_in_path(&self, href: &str) -> Vec<String> {
        let mut path = vec![href.to_string()];
        let mut current = href.to_string();
        while path.len() <= MAX_FRAME_DEPTH {
            let Some(info) = self.frames.get(&current).filter(|i| i.is_child()) else {
                break;
            };
            if path.contains(&info.parent_href) {
                break;
            }
            path.push(info.parent_href.clone());
            current = info.parent_href.clone();
        }
        path
    }

    /// Position of the frame's viewport origin inside the main viewport.
    ///
    /// Frame positions are in their parent's document coordinates, so every
    /// ancestor's scroll moves them. The frame's own scroll does not: it is
    /// already part of rectangles measured inside it.
    pub fn viewport_offset(&self, href: &str) -> Point {
        self.frames_in_path(href)
            .iter()
            .enumerate()
            .filter_map(|(depth, h)| self.frames.get(h).map(|info| (depth, info)))
            .fold(Point::default(), |mut acc, (depth, info)| {
                if info.is_child() {
                    acc.x += info.x;
                    acc.y += info.y;
                }
                if depth > 0 {
                    acc.x -= info.scroll_x;
                    acc.y -= info.scroll_y;
                }
                acc
            })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
