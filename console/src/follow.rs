//! Auto-follow for scrolling transcript and log views.
//!
//! A view re-pins to the bottom when content grows only if the user was
//! already within `threshold` of the bottom; a manual scroll-up is respected.

/// Scroll metrics reported by the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub scroll_top: u32,
    pub viewport_height: u32,
    pub content_height: u32,
}

impl Viewport {
    pub fn distance_from_bottom(&self) -> u32 {
        self.content_height
            .saturating_sub(self.scroll_top)
            .saturating_sub(self.viewport_height)
    }
}

#[derive(Debug, Clone)]
pub struct FollowState {
    threshold: u32,
    pinned: bool,
    seen_len: usize,
}

impl FollowState {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            pinned: true,
            seen_len: 0,
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn on_scroll(&mut self, viewport: Viewport) {
        self.pinned = viewport.distance_from_bottom() < self.threshold;
    }

    /// The user acted (e.g. sent a message); jump back to the bottom.
    pub fn repin(&mut self) {
        self.pinned = true;
    }

    /// Report the current item count; returns true when the view should
    /// scroll to the bottom because new items arrived while pinned.
    pub fn on_content(&mut self, len: usize) -> bool {
        let grew = len > self.seen_len;
        self.seen_len = len;
        grew && self.pinned
    }

    /// Forget the seen length, e.g. when switching to another log.
    pub fn reset(&mut self) {
        self.pinned = true;
        self.seen_len = 0;
    }
}
