use crate::paper::model::CssRect;

/// Notifications a document raises for its host, drained with `take_events`.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    /// Total page count of the whole document changed.
    PageCount(u32),
    /// Page currently shown, counted across chapters, 1-based.
    PageNumber(u32),
    /// The server reported the page state of the open chapter.
    ChapterPage { number: u32, count: u32 },
    Loaded {
        page_width: f64,
        page_height: f64,
        landscape: bool,
    },
    LoadError(String),
    BindingError(String),
    ContextMenu(ContextMenuEvent),
    /// Scroll the containing viewport so the overlay is visible.
    ScrollBy { dx: f64, dy: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContextMenuEvent {
    Shown { band_id: i64, anchor: (f64, f64) },
    Hidden,
}

/// Where the overlay is and the part of it the host can see, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// Scroll needed to bring `overlay` inside `viewport`.
///
/// An overlay wider than the viewport keeps its left edge visible.
pub fn scroll_delta(overlay: CssRect, viewport: Viewport) -> (f64, f64) {
    let right = overlay.left + overlay.width;
    let bottom = overlay.top + overlay.height;
    let right_delta = if overlay.width > viewport.right - viewport.left {
        0.0
    } else {
        (right - viewport.right).max(0.0)
    };
    let left_delta = (overlay.left - viewport.left).min(0.0);
    let top_delta = (overlay.top - viewport.top).min(0.0);
    let bottom_delta = (bottom - viewport.bottom).max(0.0);
    (left_delta + right_delta, top_delta + bottom_delta)
}
