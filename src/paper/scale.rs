//! Mapping between document units, CSS pixels and device pixels.
//!
//! Three spaces are involved:
//! 1. Document space: page units the server lays the report out in
//! 2. CSS space: what the host positions widgets and receives pointer events in
//! 3. Device space: canvas pixels, what every paint command addresses

use crate::paper::model::{round2, CssRect, DeviceRect};

pub const MIN_ZOOM: f64 = 0.5;
pub const MAX_ZOOM: f64 = 2.0;
/// Longest canvas edge the backing store is allowed to reach, in device pixels.
pub const MAX_DEVICE_EDGE: u32 = 16_384;

/// Display density reported by the host, before quantization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Density {
    pub device_pixel_ratio: f64,
    pub backing_store_ratio: f64,
}

impl Default for Density {
    fn default() -> Self {
        Self {
            device_pixel_ratio: 1.0,
            backing_store_ratio: 1.0,
        }
    }
}

/// Snaps a reported device pixel ratio to the two densities the server renders for.
pub fn quantize_dpr(dpr: f64) -> f64 {
    if dpr > 1.6 {
        2.0
    } else {
        1.0
    }
}

/// Clamps a requested zoom to the supported range. Non-finite requests give 1.
pub fn clamp_zoom(zoom: f64) -> f64 {
    if zoom.is_finite() {
        zoom.clamp(MIN_ZOOM, MAX_ZOOM)
    } else {
        1.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScaleContext {
    ratio: f64,
    page_width: f64,
    page_height: f64,
    zoom: f64,
    css_width: f64,
    css_height: f64,
    document_to_canvas: f64,
    canvas_to_document: f64,
}

impl ScaleContext {
    pub fn new(density: Density, page_width: f64, page_height: f64, zoom: f64) -> Self {
        let backing = if density.backing_store_ratio > 0.0 {
            density.backing_store_ratio
        } else {
            1.0
        };
        let mut ctx = Self {
            ratio: quantize_dpr(density.device_pixel_ratio) / backing,
            page_width,
            page_height,
            zoom: clamp_zoom(zoom),
            css_width: 0.0,
            css_height: 0.0,
            document_to_canvas: f64::NAN,
            canvas_to_document: f64::NAN,
        };
        ctx.recompute();
        ctx
    }

    /// Device pixels per CSS pixel.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn page_size(&self) -> (f64, f64) {
        (self.page_width, self.page_height)
    }

    pub fn css_size(&self) -> (f64, f64) {
        (self.css_width, self.css_height)
    }

    /// Canvas backing store size in device pixels, capped at [`MAX_DEVICE_EDGE`].
    pub fn device_size(&self) -> (u32, u32) {
        let edge = |css: f64| {
            let device = css * self.ratio;
            if device.is_finite() {
                device.clamp(0.0, f64::from(MAX_DEVICE_EDGE)) as u32
            } else {
                0
            }
        };
        (edge(self.css_width), edge(self.css_height))
    }

    /// Scale the server renders with, rounded to two decimals.
    pub fn document_to_canvas_scale(&self) -> f64 {
        self.document_to_canvas
    }

    /// Factor from CSS pointer offsets to document units.
    pub fn canvas_to_document_scale(&self) -> f64 {
        self.canvas_to_document
    }

    /// Sets the zoom, clamped to `MIN_ZOOM..=MAX_ZOOM`.
    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = clamp_zoom(zoom);
        self.recompute();
    }

    pub fn set_page_size(&mut self, width: f64, height: f64) {
        self.page_width = width;
        self.page_height = height;
        self.recompute();
    }

    /// Pointer offset in CSS pixels to the document coordinates clicks are sent with.
    pub fn pointer_to_server(&self, offset_x: f64, offset_y: f64) -> Option<(f64, f64)> {
        if !self.canvas_to_document.is_finite() {
            return None;
        }
        Some((
            round2(offset_x * self.canvas_to_document),
            round2(offset_y * self.canvas_to_document),
        ))
    }

    /// Pointer offset in CSS pixels to device pixels.
    pub fn css_to_device(&self, css: f64) -> f64 {
        css * self.ratio
    }

    pub fn device_to_css(&self, rect: DeviceRect) -> CssRect {
        rect.to_css(self.ratio)
    }

    fn recompute(&mut self) {
        self.css_width = (self.page_width * self.zoom).round();
        self.css_height = (self.page_height * self.zoom).round();
        let device_width = self.css_width * self.ratio;
        if device_width > 0.0 && self.page_width > 0.0 {
            self.document_to_canvas = round2(device_width / self.page_width);
            self.canvas_to_document = self.page_width * self.ratio / device_width;
        } else {
            self.document_to_canvas = f64::NAN;
            self.canvas_to_document = f64::NAN;
        }
    }
}

impl Default for ScaleContext {
    fn default() -> Self {
        Self::new(Density::default(), 595.0, 842.0, 1.0)
    }
}
