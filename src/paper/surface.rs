//! The 2D drawing surface the interpreter paints on.
//!
//! The operations mirror an HTML canvas context: a current path, fill and
//! stroke colors, a line width, a font and a transform, with `save`/`restore`
//! for the style state.

use image::RgbaImage;

use crate::paper::model::{Affine, Color, DeviceRect, FontSpec};

pub trait Surface {
    /// Device pixel size of the surface.
    fn size(&self) -> (u32, u32);
    fn resize(&mut self, width: u32, height: u32);

    fn save(&mut self);
    fn restore(&mut self);
    fn set_transform(&mut self, transform: Affine);

    fn set_fill_color(&mut self, color: Color);
    fn set_stroke_color(&mut self, color: Color);
    fn set_line_width(&mut self, width: f64);
    fn set_font(&mut self, font: &FontSpec);

    fn clear_rect(&mut self, rect: DeviceRect);
    fn fill_rect(&mut self, rect: DeviceRect);
    fn stroke_rect(&mut self, rect: DeviceRect);

    fn begin_path(&mut self);
    fn move_to(&mut self, x: f64, y: f64);
    fn line_to(&mut self, x: f64, y: f64);
    fn arc_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, radius: f64);
    fn bezier_curve_to(&mut self, c1x: f64, c1y: f64, c2x: f64, c2y: f64, x: f64, y: f64);
    fn rect(&mut self, rect: DeviceRect);
    fn close_path(&mut self);
    fn fill(&mut self);
    fn stroke(&mut self);

    fn fill_text(&mut self, text: &str, x: f64, y: f64, max_width: Option<f64>);
    fn stroke_text(&mut self, text: &str, x: f64, y: f64, max_width: Option<f64>);

    fn draw_image(&mut self, image: &RgbaImage, src: DeviceRect, dst: DeviceRect);
}

/// One recorded surface call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    Resize(u32, u32),
    Save,
    Restore,
    SetTransform(Affine),
    FillColor(Color),
    StrokeColor(Color),
    LineWidth(f64),
    Font(String),
    ClearRect(DeviceRect),
    FillRect(DeviceRect),
    StrokeRect(DeviceRect),
    BeginPath,
    MoveTo(f64, f64),
    LineTo(f64, f64),
    ArcTo(f64, f64, f64, f64, f64),
    BezierTo(f64, f64, f64, f64, f64, f64),
    Rect(DeviceRect),
    ClosePath,
    Fill,
    Stroke,
    FillText {
        text: String,
        x: f64,
        y: f64,
        max_width: Option<f64>,
    },
    StrokeText {
        text: String,
        x: f64,
        y: f64,
        max_width: Option<f64>,
    },
    DrawImage {
        size: (u32, u32),
        src: DeviceRect,
        dst: DeviceRect,
    },
}

/// Surface that only records what it was asked to do.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    pub calls: Vec<DrawCall>,
    size: (u32, u32),
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            calls: Vec::new(),
            size: (width, height),
        }
    }

    pub fn take(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn count(&self, pred: impl Fn(&DrawCall) -> bool) -> usize {
        self.calls.iter().filter(|call| pred(call)).count()
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.calls.push(DrawCall::Resize(width, height));
    }

    fn save(&mut self) {
        self.calls.push(DrawCall::Save);
    }

    fn restore(&mut self) {
        self.calls.push(DrawCall::Restore);
    }

    fn set_transform(&mut self, transform: Affine) {
        self.calls.push(DrawCall::SetTransform(transform));
    }

    fn set_fill_color(&mut self, color: Color) {
        self.calls.push(DrawCall::FillColor(color));
    }

    fn set_stroke_color(&mut self, color: Color) {
        self.calls.push(DrawCall::StrokeColor(color));
    }

    fn set_line_width(&mut self, width: f64) {
        self.calls.push(DrawCall::LineWidth(width));
    }

    fn set_font(&mut self, font: &FontSpec) {
        self.calls.push(DrawCall::Font(font.to_string()));
    }

    fn clear_rect(&mut self, rect: DeviceRect) {
        self.calls.push(DrawCall::ClearRect(rect));
    }

    fn fill_rect(&mut self, rect: DeviceRect) {
        self.calls.push(DrawCall::FillRect(rect));
    }

    fn stroke_rect(&mut self, rect: DeviceRect) {
        self.calls.push(DrawCall::StrokeRect(rect));
    }

    fn begin_path(&mut self) {
        self.calls.push(DrawCall::BeginPath);
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.calls.push(DrawCall::MoveTo(x, y));
    }

    fn line_to(&mut self, x: f64, y: f64) {
        self.calls.push(DrawCall::LineTo(x, y));
    }

    fn arc_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, radius: f64) {
        self.calls.push(DrawCall::ArcTo(x1, y1, x2, y2, radius));
    }

    fn bezier_curve_to(&mut self, c1x: f64, c1y: f64, c2x: f64, c2y: f64, x: f64, y: f64) {
        self.calls.push(DrawCall::BezierTo(c1x, c1y, c2x, c2y, x, y));
    }

    fn rect(&mut self, rect: DeviceRect) {
        self.calls.push(DrawCall::Rect(rect));
    }

    fn close_path(&mut self) {
        self.calls.push(DrawCall::ClosePath);
    }

    fn fill(&mut self) {
        self.calls.push(DrawCall::Fill);
    }

    fn stroke(&mut self) {
        self.calls.push(DrawCall::Stroke);
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, max_width: Option<f64>) {
        self.calls.push(DrawCall::FillText {
            text: text.to_owned(),
            x,
            y,
            max_width,
        });
    }

    fn stroke_text(&mut self, text: &str, x: f64, y: f64, max_width: Option<f64>) {
        self.calls.push(DrawCall::StrokeText {
            text: text.to_owned(),
            x,
            y,
            max_width,
        });
    }

    fn draw_image(&mut self, image: &RgbaImage, src: DeviceRect, dst: DeviceRect) {
        self.calls.push(DrawCall::DrawImage {
            size: image.dimensions(),
            src,
            dst,
        });
    }
}
