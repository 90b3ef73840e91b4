//! Software rasterizer behind the [`Surface`] trait.
//!
//! Paths are flattened to polylines in device space as they are built, fills
//! use a non-zero winding scanline and strokes stamp a round brush along each
//! segment. Text needs a font engine and is not rasterized.

use image::{Rgba, RgbaImage};

use crate::paper::model::{Affine, Color, DeviceRect, FontSpec};
use crate::paper::surface::Surface;

const CURVE_STEPS: usize = 16;

#[derive(Debug, Clone)]
struct StyleState {
    fill: Color,
    stroke: Color,
    line_width: f64,
    transform: Affine,
    font: FontSpec,
}

impl Default for StyleState {
    fn default() -> Self {
        Self {
            fill: Color::BLACK,
            stroke: Color::BLACK,
            line_width: 1.0,
            transform: Affine::IDENTITY,
            font: FontSpec::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SubPath {
    points: Vec<(f64, f64)>,
    closed: bool,
}

#[derive(Debug, Clone)]
pub struct RasterSurface {
    pixels: RgbaImage,
    backdrop: Color,
    state: StyleState,
    stack: Vec<StyleState>,
    path: Vec<SubPath>,
    // Current and subpath start points in user space, needed by `arc_to`.
    cursor: Option<(f64, f64)>,
    start: Option<(f64, f64)>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
            backdrop: Color::rgba(0, 0, 0, 0),
            state: StyleState::default(),
            stack: Vec::new(),
            path: Vec::new(),
            cursor: None,
            start: None,
        }
    }

    /// Color written by `clear_rect`. Transparent unless set.
    pub fn with_backdrop(mut self, color: Color) -> Self {
        self.backdrop = color;
        self
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.pixels.width() || y >= self.pixels.height() {
            return None;
        }
        let Rgba([r, g, b, a]) = *self.pixels.get_pixel(x, y);
        Some(Color::rgba(r, g, b, a))
    }

    fn to_device(&self, x: f64, y: f64) -> (f64, f64) {
        self.state.transform.apply(x, y)
    }

    fn push_point(&mut self, x: f64, y: f64) {
        let device = self.to_device(x, y);
        match self.path.last_mut() {
            Some(sub) if !sub.closed => sub.points.push(device),
            _ => self.path.push(SubPath {
                points: vec![device],
                closed: false,
            }),
        }
        self.cursor = Some((x, y));
    }

    /// Stroke width in device pixels, capped at twice the canvas diagonal.
    fn device_width(&self) -> u32 {
        let scale = self.state.transform.a * self.state.transform.d
            - self.state.transform.b * self.state.transform.c;
        let width = self.state.line_width * scale.abs().sqrt();
        let (w, h) = self.pixels.dimensions();
        let cap = 2.0 * f64::from(w).hypot(f64::from(h)) + 2.0;
        if width.is_finite() {
            width.round().clamp(1.0, cap) as u32
        } else {
            1
        }
    }

    fn rect_polygon(&self, rect: DeviceRect) -> Vec<(f64, f64)> {
        [
            (rect.x, rect.y),
            (rect.x + rect.width, rect.y),
            (rect.x + rect.width, rect.y + rect.height),
            (rect.x, rect.y + rect.height),
        ]
        .into_iter()
        .map(|(x, y)| self.to_device(x, y))
        .collect()
    }

    fn stroke_polyline(&mut self, points: &[(f64, f64)], closed: bool) {
        let width = self.device_width();
        let color = self.state.stroke;
        let (w, h) = self.pixels.dimensions();
        let pixels: &mut [u8] = &mut self.pixels;
        for pair in points.windows(2) {
            draw_segment(pair[0], pair[1], color, width, pixels, w, h);
        }
        if closed && points.len() > 2 {
            let first = points[0];
            let last = points[points.len() - 1];
            draw_segment(last, first, color, width, pixels, w, h);
        }
        if points.len() == 1 {
            draw_brush(to_pixel(points[0]), color, width, pixels, w, h);
        }
    }
}

impl Surface for RasterSurface {
    fn size(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.pixels.dimensions() != (width, height) {
            self.pixels = RgbaImage::new(width, height);
        }
    }

    fn save(&mut self) {
        self.stack.push(self.state.clone());
    }

    fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    fn set_transform(&mut self, transform: Affine) {
        self.state.transform = transform;
    }

    fn set_fill_color(&mut self, color: Color) {
        self.state.fill = color;
    }

    fn set_stroke_color(&mut self, color: Color) {
        self.state.stroke = color;
    }

    fn set_line_width(&mut self, width: f64) {
        if width.is_finite() && width > 0.0 {
            self.state.line_width = width;
        }
    }

    fn set_font(&mut self, font: &FontSpec) {
        self.state.font = font.clone();
    }

    fn clear_rect(&mut self, rect: DeviceRect) {
        let polygon = self.rect_polygon(rect);
        let (w, h) = self.pixels.dimensions();
        fill_polygons(&[polygon], self.backdrop, false, &mut self.pixels, w, h);
    }

    fn fill_rect(&mut self, rect: DeviceRect) {
        let polygon = self.rect_polygon(rect);
        let (w, h) = self.pixels.dimensions();
        fill_polygons(&[polygon], self.state.fill, true, &mut self.pixels, w, h);
    }

    fn stroke_rect(&mut self, rect: DeviceRect) {
        let polygon = self.rect_polygon(rect);
        self.stroke_polyline(&polygon, true);
    }

    fn begin_path(&mut self) {
        self.path.clear();
        self.cursor = None;
        self.start = None;
    }

    fn move_to(&mut self, x: f64, y: f64) {
        let device = self.to_device(x, y);
        self.path.push(SubPath {
            points: vec![device],
            closed: false,
        });
        self.cursor = Some((x, y));
        self.start = Some((x, y));
    }

    fn line_to(&mut self, x: f64, y: f64) {
        if self.cursor.is_none() {
            self.move_to(x, y);
            return;
        }
        self.push_point(x, y);
    }

    fn arc_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, radius: f64) {
        let Some((x0, y0)) = self.cursor else {
            self.move_to(x1, y1);
            return;
        };
        let (v1x, v1y) = (x0 - x1, y0 - y1);
        let (v2x, v2y) = (x2 - x1, y2 - y1);
        let (l1, l2) = (v1x.hypot(v1y), v2x.hypot(v2y));
        if radius <= 0.0 || l1 == 0.0 || l2 == 0.0 {
            self.line_to(x1, y1);
            return;
        }
        let (u1x, u1y) = (v1x / l1, v1y / l1);
        let (u2x, u2y) = (v2x / l2, v2y / l2);
        let cos = (u1x * u2x + u1y * u2y).clamp(-1.0, 1.0);
        let theta = cos.acos();
        if theta.abs() < 1e-9 || (std::f64::consts::PI - theta).abs() < 1e-9 {
            self.line_to(x1, y1);
            return;
        }
        let tangent = radius / (theta / 2.0).tan();
        let (t1x, t1y) = (x1 + u1x * tangent, y1 + u1y * tangent);
        let (t2x, t2y) = (x1 + u2x * tangent, y1 + u2y * tangent);
        let (bx, by) = (u1x + u2x, u1y + u2y);
        let bl = bx.hypot(by);
        let center_dist = radius / (theta / 2.0).sin();
        let (cx, cy) = (x1 + bx / bl * center_dist, y1 + by / bl * center_dist);

        self.line_to(t1x, t1y);
        let a0 = (t1y - cy).atan2(t1x - cx);
        let a1 = (t2y - cy).atan2(t2x - cx);
        let mut sweep = a1 - a0;
        while sweep > std::f64::consts::PI {
            sweep -= std::f64::consts::TAU;
        }
        while sweep < -std::f64::consts::PI {
            sweep += std::f64::consts::TAU;
        }
        for step in 1..=CURVE_STEPS {
            let a = a0 + sweep * step as f64 / CURVE_STEPS as f64;
            self.push_point(cx + radius * a.cos(), cy + radius * a.sin());
        }
    }

    fn bezier_curve_to(&mut self, c1x: f64, c1y: f64, c2x: f64, c2y: f64, x: f64, y: f64) {
        let Some((x0, y0)) = self.cursor else {
            self.move_to(x, y);
            return;
        };
        for step in 1..=CURVE_STEPS {
            let t = step as f64 / CURVE_STEPS as f64;
            let mt = 1.0 - t;
            let a = mt * mt * mt;
            let b = 3.0 * mt * mt * t;
            let c = 3.0 * mt * t * t;
            let d = t * t * t;
            self.push_point(
                a * x0 + b * c1x + c * c2x + d * x,
                a * y0 + b * c1y + c * c2y + d * y,
            );
        }
    }

    fn rect(&mut self, rect: DeviceRect) {
        self.move_to(rect.x, rect.y);
        self.line_to(rect.x + rect.width, rect.y);
        self.line_to(rect.x + rect.width, rect.y + rect.height);
        self.line_to(rect.x, rect.y + rect.height);
        self.close_path();
    }

    fn close_path(&mut self) {
        if let Some(sub) = self.path.last_mut() {
            sub.closed = true;
        }
        if let Some((x, y)) = self.start {
            self.cursor = Some((x, y));
        }
    }

    fn fill(&mut self) {
        let polygons: Vec<Vec<(f64, f64)>> = self
            .path
            .iter()
            .filter(|sub| sub.points.len() > 2)
            .map(|sub| sub.points.clone())
            .collect();
        let (w, h) = self.pixels.dimensions();
        fill_polygons(&polygons, self.state.fill, true, &mut self.pixels, w, h);
    }

    fn stroke(&mut self) {
        let path = std::mem::take(&mut self.path);
        for sub in &path {
            self.stroke_polyline(&sub.points, sub.closed);
        }
        self.path = path;
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, _max_width: Option<f64>) {
        tracing::trace!(text, x, y, font = %self.state.font, "text not rasterized");
    }

    fn stroke_text(&mut self, text: &str, x: f64, y: f64, _max_width: Option<f64>) {
        tracing::trace!(text, x, y, font = %self.state.font, "text not rasterized");
    }

    fn draw_image(&mut self, image: &RgbaImage, src: DeviceRect, dst: DeviceRect) {
        if dst.width <= 0.0 || dst.height <= 0.0 || src.width <= 0.0 || src.height <= 0.0 {
            return;
        }
        let Some(inverse) = self.state.transform.invert() else {
            return;
        };
        let corners = self.rect_polygon(dst);
        let (w, h) = self.pixels.dimensions();
        let min_x = corners.iter().map(|p| p.0).fold(f64::INFINITY, f64::min).floor().max(0.0) as u32;
        let min_y = corners.iter().map(|p| p.1).fold(f64::INFINITY, f64::min).floor().max(0.0) as u32;
        let max_x = corners.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max).ceil().min(w as f64) as u32;
        let max_y = corners.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max).ceil().min(h as f64) as u32;
        let (iw, ih) = image.dimensions();

        for py in min_y..max_y {
            for px in min_x..max_x {
                let (ux, uy) = inverse.apply(px as f64 + 0.5, py as f64 + 0.5);
                let fx = (ux - dst.x) / dst.width;
                let fy = (uy - dst.y) / dst.height;
                if !(0.0..1.0).contains(&fx) || !(0.0..1.0).contains(&fy) {
                    continue;
                }
                let sx = (src.x + fx * src.width).floor();
                let sy = (src.y + fy * src.height).floor();
                if sx < 0.0 || sy < 0.0 || sx >= iw as f64 || sy >= ih as f64 {
                    continue;
                }
                let Rgba([r, g, b, a]) = *image.get_pixel(sx as u32, sy as u32);
                blend_pixel(&mut self.pixels, w, h, px as i32, py as i32, Color::rgba(r, g, b, a));
            }
        }
    }
}

fn to_pixel(point: (f64, f64)) -> (i32, i32) {
    (point.0.floor() as i32, point.1.floor() as i32)
}

/// Non-zero winding scanline fill sampled at pixel centers.
fn fill_polygons(
    polygons: &[Vec<(f64, f64)>],
    color: Color,
    blend: bool,
    pixels: &mut [u8],
    width: u32,
    height: u32,
) {
    let mut edges = Vec::new();
    for polygon in polygons {
        for (i, &a) in polygon.iter().enumerate() {
            let b = polygon[(i + 1) % polygon.len()];
            if a.1 != b.1 {
                edges.push((a, b));
            }
        }
    }
    if edges.is_empty() {
        return;
    }
    let min_y = edges
        .iter()
        .map(|(a, b)| a.1.min(b.1))
        .fold(f64::INFINITY, f64::min)
        .floor()
        .max(0.0) as i32;
    let max_y = edges
        .iter()
        .map(|(a, b)| a.1.max(b.1))
        .fold(f64::NEG_INFINITY, f64::max)
        .ceil()
        .min(height as f64) as i32;

    let mut crossings: Vec<(f64, i32)> = Vec::new();
    for y in min_y..max_y {
        let sample_y = y as f64 + 0.5;
        crossings.clear();
        for &(a, b) in &edges {
            let (top, bottom, dir) = if a.1 < b.1 { (a, b, 1) } else { (b, a, -1) };
            if sample_y < top.1 || sample_y >= bottom.1 {
                continue;
            }
            let t = (sample_y - top.1) / (bottom.1 - top.1);
            crossings.push((top.0 + t * (bottom.0 - top.0), dir));
        }
        crossings.sort_by(|l, r| l.0.total_cmp(&r.0));
        let mut winding = 0;
        for pair in crossings.windows(2) {
            winding += pair[0].1;
            if winding == 0 {
                continue;
            }
            let x_start = (pair[0].0 - 0.5).ceil().max(0.0) as i32;
            let x_end = (pair[1].0 - 0.5).ceil().min(width as f64) as i32;
            for x in x_start..x_end {
                if blend {
                    blend_pixel(pixels, width, height, x, y, color);
                } else {
                    set_pixel_rgba(pixels, width, height, x, y, color);
                }
            }
        }
    }
}

/// Liang-Barsky clip of the segment `a`-`b` to the box `min`..`max`.
fn clip_segment(
    a: (f64, f64),
    b: (f64, f64),
    min: (f64, f64),
    max: (f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    if ![a.0, a.1, b.0, b.1].iter().all(|v| v.is_finite()) {
        return None;
    }
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [
        (-dx, a.0 - min.0),
        (dx, max.0 - a.0),
        (-dy, a.1 - min.1),
        (dy, max.1 - a.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((
        (a.0 + t0 * dx, a.1 + t0 * dy),
        (a.0 + t1 * dx, a.1 + t1 * dy),
    ))
}

fn draw_segment(
    start: (f64, f64),
    end: (f64, f64),
    color: Color,
    stroke_width: u32,
    pixels: &mut [u8],
    width: u32,
    height: u32,
) {
    let radius = brush_radius(stroke_width);
    // Anything clipped away lies farther than the brush from the canvas.
    let margin = radius as f64 + 2.0;
    let Some((start, end)) = clip_segment(
        start,
        end,
        (-margin, -margin),
        (f64::from(width) + margin, f64::from(height) + margin),
    ) else {
        return;
    };

    if radius > 0 {
        fill_thick_segment(start, end, color, stroke_width, pixels, width, height);
        return;
    }

    let (mut x0, mut y0) = to_pixel(start);
    let (x1, y1) = to_pixel(end);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        blend_pixel(pixels, width, height, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Wide strokes: the segment body as one quad plus a round cap at each end.
fn fill_thick_segment(
    start: (f64, f64),
    end: (f64, f64),
    color: Color,
    stroke_width: u32,
    pixels: &mut [u8],
    width: u32,
    height: u32,
) {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let length = dx.hypot(dy);
    if length > 0.0 {
        let half = f64::from(stroke_width) / 2.0;
        let (nx, ny) = (-dy / length * half, dx / length * half);
        // Pixel centres sit at +0.5; shift so the quad lines up with the brush caps.
        let quad = vec![
            (start.0 + 0.5 + nx, start.1 + 0.5 + ny),
            (end.0 + 0.5 + nx, end.1 + 0.5 + ny),
            (end.0 + 0.5 - nx, end.1 + 0.5 - ny),
            (start.0 + 0.5 - nx, start.1 + 0.5 - ny),
        ];
        fill_polygons(&[quad], color, true, pixels, width, height);
    }
    draw_brush(to_pixel(start), color, stroke_width, pixels, width, height);
    draw_brush(to_pixel(end), color, stroke_width, pixels, width, height);
}

fn brush_radius(stroke_width: u32) -> i64 {
    i64::from(stroke_width.saturating_sub(1) / 2)
}

/// Stamps a disc of `stroke_width` pixels, visiting only on-canvas pixels.
fn draw_brush(
    center: (i32, i32),
    color: Color,
    stroke_width: u32,
    pixels: &mut [u8],
    width: u32,
    height: u32,
) {
    if width == 0 || height == 0 {
        return;
    }
    let radius = brush_radius(stroke_width);
    let (cx, cy) = (i64::from(center.0), i64::from(center.1));
    let x_range = (cx - radius).max(0)..=(cx + radius).min(i64::from(width) - 1);
    let y_range = (cy - radius).max(0)..=(cy + radius).min(i64::from(height) - 1);
    for y in y_range {
        for x in x_range.clone() {
            let (dx, dy) = (x - cx, y - cy);
            if dx * dx + dy * dy <= radius * radius {
                blend_pixel(pixels, width, height, x as i32, y as i32, color);
            }
        }
    }
}

fn set_pixel_rgba(pixels: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: Color) {
    if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
        return;
    }
    let idx = (y as usize * width as usize + x as usize) * 4;
    if idx + 3 >= pixels.len() {
        return;
    }
    pixels[idx..idx + 4].copy_from_slice(&[color.r, color.g, color.b, color.a]);
}

/// Source-over compositing of `color` onto the pixel.
fn blend_pixel(pixels: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: Color) {
    match color.a {
        0 => {}
        255 => set_pixel_rgba(pixels, width, height, x, y, color),
        alpha => {
            if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
                return;
            }
            let idx = (y as usize * width as usize + x as usize) * 4;
            if idx + 3 >= pixels.len() {
                return;
            }
            let sa = alpha as u32;
            let da = pixels[idx + 3] as u32;
            let out_a = sa + da * (255 - sa) / 255;
            if out_a == 0 {
                return;
            }
            for (channel, src) in [color.r, color.g, color.b].into_iter().enumerate() {
                let dst = pixels[idx + channel] as u32;
                let value = (src as u32 * sa + dst * da * (255 - sa) / 255) / out_a;
                pixels[idx + channel] = value.min(255) as u8;
            }
            pixels[idx + 3] = out_a.min(255) as u8;
        }
    }
}
