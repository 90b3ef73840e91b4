//! A server-rendered document painted on a [`Surface`].
//!
//! [`ServerDocument`] consumes transport messages: `D:` messages are paint
//! streams, run as a live pass, and `n:` messages carry page notifications.
//! Bands defined by a stream remember where their commands start so the
//! whole page can be repainted from the band store at any time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::paper::bands::{Band, BandStore};
use crate::paper::chapters::Paging;
use crate::paper::editor::{OverlayAdapter, WidgetRegistry};
use crate::paper::events::{scroll_delta, ContextMenuEvent, DocumentEvent, Viewport};
use crate::paper::images::{fit_image, ImageCache, ImageLoader, ImagePlacement, NoImages};
use crate::paper::instruction::{Decoder, EditorOp, Instruction};
use crate::paper::interpreter::{self, PassEnv};
use crate::paper::model::{Affine, Color, DeviceRect, RenderState};
use crate::paper::redraw::RedrawTimer;
use crate::paper::scale::{Density, ScaleContext};
use crate::paper::surface::Surface;
use crate::settings::Settings;

/// Band type that gets the add/remove line context menu.
pub const DETAIL_BAND: &str = "DT";
/// Side of the context menu button, in CSS pixels.
pub const BTN_SIZE: f64 = 24.0;

const GRID_MINOR_WIDTH: f64 = 0.15;
const GRID_MAJOR_WIDTH: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentOptions {
    pub page_width: f64,
    pub page_height: f64,
    pub background: Color,
    pub zoom: f64,
    pub density: Density,
    pub redraw_delay: Duration,
    pub default_widget_tag: String,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            page_width: 595.0,
            page_height: 842.0,
            background: Color::WHITE,
            zoom: 1.0,
            density: Density::default(),
            redraw_delay: Duration::from_millis(300),
            default_widget_tag: "text-widget".into(),
        }
    }
}

impl DocumentOptions {
    /// Options from user settings; `host_dpr` is used unless settings force a ratio.
    pub fn from_settings(settings: &Settings, host_dpr: f64) -> Self {
        let background = Color::from_hex(&settings.background_color).unwrap_or_else(|| {
            tracing::warn!(color = %settings.background_color, "invalid background color, using white");
            Color::WHITE
        });
        Self {
            page_width: settings.page_width,
            page_height: settings.page_height,
            background,
            zoom: settings.zoom,
            density: Density {
                device_pixel_ratio: settings.device_pixel_ratio.unwrap_or(host_dpr),
                backing_store_ratio: 1.0,
            },
            redraw_delay: settings.redraw_debounce(),
            default_widget_tag: settings.default_widget_tag.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassKind {
    /// A stream that just arrived from the server.
    Live,
    /// A stored band stream or overlay fragment being repainted.
    Replay,
}

enum Flow {
    Continue,
    Stop,
}

#[derive(Debug, Default, Deserialize)]
struct Notification {
    #[serde(default)]
    focus: Option<String>,
    #[serde(default)]
    variables: Option<Variables>,
}

#[derive(Debug, Default, Deserialize)]
struct Variables {
    #[serde(default, rename = "PAGE_COUNT")]
    page_count: Option<u32>,
    #[serde(default, rename = "PAGE_NUMBER")]
    page_number: Option<u32>,
}

pub struct ServerDocument<S: Surface> {
    surface: S,
    scale: ScaleContext,
    background: Color,
    state: RenderState,
    bands: BandStore,
    images: ImageCache,
    loader: Box<dyn ImageLoader>,
    redraw: RedrawTimer,
    overlay: OverlayAdapter,
    // Remainder of the stream after the last live `ep`, painted over all bands.
    pending_overlay: Option<(Arc<str>, usize)>,
    grid_major: f64,
    grid_minor: f64,
    paging: Paging,
    editable: bool,
    right_margin: f64,
    context_menu: Option<i64>,
    viewport: Option<Viewport>,
    events: Vec<DocumentEvent>,
}

impl<S: Surface> ServerDocument<S> {
    pub fn new(surface: S, options: DocumentOptions, widgets: WidgetRegistry) -> Self {
        let scale = ScaleContext::new(
            options.density,
            options.page_width,
            options.page_height,
            options.zoom,
        );
        let mut doc = Self {
            surface,
            scale,
            background: options.background,
            state: RenderState::default(),
            bands: BandStore::new(),
            images: ImageCache::default(),
            loader: Box::new(NoImages),
            redraw: RedrawTimer::new(options.redraw_delay),
            overlay: OverlayAdapter::new(widgets, options.default_widget_tag),
            pending_overlay: None,
            grid_major: 0.0,
            grid_minor: 0.0,
            paging: Paging::default(),
            editable: false,
            right_margin: 0.0,
            context_menu: None,
            viewport: None,
            events: Vec::new(),
        };
        doc.resize_canvas();
        doc
    }

    pub fn with_image_loader(mut self, loader: Box<dyn ImageLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    pub fn scale(&self) -> &ScaleContext {
        &self.scale
    }

    pub fn bands(&self) -> &BandStore {
        &self.bands
    }

    pub fn images(&self) -> &ImageCache {
        &self.images
    }

    pub fn overlay(&self) -> &OverlayAdapter {
        &self.overlay
    }

    pub fn paging(&self) -> &Paging {
        &self.paging
    }

    pub fn paging_mut(&mut self) -> &mut Paging {
        &mut self.paging
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn set_editable(&mut self, editable: bool) {
        self.editable = editable;
        if !editable {
            self.hide_context_menu();
        }
    }

    pub fn set_background(&mut self, color: Color) {
        self.background = color;
    }

    pub fn set_viewport(&mut self, viewport: Option<Viewport>) {
        self.viewport = viewport;
    }

    pub fn has_pending_overlay(&self) -> bool {
        self.pending_overlay.is_some()
    }

    pub fn redraw_pending(&self) -> bool {
        self.redraw.is_armed()
    }

    /// Band the context menu is currently attached to.
    pub fn context_menu_band(&self) -> Option<&Band> {
        self.bands.find_by_id(self.context_menu?)
    }

    pub fn take_events(&mut self) -> Vec<DocumentEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn push_event(&mut self, event: DocumentEvent) {
        self.events.push(event);
    }

    /// Applies the geometry reported when a chapter is opened.
    pub fn configure_page(&mut self, width: f64, height: f64, right_margin: f64) {
        self.right_margin = right_margin;
        self.scale.set_page_size(width, height);
        self.resize_canvas();
    }

    /// Changes the zoom. Returns the new server scale when it changed.
    pub fn set_zoom(&mut self, zoom: f64) -> Option<f64> {
        let before = self.scale.document_to_canvas_scale();
        self.scale.set_zoom(zoom);
        self.resize_canvas();
        let after = self.scale.document_to_canvas_scale();
        (after.is_finite() && after != before).then_some(after)
    }

    /// Drops every trace of the open document and blanks the canvas.
    pub fn reset(&mut self) {
        self.hide_context_menu();
        self.overlay.reset();
        self.bands.clear();
        self.images.clear();
        self.loader.reset();
        self.pending_overlay = None;
        self.redraw.cancel();
        self.state = RenderState::default();
        self.clear_page();
    }

    /// Feeds one transport message.
    pub fn handle_message(&mut self, message: &str) {
        if message.starts_with("D:") {
            let source: Arc<str> = Arc::from(message);
            self.run_pass(source, 2, PassKind::Live);
        } else if let Some(json) = message.strip_prefix("n:") {
            self.handle_notification(json);
        } else {
            tracing::debug!(len = message.len(), "ignoring unknown message");
        }
    }

    /// Paints a bare command stream, without the `D:` prefix.
    pub fn paint(&mut self, commands: &str) {
        self.run_pass(Arc::from(commands), 0, PassKind::Live);
    }

    /// Clears the canvas and replays every stored band, then the overlay fragment.
    pub fn repaint_all(&mut self) {
        self.redraw.cancel();
        let started = Instant::now();
        self.surface.save();
        self.clear_page();
        let streams: Vec<(Arc<str>, usize)> = self
            .bands
            .iter()
            .map(|band| (band.source.clone(), band.source_offset))
            .collect();
        for (source, offset) in streams {
            self.run_pass(source, offset, PassKind::Replay);
        }
        if let Some((source, offset)) = self.pending_overlay.clone() {
            self.run_pass(source, offset, PassKind::Replay);
        }
        self.surface.restore();
        tracing::debug!(
            bands = self.bands.len(),
            elapsed = ?started.elapsed(),
            "page repainted"
        );
    }

    /// Collects finished image loads and repaints once the redraw timer expires.
    ///
    /// Returns `true` if the page was repainted.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut arrived = false;
        for load in self.loader.poll() {
            arrived |= self.images.complete(&load.path, load.result);
        }
        if arrived {
            self.redraw.arm(now);
        }
        if self.redraw.due(now) {
            self.repaint_all();
            return true;
        }
        false
    }

    /// Web fonts finished loading; text metrics may have changed.
    pub fn fonts_loaded(&mut self, now: Instant) {
        self.redraw.arm(now);
    }

    /// Pointer moved over the canvas, in CSS pixels. Ignored while the editor overlay is shown.
    pub fn pointer_moved(&mut self, _offset_x: f64, offset_y: f64) {
        if self.overlay.is_visible() {
            return;
        }
        if !self.scale.canvas_to_document_scale().is_finite() {
            return;
        }
        if self.editable {
            let y = self.scale.css_to_device(offset_y);
            self.update_context_menu(y);
        }
    }

    fn resize_canvas(&mut self) {
        let (width, height) = self.scale.device_size();
        self.surface.resize(width, height);
        self.clear_page();
    }

    fn clear_page(&mut self) {
        let (width, height) = self.surface.size();
        let (width, height) = (f64::from(width), f64::from(height));
        self.surface.save();
        self.surface.set_transform(Affine::IDENTITY);
        self.surface.set_fill_color(self.background);
        self.surface.fill_rect(DeviceRect::new(0.0, 0.0, width, height));
        // Minor spacing below one device pixel disables the grid.
        if self.grid_major != 0.0 && self.grid_minor >= 1.0 {
            self.paint_grid(width, height, false);
            self.paint_grid(width, height, true);
        }
        self.surface.restore();
    }

    fn paint_grid(&mut self, width: f64, height: f64, major: bool) {
        let on_major = |v: f64| (v % self.grid_major) == 0.0;
        self.surface.begin_path();
        self.surface.set_stroke_color(Color::GRID);
        self.surface.set_line_width(if major {
            GRID_MAJOR_WIDTH
        } else {
            GRID_MINOR_WIDTH
        });
        let mut x = 0.0;
        while x < width {
            if on_major(x) == major {
                self.surface.move_to(x, 0.0);
                self.surface.line_to(x, height);
            }
            x += self.grid_minor;
        }
        let mut y = 0.0;
        while y < height {
            if on_major(y) == major {
                self.surface.move_to(0.0, y);
                self.surface.line_to(width, y);
            }
            y += self.grid_minor;
        }
        self.surface.stroke();
    }

    fn run_pass(&mut self, source: Arc<str>, start: usize, kind: PassKind) {
        self.state = RenderState::default();
        interpreter::apply_defaults(&self.state, &mut self.surface);
        let mut painting = true;
        let mut decoder = Decoder::new(&source, start);
        while let Some(next) = decoder.next_instruction() {
            let instruction = match next {
                Ok(instruction) => instruction,
                Err(err) => {
                    tracing::warn!(error = %err, "malformed paint command");
                    continue;
                }
            };
            let flow = self.apply(instruction, &source, decoder.position(), kind, &mut painting);
            if let Flow::Stop = flow {
                break;
            }
            if !decoder.terminated() {
                tracing::warn!(offset = decoder.position(), "command is not terminated");
            }
        }
    }

    fn apply(
        &mut self,
        instruction: Instruction,
        source: &Arc<str>,
        position: usize,
        kind: PassKind,
        painting: &mut bool,
    ) -> Flow {
        let live = kind == PassKind::Live;
        match instruction {
            Instruction::Reset { .. } | Instruction::Band(_) | Instruction::Update if !live => {
                return Flow::Stop;
            }
            Instruction::Reset { hard } => {
                if hard {
                    self.clear_page();
                } else {
                    self.state = RenderState::default();
                    interpreter::apply_defaults(&self.state, &mut self.surface);
                }
                self.hide_context_menu();
                self.bands.clear();
                self.pending_overlay = None;
            }
            Instruction::Band(def) => {
                *painting = def.paint;
                if def.paint {
                    let width = f64::from(self.surface.size().0);
                    self.surface
                        .clear_rect(DeviceRect::new(0.0, def.origin_y, width, def.height));
                }
                self.bands.upsert(Band {
                    id: def.id,
                    kind: def.kind,
                    editable: def.editable,
                    height: def.height,
                    origin_x: def.origin_x,
                    origin_y: def.origin_y,
                    source_offset: position,
                    source: source.clone(),
                });
            }
            Instruction::Update => {
                if !self.bands.is_empty() {
                    self.repaint_all();
                }
                return Flow::Stop;
            }
            Instruction::Image(placement) => self.draw_image(&placement, *painting),
            Instruction::Editor(op) => return self.apply_editor(op, source, position, kind, *painting),
            Instruction::Grid { major, minor } => {
                if live {
                    self.grid_major = major;
                    self.grid_minor = minor;
                }
            }
            Instruction::Page { number, count } => {
                if live {
                    if let Some(event) = self.paging.set_chapter_page(number, count) {
                        self.events.push(event);
                    }
                }
            }
            other => {
                let env = PassEnv {
                    ratio: self.scale.ratio(),
                    painting: *painting,
                };
                interpreter::execute(&mut self.state, env, &mut self.surface, &other);
            }
        }
        Flow::Continue
    }

    fn apply_editor(
        &mut self,
        op: EditorOp,
        source: &Arc<str>,
        position: usize,
        kind: PassKind,
        painting: bool,
    ) -> Flow {
        let ratio = self.scale.ratio();
        if kind == PassKind::Replay {
            match op {
                EditorOp::Prepare(_) => return Flow::Stop,
                EditorOp::DebugBox(rect) if painting => self.debug_box(rect),
                _ => {}
            }
            return Flow::Continue;
        }
        match op {
            EditorOp::Attach(json) => {
                if let Err(err) = self.overlay.attach(&json, ratio) {
                    tracing::warn!(error = %format!("{err:#}"), "editor binding failed");
                    self.events.push(DocumentEvent::BindingError(format!("{err:#}")));
                }
            }
            EditorOp::Configure(mode) => self.overlay.configure(mode),
            EditorOp::Prepare(rect) => {
                self.overlay.prepare(rect, ratio);
                self.update_context_menu(rect.y + rect.height / 2.0);
                self.pending_overlay = Some((source.clone(), position));
                return Flow::Stop;
            }
            EditorOp::Start(start) => {
                self.overlay.start(&start, ratio);
                self.adjust_scroll();
            }
            EditorOp::Update(update) => self.overlay.update(&update),
            EditorOp::Finish => {
                self.overlay.finish();
                self.pending_overlay = None;
            }
            EditorOp::DebugBox(rect) => {
                if painting {
                    self.debug_box(rect);
                }
            }
            EditorOp::Hint { rect, text } => {
                self.overlay.hint(rect.to_css(ratio), &text);
            }
            EditorOp::Other(sub) => tracing::debug!(%sub, "unknown editor command"),
        }
        Flow::Continue
    }

    fn debug_box(&mut self, rect: DeviceRect) {
        self.surface.save();
        self.surface.set_stroke_color(Color::RED);
        self.surface.stroke_rect(rect);
        self.surface.restore();
    }

    fn draw_image(&mut self, placement: &ImagePlacement, painting: bool) {
        if placement.path.is_empty() {
            return;
        }
        if self.images.begin_fetch(&placement.path) {
            tracing::debug!(path = %placement.path, "fetching image");
            self.loader.request(&placement.path);
            return;
        }
        if !painting {
            return;
        }
        let Some(bitmap) = self.images.ready(&placement.path) else {
            return;
        };
        let fit = fit_image(
            placement,
            f64::from(bitmap.width()),
            f64::from(bitmap.height()),
        );
        self.surface.draw_image(&bitmap, fit.src, fit.dst);
    }

    /// `y` in device pixels.
    fn update_context_menu(&mut self, y: f64) {
        if !self.editable {
            self.hide_context_menu();
            return;
        }
        let target = self
            .bands
            .find_at_y(y)
            .filter(|band| band.kind == DETAIL_BAND && band.editable)
            .map(|band| (band.id, band.origin_y, band.height));
        let Some((id, origin_y, height)) = target else {
            self.hide_context_menu();
            return;
        };
        if self.context_menu == Some(id) {
            return;
        }
        let ratio = self.scale.ratio();
        let (page_width, _) = self.scale.page_size();
        let x = (page_width - self.right_margin) * self.scale.document_to_canvas_scale();
        let y = origin_y + height / 2.0 - BTN_SIZE * ratio / 2.0;
        self.context_menu = Some(id);
        self.events
            .push(DocumentEvent::ContextMenu(ContextMenuEvent::Shown {
                band_id: id,
                anchor: (x / ratio, y / ratio),
            }));
    }

    fn hide_context_menu(&mut self) {
        if self.context_menu.take().is_some() {
            self.events
                .push(DocumentEvent::ContextMenu(ContextMenuEvent::Hidden));
        }
    }

    fn adjust_scroll(&mut self) {
        let Some(viewport) = self.viewport else {
            return;
        };
        let Some(bounds) = self.overlay.widget().and_then(|w| w.bounds()) else {
            return;
        };
        let (dx, dy) = scroll_delta(bounds, viewport);
        if dx != 0.0 || dy != 0.0 {
            self.events.push(DocumentEvent::ScrollBy { dx, dy });
        }
    }

    fn handle_notification(&mut self, json: &str) {
        let notification: Notification = match serde_json::from_str(json) {
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(error = %err, "malformed notification");
                return;
            }
        };
        if let Some(focus) = notification.focus.as_deref() {
            if focus == "forward" || focus == "backwards" {
                tracing::debug!(focus, "focus notification");
                return;
            }
        }
        let Some(vars) = notification.variables else {
            return;
        };
        if let Some(count) = vars.page_count.filter(|&c| c > 0) {
            if let Some(event) = self.paging.update_page_count(count) {
                self.events.push(event);
            }
        }
        if let Some(number) = vars.page_number.filter(|&n| n > 0) {
            if let Some(event) = self.paging.update_page_number(number) {
                self.events.push(event);
            }
        }
    }
}

impl<S: Surface + std::fmt::Debug> std::fmt::Debug for ServerDocument<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDocument")
            .field("surface", &self.surface)
            .field("scale", &self.scale)
            .field("bands", &self.bands.len())
            .field("images", &self.images.len())
            .field("overlay", &self.overlay)
            .field("editable", &self.editable)
            .finish()
    }
}
