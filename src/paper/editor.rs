//! Binding between the server's editor sub-protocol and overlay widgets.
//!
//! The document owns one [`OverlayAdapter`]. The adapter owns the widgets it
//! has instantiated, keyed by tag, and at most one of them is bound at a
//! time. Widgets never hold a reference back to the document; anything they
//! need to send upstream goes through the session.

use std::collections::HashMap;
use std::fmt;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use crate::paper::instruction::{EditMode, EditorStart, EditorUpdate, StartValue, SubDocument};
use crate::paper::model::{CssRect, DeviceRect};

/// An interactive control positioned over the canvas.
///
/// Positions are CSS pixels relative to the canvas.
pub trait OverlayHost {
    /// Binds a widget model. Called with the binding already in CSS pixels.
    fn attach(&mut self, binding: &Value) -> Result<()>;
    fn configure(&mut self, mode: &EditMode);
    fn place(&mut self, rect: CssRect);
    fn set_visible(&mut self, visible: bool);
    fn set_value(&mut self, value: &StartValue);
    /// Left edge and baseline of the text the server drew under the overlay.
    fn align_text(&mut self, text_left: f64, baseline: f64);
    fn focus(&mut self);
    fn update(&mut self, update: &EditorUpdate);
    fn detach(&mut self);
    fn bounds(&self) -> Option<CssRect>;
    /// An empty `text` hides the tooltip.
    fn show_tooltip(&mut self, text: &str);
}

pub type WidgetFactory = Box<dyn Fn() -> Result<Box<dyn OverlayHost>>>;

/// Widget constructors by tag.
#[derive(Default)]
pub struct WidgetRegistry {
    factories: HashMap<String, WidgetFactory>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, tag: &str, factory: F)
    where
        F: Fn() -> Result<Box<dyn OverlayHost>> + 'static,
    {
        self.factories.insert(tag.to_owned(), Box::new(factory));
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    pub fn create(&self, tag: &str) -> Result<Box<dyn OverlayHost>> {
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| anyhow!("no widget registered for tag {tag}"))?;
        factory().with_context(|| format!("widget {tag} failed to initialize"))
    }
}

impl fmt::Debug for WidgetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetRegistry")
            .field("tags", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// What the server told us about the field being edited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditorBinding {
    pub band_id: Option<i64>,
    /// Overlay box in device pixels, from the last `ep`.
    pub device_box: Option<DeviceRect>,
    pub mode: Option<EditMode>,
    pub payload: Option<Value>,
}

impl EditorBinding {
    pub fn sub_document(&self) -> Option<&SubDocument> {
        self.mode.as_ref().and_then(EditMode::sub_document)
    }
}

pub struct OverlayAdapter {
    registry: WidgetRegistry,
    default_tag: String,
    widgets: HashMap<String, Box<dyn OverlayHost>>,
    active: Option<String>,
    binding: EditorBinding,
    visible: bool,
}

impl OverlayAdapter {
    pub fn new(registry: WidgetRegistry, default_tag: impl Into<String>) -> Self {
        Self {
            registry,
            default_tag: default_tag.into(),
            widgets: HashMap::new(),
            active: None,
            binding: EditorBinding::default(),
            visible: false,
        }
    }

    pub fn binding(&self) -> &EditorBinding {
        &self.binding
    }

    /// A bound widget is shown over the canvas, from `ea`/`ep` until `ef`.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn active_tag(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn widget(&self) -> Option<&dyn OverlayHost> {
        let tag = self.active.as_ref()?;
        self.widgets.get(tag).map(|w| w.as_ref())
    }

    fn widget_mut(&mut self) -> Option<&mut Box<dyn OverlayHost>> {
        let tag = self.active.as_ref()?;
        self.widgets.get_mut(tag)
    }

    /// Handles `ea`: resolves the widget named by the binding and binds it.
    ///
    /// On error nothing stays bound and the previous widget is hidden.
    pub fn attach(&mut self, json: &str, ratio: f64) -> Result<()> {
        if let Some(widget) = self.widget_mut() {
            widget.detach();
            widget.set_visible(false);
        }
        self.active = None;
        self.binding = EditorBinding::default();
        self.visible = false;

        let mut binding: Value = serde_json::from_str(json).context("invalid editor binding")?;
        let tag = binding
            .pointer("/binding/widget/tag")
            .and_then(Value::as_str)
            .unwrap_or(self.default_tag.as_str())
            .to_owned();
        adjust_binding(&mut binding, ratio);

        if !self.widgets.contains_key(&tag) {
            let widget = self.registry.create(&tag)?;
            self.widgets.insert(tag.clone(), widget);
        }
        let widget = self
            .widgets
            .get_mut(&tag)
            .ok_or_else(|| anyhow!("widget {tag} vanished"))?;
        if let Err(err) = widget.attach(&binding) {
            widget.detach();
            return Err(err.context(format!("widget {tag} rejected the binding")));
        }
        widget.set_visible(true);
        widget.focus();
        tracing::debug!(tag = %tag, "editor widget attached");
        self.active = Some(tag);
        self.binding.payload = Some(binding);
        self.visible = true;
        Ok(())
    }

    /// Handles `ec`. Replaces the mode and any sub-document reference.
    pub fn configure(&mut self, mode: EditMode) {
        if let Some(widget) = self.widget_mut() {
            widget.configure(&mode);
        }
        self.binding.mode = Some(mode);
    }

    /// Handles `ep`: positions and shows the overlay.
    pub fn prepare(&mut self, device_box: DeviceRect, ratio: f64) -> CssRect {
        let css = device_box.to_css(ratio);
        if let Some(widget) = self.widget_mut() {
            widget.place(css);
            widget.set_visible(true);
            self.visible = true;
        }
        self.binding.device_box = Some(device_box);
        css
    }

    /// Handles `es`: fills in the value and focuses the widget.
    pub fn start(&mut self, start: &EditorStart, ratio: f64) {
        self.binding.band_id = Some(start.band_id);
        if let Some(widget) = self.widget_mut() {
            widget.set_value(&start.value);
            widget.align_text(start.x / ratio, start.baseline / ratio);
            widget.focus();
        }
    }

    /// Handles `eu`.
    pub fn update(&mut self, update: &EditorUpdate) {
        if let Some(widget) = self.widget_mut() {
            widget.update(update);
        }
    }

    /// Handles `ef`: drops the binding but leaves the widget mounted.
    pub fn finish(&mut self) {
        if let Some(widget) = self.widget_mut() {
            widget.detach();
        }
        self.binding = EditorBinding::default();
        self.visible = false;
    }

    /// Handles `eh`. Hints whose midpoint is outside the widget are stale and dropped.
    pub fn hint(&mut self, rect: CssRect, text: &str) -> bool {
        let Some(widget) = self.widget_mut() else {
            return false;
        };
        let Some(bounds) = widget.bounds() else {
            return false;
        };
        let (mx, my) = rect.midpoint();
        if !bounds.contains(mx, my) {
            tracing::debug!(text, "stale tooltip hint dropped");
            return false;
        }
        widget.show_tooltip(text);
        true
    }

    /// Hides and unbinds everything, as on document close.
    pub fn reset(&mut self) {
        if let Some(widget) = self.widget_mut() {
            widget.detach();
            widget.set_visible(false);
        }
        self.active = None;
        self.binding = EditorBinding::default();
        self.visible = false;
    }
}

impl fmt::Debug for OverlayAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayAdapter")
            .field("registry", &self.registry)
            .field("default_tag", &self.default_tag)
            .field("active", &self.active)
            .field("binding", &self.binding)
            .finish()
    }
}

/// Converts the device pixel geometry of a binding to CSS pixels.
fn adjust_binding(binding: &mut Value, ratio: f64) {
    let Some(obj) = binding.as_object_mut() else {
        return;
    };
    for key in ["x", "y", "w", "h"] {
        if let Some(v) = obj.get(key).and_then(Value::as_f64) {
            obj.insert(key.to_owned(), Value::from(v / ratio));
        }
    }
    obj.insert("ratio".to_owned(), Value::from(ratio));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct FakeWidget {
        log: Log,
        bounds: Option<CssRect>,
        reject: bool,
    }

    impl OverlayHost for FakeWidget {
        fn attach(&mut self, binding: &Value) -> Result<()> {
            if self.reject {
                anyhow::bail!("bad model");
            }
            self.log.borrow_mut().push(format!("attach {}", binding["x"]));
            Ok(())
        }
        fn configure(&mut self, mode: &EditMode) {
            self.log.borrow_mut().push(format!("configure {}", mode.tag()));
        }
        fn place(&mut self, rect: CssRect) {
            self.bounds = Some(rect);
            self.log
                .borrow_mut()
                .push(format!("place {} {} {} {}", rect.left, rect.top, rect.width, rect.height));
        }
        fn set_visible(&mut self, visible: bool) {
            self.log.borrow_mut().push(format!("visible {visible}"));
        }
        fn set_value(&mut self, value: &StartValue) {
            self.log.borrow_mut().push(format!("value {value:?}"));
        }
        fn align_text(&mut self, text_left: f64, baseline: f64) {
            self.log.borrow_mut().push(format!("align {text_left} {baseline}"));
        }
        fn focus(&mut self) {
            self.log.borrow_mut().push("focus".into());
        }
        fn update(&mut self, update: &EditorUpdate) {
            self.log.borrow_mut().push(format!("update {}", update.fields[0]));
        }
        fn detach(&mut self) {
            self.log.borrow_mut().push("detach".into());
        }
        fn bounds(&self) -> Option<CssRect> {
            self.bounds
        }
        fn show_tooltip(&mut self, text: &str) {
            self.log.borrow_mut().push(format!("tooltip {text}"));
        }
    }

    fn adapter(log: &Log, reject: bool) -> OverlayAdapter {
        let mut registry = WidgetRegistry::new();
        let log = log.clone();
        registry.register("text-widget", move || {
            Ok(Box::new(FakeWidget {
                log: log.clone(),
                bounds: None,
                reject,
            }) as Box<dyn OverlayHost>)
        });
        registry.register("broken-widget", || Err(anyhow!("module not found")));
        OverlayAdapter::new(registry, "text-widget")
    }

    #[test]
    fn attach_scales_binding_and_focuses() {
        let log = Log::default();
        let mut overlay = adapter(&log, false);
        overlay
            .attach(r#"{"x":40,"y":20,"w":100,"h":30}"#, 2.0)
            .unwrap();
        assert_eq!(overlay.active_tag(), Some("text-widget"));
        let payload = overlay.binding().payload.clone().unwrap();
        assert_eq!(payload["y"], 10.0);
        assert_eq!(payload["ratio"], 2.0);
        assert_eq!(
            *log.borrow(),
            vec!["attach 20.0", "visible true", "focus"]
        );
    }

    #[test]
    fn unknown_widget_leaves_nothing_bound() {
        let log = Log::default();
        let mut overlay = adapter(&log, false);
        overlay.attach(r#"{"x":1}"#, 1.0).unwrap();
        let err = overlay
            .attach(r#"{"binding":{"widget":{"tag":"broken-widget"}}}"#, 1.0)
            .unwrap_err();
        assert!(format!("{err:#}").contains("module not found"));
        assert_eq!(overlay.active_tag(), None);
        assert!(!overlay.is_visible());
        assert_eq!(overlay.binding(), &EditorBinding::default());
        assert!(overlay.attach("not json", 1.0).is_err());
    }

    #[test]
    fn rejected_binding_is_not_kept() {
        let log = Log::default();
        let mut overlay = adapter(&log, true);
        assert!(overlay.attach(r#"{"x":1}"#, 1.0).is_err());
        assert!(overlay.widget().is_none());
        assert_eq!(overlay.binding().payload, None);
    }

    #[test]
    fn prepare_start_and_finish() {
        let log = Log::default();
        let mut overlay = adapter(&log, false);
        overlay.attach("{}", 2.0).unwrap();
        overlay.configure(EditMode::Date { pattern: None });
        let css = overlay.prepare(DeviceRect::new(20.0, 40.0, 100.0, 30.0), 2.0);
        assert_eq!(css, CssRect::new(10.0, 20.0, 50.0, 15.0));
        overlay.start(
            &EditorStart {
                x: 24.0,
                baseline: 60.0,
                height: 30.0,
                band_id: 7,
                value: StartValue::Plain("2024-01-01".into()),
            },
            2.0,
        );
        assert_eq!(overlay.binding().band_id, Some(7));
        assert!(log.borrow().contains(&"align 12 30".to_string()));

        assert!(overlay.is_visible());
        overlay.finish();
        assert!(!overlay.is_visible());
        assert_eq!(overlay.binding(), &EditorBinding::default());
        assert_eq!(overlay.active_tag(), Some("text-widget"));
        assert_eq!(log.borrow().last().map(String::as_str), Some("detach"));
    }

    #[test]
    fn stale_hints_are_dropped() {
        let log = Log::default();
        let mut overlay = adapter(&log, false);
        overlay.attach("{}", 1.0).unwrap();
        overlay.prepare(DeviceRect::new(10.0, 10.0, 50.0, 20.0), 1.0);
        assert!(overlay.hint(CssRect::new(12.0, 12.0, 10.0, 10.0), "Required"));
        assert!(!overlay.hint(CssRect::new(200.0, 12.0, 10.0, 10.0), "Late"));
        assert!(log.borrow().contains(&"tooltip Required".to_string()));
        assert!(!log.borrow().iter().any(|l| l.contains("Late")));
    }
}
