use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use epaper_canvas::paper::editor::WidgetRegistry;
use epaper_canvas::paper::instruction::{EditMode, EditorUpdate, StartValue};
use epaper_canvas::paper::model::{CssRect, DeviceRect};
use epaper_canvas::paper::{
    ContextMenuEvent, Density, DocumentEvent, DocumentOptions, DrawCall, OverlayHost,
    RecordingSurface, ServerDocument, Viewport,
};
use serde_json::Value;

#[derive(Default)]
struct WidgetState {
    log: Vec<String>,
    placed: Option<CssRect>,
}

type Shared = Rc<RefCell<WidgetState>>;

struct FakeWidget(Shared);

impl OverlayHost for FakeWidget {
    fn attach(&mut self, binding: &Value) -> Result<()> {
        self.0
            .borrow_mut()
            .log
            .push(format!("attach {} {}", binding["x"], binding["ratio"]));
        Ok(())
    }
    fn configure(&mut self, mode: &EditMode) {
        self.0.borrow_mut().log.push(format!("configure {}", mode.tag()));
    }
    fn place(&mut self, rect: CssRect) {
        self.0.borrow_mut().placed = Some(rect);
    }
    fn set_visible(&mut self, visible: bool) {
        self.0.borrow_mut().log.push(format!("visible {visible}"));
    }
    fn set_value(&mut self, value: &StartValue) {
        if let StartValue::Plain(text) = value {
            self.0.borrow_mut().log.push(format!("value {text}"));
        }
    }
    fn align_text(&mut self, text_left: f64, baseline: f64) {
        self.0
            .borrow_mut()
            .log
            .push(format!("align {text_left} {baseline}"));
    }
    fn focus(&mut self) {
        self.0.borrow_mut().log.push("focus".into());
    }
    fn update(&mut self, _update: &EditorUpdate) {}
    fn detach(&mut self) {
        self.0.borrow_mut().log.push("detach".into());
    }
    fn bounds(&self) -> Option<CssRect> {
        self.0.borrow().placed
    }
    fn show_tooltip(&mut self, text: &str) {
        self.0.borrow_mut().log.push(format!("tooltip {text}"));
    }
}

fn document(state: &Shared) -> ServerDocument<RecordingSurface> {
    let mut registry = WidgetRegistry::new();
    let state = state.clone();
    registry.register("text-widget", move || {
        Ok(Box::new(FakeWidget(state.clone())) as Box<dyn OverlayHost>)
    });
    let options = DocumentOptions {
        density: Density {
            device_pixel_ratio: 2.0,
            backing_store_ratio: 1.0,
        },
        ..DocumentOptions::default()
    };
    let mut doc = ServerDocument::new(RecordingSurface::new(0, 0), options, registry);
    doc.set_editable(true);
    doc.surface_mut().take();
    doc
}

fn stroked(doc: &mut ServerDocument<RecordingSurface>) -> Vec<DeviceRect> {
    doc.surface_mut()
        .take()
        .into_iter()
        .filter_map(|c| match c {
            DrawCall::StrokeRect(r) => Some(r),
            _ => None,
        })
        .collect()
}

const BAND: DeviceRect = DeviceRect {
    x: 0.0,
    y: 100.0,
    width: 10.0,
    height: 10.0,
};
const OVERLAY: DeviceRect = DeviceRect {
    x: 5.0,
    y: 105.0,
    width: 3.0,
    height: 3.0,
};

#[test]
fn overlay_fragment_is_painted_over_all_bands() {
    let state = Shared::default();
    let mut doc = document(&state);
    doc.handle_message("D:Z;B2,DT,5,t,30,0,100;R0,100,10,10;");
    doc.handle_message(r#"D:ea{"x":40,"y":200,"w":100,"h":30};"#);
    doc.handle_message("D:ecd;ep20,100,100,30;R5,105,3,3;");

    // The remainder after `ep` waits for the next repaint.
    assert_eq!(stroked(&mut doc), vec![BAND]);
    assert!(doc.has_pending_overlay());
    assert_eq!(state.borrow().placed, Some(CssRect::new(10.0, 50.0, 50.0, 15.0)));

    doc.repaint_all();
    assert_eq!(stroked(&mut doc), vec![BAND, OVERLAY]);

    doc.handle_message("D:ef;");
    assert!(!doc.has_pending_overlay());
    doc.repaint_all();
    assert_eq!(stroked(&mut doc), vec![BAND]);
}

#[test]
fn binding_is_scaled_and_context_menu_follows_the_band() {
    let state = Shared::default();
    let mut doc = document(&state);
    doc.handle_message("D:Z;B2,DT,5,t,30,0,100;");
    doc.handle_message(r#"D:ea{"x":40,"y":200,"w":100,"h":30};"#);
    doc.handle_message("D:ecd;ep20,100,100,30;");

    let events = doc.take_events();
    assert!(events.contains(&DocumentEvent::ContextMenu(ContextMenuEvent::Shown {
        band_id: 5,
        anchor: (595.0, 45.5),
    })));
    assert_eq!(doc.context_menu_band().map(|b| b.id), Some(5));
    assert_eq!(
        state.borrow().log[..3],
        ["attach 20.0 2.0", "visible true", "focus"]
    );
    assert!(state.borrow().log.contains(&"configure d".to_string()));

    doc.paint("Zd;");
    assert_eq!(
        doc.take_events(),
        vec![DocumentEvent::ContextMenu(ContextMenuEvent::Hidden)]
    );
    assert!(doc.context_menu_band().is_none());
}

#[test]
fn start_scrolls_the_overlay_into_view() {
    let state = Shared::default();
    let mut doc = document(&state);
    doc.set_viewport(Some(Viewport {
        left: 0.0,
        top: 0.0,
        right: 400.0,
        bottom: 60.0,
    }));
    doc.handle_message(r#"D:ea{"x":40,"y":200,"w":100,"h":30};"#);
    doc.handle_message("D:ep20,100,100,30;");
    doc.handle_message("D:es24,130,30,5,4,2024;");

    let log = state.borrow().log.clone();
    assert!(log.contains(&"value 2024".to_string()));
    assert!(log.contains(&"align 12 65".to_string()));
    assert_eq!(doc.overlay().binding().band_id, Some(5));
    assert!(doc
        .take_events()
        .contains(&DocumentEvent::ScrollBy { dx: 0.0, dy: 5.0 }));
}

#[test]
fn tooltip_hints_inside_the_widget_are_shown() {
    let state = Shared::default();
    let mut doc = document(&state);
    doc.handle_message(r#"D:ea{};"#);
    doc.handle_message("D:ep20,100,100,30;");
    doc.handle_message("D:eh30,110,10,10,8,Required;");
    doc.handle_message("D:eh900,110,10,10,4,Late;");
    let log = state.borrow().log.clone();
    assert!(log.contains(&"tooltip Required".to_string()));
    assert!(!log.iter().any(|l| l.contains("Late")));
}

#[test]
fn pointer_is_ignored_while_the_editor_is_open() {
    let state = Shared::default();
    let mut doc = document(&state);
    doc.handle_message("D:Z;B2,DT,5,t,30,0,100;B2,DT,6,t,30,0,200;");
    doc.handle_message(r#"D:ea{"x":40,"y":200,"w":100,"h":30};"#);
    doc.handle_message("D:ecd;ep20,100,100,30;");
    doc.take_events();
    assert!(doc.overlay().is_visible());

    // CSS 105 is device 210 at ratio 2, inside band 6.
    doc.pointer_moved(0.0, 105.0);
    assert!(doc.take_events().is_empty());
    assert_eq!(doc.context_menu_band().map(|b| b.id), Some(5));

    doc.handle_message("D:ef;");
    assert!(!doc.overlay().is_visible());
    doc.pointer_moved(0.0, 105.0);
    assert_eq!(doc.context_menu_band().map(|b| b.id), Some(6));
}
