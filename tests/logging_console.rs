use epaper_canvas::paper::editor::WidgetRegistry;
use epaper_canvas::paper::{DocumentOptions, RecordingSurface, ServerDocument};
use serial_test::serial;
use tempfile::tempdir;

#[test]
#[serial]
fn console_only_logging_leaves_no_file() {
    let dir = tempdir().unwrap();
    let cwd = std::env::current_dir().unwrap();

    epaper_canvas::logging::init(false, None);
    let mut doc = ServerDocument::new(
        RecordingSurface::new(0, 0),
        DocumentOptions::default(),
        WidgetRegistry::new(),
    );
    doc.paint("R1,2;");

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert!(!cwd.join("replay.log").exists());
}
