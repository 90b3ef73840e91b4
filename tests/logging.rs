use std::{fs, thread::sleep, time::Duration};

use epaper_canvas::paper::editor::WidgetRegistry;
use epaper_canvas::paper::{DocumentOptions, RecordingSurface, ServerDocument};
use serial_test::serial;
use tempfile::tempdir;

#[test]
#[serial]
fn writes_log_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("replay.log");

    epaper_canvas::logging::init(true, Some(path.clone()));
    let mut doc = ServerDocument::new(
        RecordingSurface::new(0, 0),
        DocumentOptions::default(),
        WidgetRegistry::new(),
    );
    doc.paint("L1,x,2,2;");

    sleep(Duration::from_millis(100));

    assert!(path.exists(), "log file was not created");
    let contents = fs::read_to_string(path).unwrap();
    assert!(contents.contains("malformed paint command"));
}
