use epaper_canvas::paper::model::Color;
use epaper_canvas::paper::DocumentOptions;
use epaper_canvas::settings::Settings;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn missing_file_gives_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let settings = Settings::load(path.to_str().unwrap()).unwrap();
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.redraw_debounce(), Duration::from_millis(300));
}

#[test]
fn save_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let path = path.to_str().unwrap();
    let settings = Settings {
        zoom: 1.5,
        public_assets_url: Some("https://assets.example.com/".into()),
        debug_logging: true,
        ..Settings::default()
    };
    settings.save(path).unwrap();
    assert_eq!(Settings::load(path).unwrap(), settings);
}

#[test]
fn partial_file_is_completed_and_sanitized() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r##"{"zoom": -2, "background_color": "#abc"}"##).unwrap();
    let settings = Settings::load(path.to_str().unwrap()).unwrap();
    assert_eq!(settings.zoom, 1.0);
    assert_eq!(settings.page_width, 595.0);

    let options = DocumentOptions::from_settings(&settings, 2.0);
    assert_eq!(options.background, Color::rgb(0xAA, 0xBB, 0xCC));
    assert_eq!(options.density.device_pixel_ratio, 2.0);
}

#[test]
fn forced_ratio_wins_over_host() {
    let settings = Settings {
        device_pixel_ratio: Some(1.0),
        background_color: "nope".into(),
        ..Settings::default()
    };
    let options = DocumentOptions::from_settings(&settings, 2.0);
    assert_eq!(options.density.device_pixel_ratio, 1.0);
    assert_eq!(options.background, Color::WHITE);
}

#[test]
fn malformed_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(Settings::load(path.to_str().unwrap()).is_err());
}
