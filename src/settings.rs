use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// Page width in document units used until the server reports one.
    #[serde(default = "default_page_width")]
    pub page_width: f64,
    #[serde(default = "default_page_height")]
    pub page_height: f64,
    /// Hex color (`#RRGGBB`) painted when the page is cleared.
    #[serde(default = "default_background")]
    pub background_color: String,
    #[serde(default = "default_zoom")]
    pub zoom: f64,
    /// Forces a device pixel ratio instead of the one reported by the host.
    #[serde(default)]
    pub device_pixel_ratio: Option<f64>,
    /// Quiet period after the last image load before the page is repainted.
    #[serde(default = "default_redraw_debounce_ms")]
    pub redraw_debounce_ms: u64,
    /// Base URL joined with image paths found in `I` commands.
    #[serde(default)]
    pub public_assets_url: Option<String>,
    /// Widget used by `ea` bindings that don't name one.
    #[serde(default = "default_widget_tag")]
    pub default_widget_tag: String,
    /// When enabled the logger is initialised at debug level.
    #[serde(default)]
    pub debug_logging: bool,
}

fn default_page_width() -> f64 {
    595.0
}

fn default_page_height() -> f64 {
    842.0
}

fn default_background() -> String {
    "#FFFFFF".into()
}

fn default_zoom() -> f64 {
    1.0
}

fn default_redraw_debounce_ms() -> u64 {
    300
}

fn default_widget_tag() -> String {
    "text-widget".into()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page_width: default_page_width(),
            page_height: default_page_height(),
            background_color: default_background(),
            zoom: default_zoom(),
            device_pixel_ratio: None,
            redraw_debounce_ms: default_redraw_debounce_ms(),
            public_assets_url: None,
            default_widget_tag: default_widget_tag(),
            debug_logging: false,
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut settings: Self = serde_json::from_str(&content)?;
        settings.sanitize();
        Ok(settings)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn redraw_debounce(&self) -> Duration {
        Duration::from_millis(self.redraw_debounce_ms)
    }

    fn sanitize(&mut self) {
        if !(self.zoom.is_finite() && self.zoom > 0.0) {
            tracing::warn!(zoom = self.zoom, "invalid zoom in settings, using 1.0");
            self.zoom = default_zoom();
        }
        if !(self.page_width.is_finite() && self.page_width > 0.0) {
            tracing::warn!(width = self.page_width, "invalid page width in settings");
            self.page_width = default_page_width();
        }
        if !(self.page_height.is_finite() && self.page_height > 0.0) {
            tracing::warn!(height = self.page_height, "invalid page height in settings");
            self.page_height = default_page_height();
        }
    }
}
