use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use epaper_canvas::logging;
use epaper_canvas::paper::editor::WidgetRegistry;
use epaper_canvas::paper::{
    DocumentEvent, DocumentOptions, HttpImageLoader, RasterSurface, ServerDocument,
};
use epaper_canvas::settings::Settings;

const USAGE: &str = "usage: epaper-replay <stream> <out.png> [--ratio N] [--zoom Z] [--settings FILE] [--log FILE]";
const IMAGE_WAIT: Duration = Duration::from_secs(10);

struct Args {
    stream: PathBuf,
    output: PathBuf,
    ratio: Option<f64>,
    zoom: Option<f64>,
    settings: String,
    log: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut positional = Vec::new();
    let mut ratio = None;
    let mut zoom = None;
    let mut settings = "settings.json".to_string();
    let mut log = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = || args.next().with_context(|| format!("{arg} needs a value"));
        match arg.as_str() {
            "--ratio" => ratio = Some(value()?.parse().context("invalid --ratio")?),
            "--zoom" => zoom = Some(value()?.parse().context("invalid --zoom")?),
            "--settings" => settings = value()?,
            "--log" => log = Some(PathBuf::from(value()?)),
            "-h" | "--help" => bail!(USAGE),
            _ => positional.push(PathBuf::from(&arg)),
        }
    }
    let [stream, output]: [PathBuf; 2] = positional
        .try_into()
        .map_err(|_| anyhow::anyhow!(USAGE))?;
    Ok(Args {
        stream,
        output,
        ratio,
        zoom,
        settings,
        log,
    })
}

fn main() -> anyhow::Result<()> {
    let args = parse_args()?;
    let mut settings = Settings::load(&args.settings)?;
    if let Some(zoom) = args.zoom {
        settings.zoom = zoom;
    }
    logging::init(settings.debug_logging, args.log.clone());

    let options = DocumentOptions::from_settings(&settings, args.ratio.unwrap_or(1.0));
    let surface = RasterSurface::new(1, 1).with_backdrop(options.background);
    let mut document = ServerDocument::new(surface, options, WidgetRegistry::new());
    if let Some(url) = settings.public_assets_url.as_deref() {
        document = document.with_image_loader(Box::new(HttpImageLoader::new(Some(url))?));
    }

    let stream = std::fs::read_to_string(&args.stream)
        .with_context(|| format!("cannot read {}", args.stream.display()))?;
    let mut messages = 0usize;
    for line in stream.lines().filter(|l| !l.trim().is_empty()) {
        if line.starts_with("D:") || line.starts_with("n:") {
            document.handle_message(line);
        } else {
            document.paint(line);
        }
        messages += 1;
    }

    let deadline = Instant::now() + IMAGE_WAIT;
    while document.images().pending() > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
        document.tick(Instant::now());
    }
    if document.images().pending() > 0 {
        tracing::warn!(pending = document.images().pending(), "gave up waiting for images");
    }
    document.repaint_all();

    for event in document.take_events() {
        match event {
            DocumentEvent::LoadError(err) | DocumentEvent::BindingError(err) => {
                tracing::warn!(error = %err, "document error")
            }
            other => tracing::debug!(event = ?other, "document event"),
        }
    }

    let bands = document.bands().len();
    let image = document.into_surface().into_image();
    image
        .save(&args.output)
        .with_context(|| format!("cannot write {}", args.output.display()))?;
    tracing::info!(
        messages,
        bands,
        width = image.width(),
        height = image.height(),
        output = %args.output.display(),
        "replay written"
    );
    Ok(())
}
