use anyhow::{anyhow, bail, Context, Result};
use base64::Engine as _;
use image::RgbaImage;
use reqwest::blocking::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use crate::paper::model::DeviceRect;

pub type Bitmap = Arc<RgbaImage>;

/// How an image is fitted into its box (`CL`, `FF`, `RS`, `RH`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Draw at natural size, cropping what doesn't fit.
    #[default]
    Clip,
    /// Stretch both axes to the box.
    FillFrame,
    /// Uniform scale so the whole image fits.
    RetainShape,
    /// Scale to the box height; wide images are capped by the box width.
    RealHeight,
}

impl FitMode {
    pub fn from_code(code: &str) -> Self {
        match code {
            "FF" => Self::FillFrame,
            "RS" => Self::RetainShape,
            "RH" => Self::RealHeight,
            _ => Self::Clip,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HAnchor {
    #[default]
    Left,
    Center,
    Right,
}

impl HAnchor {
    pub fn from_code(code: &str) -> Self {
        match code {
            "C" => Self::Center,
            "R" => Self::Right,
            _ => Self::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VAnchor {
    #[default]
    Top,
    Middle,
    Bottom,
}

impl VAnchor {
    pub fn from_code(code: &str) -> Self {
        match code {
            "M" => Self::Middle,
            "B" => Self::Bottom,
            _ => Self::Top,
        }
    }
}

/// Operands of an `I` command. The box is given as edges, in device units.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlacement {
    pub id: i64,
    pub path: String,
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub fit: FitMode,
    pub h_anchor: HAnchor,
    pub v_anchor: VAnchor,
}

/// Source crop and destination rect for one image draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageFit {
    pub src: DeviceRect,
    pub dst: DeviceRect,
}

pub fn fit_image(placement: &ImagePlacement, natural_width: f64, natural_height: f64) -> ImageFit {
    let max_w = placement.right - placement.left;
    let max_h = placement.bottom - placement.top;
    let (nw, nh) = (natural_width, natural_height);

    let (draw_w, draw_h) = match placement.fit {
        FitMode::Clip => (max_w.min(nw), max_h.min(nh)),
        FitMode::FillFrame => (max_w, max_h),
        FitMode::RetainShape => {
            let f = (max_w / nw).min(max_h / nh);
            ((nw * f).min(max_w), (nh * f).min(max_h))
        }
        FitMode::RealHeight => {
            let (fx, fy) = if nw <= max_w && nh <= max_h {
                let f = (max_w / nw).min(max_h / nh);
                (f, f)
            } else if nw > nh {
                let fx = max_w / nw;
                (fx, (max_h / nh).min(fx))
            } else {
                let fy = max_h / nh;
                ((max_w / nw).min(fy), fy)
            };
            (nw * fx, nh * fy)
        }
    };

    let x = match placement.h_anchor {
        HAnchor::Left => placement.left,
        HAnchor::Center => placement.left + (max_w - draw_w) / 2.0,
        HAnchor::Right => placement.right - draw_w,
    };
    let y = match placement.v_anchor {
        VAnchor::Top => placement.top,
        VAnchor::Middle => placement.top + (max_h - draw_h) / 2.0,
        VAnchor::Bottom => placement.bottom - draw_h,
    };

    let src = if placement.fit == FitMode::Clip {
        // Cropping keeps the anchored side of the image visible.
        let sx = match placement.h_anchor {
            HAnchor::Left => 0.0,
            HAnchor::Center => (nw - draw_w) / 2.0,
            HAnchor::Right => nw - draw_w,
        };
        let sy = match placement.v_anchor {
            VAnchor::Top => 0.0,
            VAnchor::Middle => (nh - draw_h) / 2.0,
            VAnchor::Bottom => nh - draw_h,
        };
        DeviceRect::new(sx, sy, draw_w, draw_h)
    } else {
        DeviceRect::new(0.0, 0.0, nw, nh)
    };

    ImageFit {
        src,
        dst: DeviceRect::new(x, y, draw_w, draw_h),
    }
}

#[derive(Debug, Clone)]
pub enum ImageEntry {
    Pending,
    Ready(Bitmap),
    /// Failed once; never fetched again.
    Broken,
}

/// Image cache keyed by asset path.
#[derive(Debug, Default)]
pub struct ImageCache {
    entries: HashMap<String, ImageEntry>,
}

impl ImageCache {
    pub fn get(&self, path: &str) -> Option<&ImageEntry> {
        self.entries.get(path)
    }

    /// Returns `true` when `path` was unknown and a fetch should be started.
    pub fn begin_fetch(&mut self, path: &str) -> bool {
        if self.entries.contains_key(path) {
            return false;
        }
        self.entries.insert(path.to_owned(), ImageEntry::Pending);
        true
    }

    /// Records a finished fetch. Returns `true` if the image became drawable.
    ///
    /// Loads for paths that are not pending are dropped.
    pub fn complete(&mut self, path: &str, result: Result<RgbaImage>) -> bool {
        if !matches!(self.entries.get(path), Some(ImageEntry::Pending)) {
            tracing::debug!(path, "dropping unrequested image load");
            return false;
        }
        match result {
            Ok(image) if image.width() > 0 && image.height() > 0 => {
                self.entries
                    .insert(path.to_owned(), ImageEntry::Ready(Arc::new(image)));
                true
            }
            Ok(_) => {
                tracing::warn!(path, "image has no pixels");
                self.entries.insert(path.to_owned(), ImageEntry::Broken);
                false
            }
            Err(err) => {
                tracing::warn!(path, error = %err, "image load failed");
                self.entries.insert(path.to_owned(), ImageEntry::Broken);
                false
            }
        }
    }

    pub fn ready(&self, path: &str) -> Option<Bitmap> {
        match self.entries.get(path) {
            Some(ImageEntry::Ready(bitmap)) => Some(bitmap.clone()),
            _ => None,
        }
    }

    /// Fetches started but not yet completed.
    pub fn pending(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| matches!(entry, ImageEntry::Pending))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// A finished asset fetch.
#[derive(Debug)]
pub struct ImageLoad {
    pub path: String,
    pub result: Result<RgbaImage>,
}

/// Fetches image assets without blocking the caller.
///
/// `request` starts a fetch; completions are collected with `poll`, which the
/// document calls from its tick.
pub trait ImageLoader {
    fn request(&mut self, path: &str);
    fn poll(&mut self) -> Vec<ImageLoad>;
    /// The document was dropped; loads still in flight must not be reported.
    fn reset(&mut self) {}
}

/// Loader for hosts that never draw images.
#[derive(Debug, Default)]
pub struct NoImages;

impl ImageLoader for NoImages {
    fn request(&mut self, path: &str) {
        tracing::debug!(path, "image loading disabled");
    }

    fn poll(&mut self) -> Vec<ImageLoad> {
        Vec::new()
    }
}

const LOADER_THREADS: usize = 4;

struct FetchJob {
    path: String,
    url: Option<Result<Url>>,
    generation: u64,
}

struct Fetched {
    generation: u64,
    load: ImageLoad,
}

/// Fetches assets over HTTP (or from disk for `file:` bases) on a small
/// fixed pool of worker threads fed through a request queue.
///
/// Every request is tagged with the loader generation; `reset` bumps it so
/// queued and in-flight fetches for the previous document are discarded.
pub struct HttpImageLoader {
    base: Option<Url>,
    jobs: Sender<FetchJob>,
    done: Receiver<Fetched>,
    generation: Arc<AtomicU64>,
    failed: Vec<ImageLoad>,
}

impl HttpImageLoader {
    pub fn new(assets_url: Option<&str>) -> Result<Self> {
        let base = assets_url
            .map(|url| Url::parse(url).with_context(|| format!("invalid assets url {url}")))
            .transpose()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("epaper-canvas image loader")
            .build()?;
        let (jobs, queue) = mpsc::channel::<FetchJob>();
        let (done_tx, done) = mpsc::channel();
        let queue = Arc::new(Mutex::new(queue));
        let generation = Arc::new(AtomicU64::new(0));
        for index in 0..LOADER_THREADS {
            let client = client.clone();
            let queue = Arc::clone(&queue);
            let done_tx = done_tx.clone();
            let generation = Arc::clone(&generation);
            std::thread::Builder::new()
                .name(format!("image-loader-{index}"))
                .spawn(move || fetch_worker(client, queue, done_tx, generation))
                .context("spawn image loader thread")?;
        }
        Ok(Self {
            base,
            jobs,
            done,
            generation,
            failed: Vec::new(),
        })
    }

    pub fn resolve(&self, path: &str) -> Result<Url> {
        match &self.base {
            Some(base) => base
                .join(path)
                .with_context(|| format!("cannot join {path} to {base}")),
            None => Url::parse(path).with_context(|| format!("relative image path {path} without assets url")),
        }
    }
}

impl ImageLoader for HttpImageLoader {
    fn request(&mut self, path: &str) {
        let url = if path.starts_with("data:") {
            None
        } else {
            Some(self.resolve(path))
        };
        let job = FetchJob {
            path: path.to_owned(),
            url,
            generation: self.generation.load(Ordering::Acquire),
        };
        if let Err(mpsc::SendError(job)) = self.jobs.send(job) {
            self.failed.push(ImageLoad {
                path: job.path,
                result: Err(anyhow!("image loader threads have stopped")),
            });
        }
    }

    fn poll(&mut self) -> Vec<ImageLoad> {
        let current = self.generation.load(Ordering::Acquire);
        let mut loads = std::mem::take(&mut self.failed);
        loads.extend(
            self.done
                .try_iter()
                .filter(|fetched| fetched.generation == current)
                .map(|fetched| fetched.load),
        );
        loads
    }

    fn reset(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.failed.clear();
        // Anything already finished belongs to the old generation.
        self.done.try_iter().for_each(drop);
    }
}

fn fetch_worker(
    client: Client,
    queue: Arc<Mutex<Receiver<FetchJob>>>,
    done: Sender<Fetched>,
    generation: Arc<AtomicU64>,
) {
    loop {
        let job = match queue.lock() {
            Ok(queue) => queue.recv(),
            Err(_) => return,
        };
        let Ok(job) = job else {
            tracing::debug!("image loader queue closed");
            return;
        };
        if job.generation != generation.load(Ordering::Acquire) {
            tracing::trace!(path = job.path.as_str(), "skipping stale image request");
            continue;
        }
        let result = match job.url {
            None => decode_data_uri(&job.path),
            Some(Ok(url)) => fetch(&client, &url),
            Some(Err(err)) => Err(err),
        };
        let fetched = Fetched {
            generation: job.generation,
            load: ImageLoad {
                path: job.path,
                result,
            },
        };
        if done.send(fetched).is_err() {
            return;
        }
    }
}

fn fetch(client: &Client, url: &Url) -> Result<RgbaImage> {
    let bytes = if url.scheme() == "file" {
        let path = url
            .to_file_path()
            .map_err(|_| anyhow!("bad file url {url}"))?;
        std::fs::read(&path).with_context(|| format!("read {}", path.display()))?
    } else {
        let resp = client
            .get(url.clone())
            .send()
            .with_context(|| format!("GET {url}"))?;
        if !resp.status().is_success() {
            bail!("GET {url} returned {}", resp.status());
        }
        resp.bytes()?.to_vec()
    };
    decode_bitmap(&bytes)
}

/// Decodes `data:<mime>;base64,<payload>` URIs.
pub fn decode_data_uri(uri: &str) -> Result<RgbaImage> {
    let (header, payload) = uri
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| anyhow!("malformed data uri"))?;
    if !header.ends_with(";base64") {
        bail!("only base64 data uris are supported");
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .context("invalid base64 in data uri")?;
    decode_bitmap(&bytes)
}

fn decode_bitmap(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory(bytes)
        .context("decode image")?
        .to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(fit: FitMode, h: HAnchor, v: VAnchor) -> ImagePlacement {
        ImagePlacement {
            id: 1,
            path: "a.png".into(),
            top: 0.0,
            left: 0.0,
            bottom: 100.0,
            right: 200.0,
            fit,
            h_anchor: h,
            v_anchor: v,
        }
    }

    #[test]
    fn retain_shape_centers_within_box() {
        let fit = fit_image(
            &placement(FitMode::RetainShape, HAnchor::Center, VAnchor::Middle),
            50.0,
            50.0,
        );
        assert_eq!(fit.dst, DeviceRect::new(50.0, 0.0, 100.0, 100.0));
        assert_eq!(fit.src, DeviceRect::new(0.0, 0.0, 50.0, 50.0));
    }

    #[test]
    fn fill_frame_stretches() {
        let fit = fit_image(
            &placement(FitMode::FillFrame, HAnchor::Right, VAnchor::Bottom),
            10.0,
            30.0,
        );
        assert_eq!(fit.dst, DeviceRect::new(0.0, 0.0, 200.0, 100.0));
    }

    #[test]
    fn clip_crops_on_anchored_side() {
        let fit = fit_image(
            &placement(FitMode::Clip, HAnchor::Right, VAnchor::Bottom),
            300.0,
            40.0,
        );
        assert_eq!(fit.dst, DeviceRect::new(0.0, 60.0, 200.0, 40.0));
        assert_eq!(fit.src, DeviceRect::new(100.0, 0.0, 200.0, 40.0));
    }

    #[test]
    fn real_height_caps_wide_images_by_width() {
        let fit = fit_image(
            &placement(FitMode::RealHeight, HAnchor::Left, VAnchor::Top),
            400.0,
            100.0,
        );
        assert_eq!(fit.dst.width, 200.0);
        assert_eq!(fit.dst.height, 50.0);
    }

    #[test]
    fn cache_marks_failures_broken() {
        let mut cache = ImageCache::default();
        assert!(cache.begin_fetch("x.png"));
        assert!(!cache.begin_fetch("x.png"));
        assert!(!cache.complete("x.png", Err(anyhow!("404"))));
        assert!(matches!(cache.get("x.png"), Some(ImageEntry::Broken)));
        assert!(!cache.begin_fetch("x.png"));
    }

    fn png_data_uri() -> String {
        let mut png = Vec::new();
        let img = RgbaImage::from_pixel(2, 3, image::Rgba([1, 2, 3, 255]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageOutputFormat::Png)
            .unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        )
    }

    fn wait_for_loads(loader: &mut HttpImageLoader, count: usize) -> Vec<ImageLoad> {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut loads = Vec::new();
        while loads.len() < count && std::time::Instant::now() < deadline {
            loads.extend(loader.poll());
            std::thread::sleep(Duration::from_millis(10));
        }
        loads
    }

    #[test]
    fn cache_ignores_loads_it_did_not_request() {
        let mut cache = ImageCache::default();
        assert!(!cache.complete("late.png", Ok(RgbaImage::new(1, 1))));
        assert!(cache.get("late.png").is_none());
    }

    #[test]
    fn worker_pool_serves_many_requests() {
        let mut loader = HttpImageLoader::new(None).unwrap();
        let uri = png_data_uri();
        for _ in 0..50 {
            loader.request(&uri);
        }
        let loads = wait_for_loads(&mut loader, 50);
        assert_eq!(loads.len(), 50);
        assert!(loads.iter().all(|load| load.result.is_ok()));
    }

    #[test]
    fn reset_discards_loads_in_flight() {
        let mut loader = HttpImageLoader::new(None).unwrap();
        let uri = png_data_uri();
        loader.request(&uri);
        loader.request("relative.png");
        loader.reset();
        std::thread::sleep(Duration::from_millis(200));
        assert!(loader.poll().is_empty());

        loader.request(&uri);
        let loads = wait_for_loads(&mut loader, 1);
        assert_eq!(loads.len(), 1);
        assert!(loads[0].result.is_ok());
    }

    #[test]
    fn decodes_png_data_uri() {
        let uri = png_data_uri();
        let decoded = decode_data_uri(&uri).unwrap();
        assert_eq!(decoded.dimensions(), (2, 3));
        assert!(decode_data_uri("data:text/plain,hello").is_err());
    }

    #[test]
    fn resolves_paths_against_assets_url() {
        let loader = HttpImageLoader::new(Some("https://assets.example.com/public/")).unwrap();
        assert_eq!(
            loader.resolve("img/logo.png").unwrap().as_str(),
            "https://assets.example.com/public/img/logo.png"
        );
        let bare = HttpImageLoader::new(None).unwrap();
        assert!(bare.resolve("img/logo.png").is_err());
    }
}
