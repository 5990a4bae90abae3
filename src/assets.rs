use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use image::ImageReader;
use tiny_skia::Pixmap;

use crate::error::{EngineError, Result};
use crate::render::canvas::pixmap_from_rgba;

/// Resolves a source identifier (path or URL) into pixels. Runs on a worker thread.
pub trait ImageLoader: Send + Sync {
    fn load(&self, source: &str) -> Result<Pixmap>;
}

/// Decodes local files with `image`, fetches `http(s)` sources with `reqwest`.
pub struct FileImageLoader;

impl ImageLoader for FileImageLoader {
    fn load(&self, source: &str) -> Result<Pixmap> {
        let decoded = if source.starts_with("http://") || source.starts_with("https://") {
            let bytes = reqwest::blocking::get(source)
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.bytes())
                .map_err(|e| EngineError::asset(source, e))?;
            image::load_from_memory(&bytes).map_err(|e| EngineError::asset(source, e))?
        } else {
            let path = Path::new(source);
            if !path.exists() {
                return Err(EngineError::NotFound(path.to_path_buf()));
            }
            ImageReader::open(path)?
                .with_guessed_format()?
                .decode()
                .map_err(|e| EngineError::asset(source, e))?
        };
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        pixmap_from_rgba(width, height, rgba.into_raw()).map_err(|e| EngineError::asset(source, e))
    }
}

#[derive(Clone, Debug)]
pub enum AssetState {
    Pending,
    Ready(Arc<Pixmap>),
    Failed(String),
}

type Loaded = (String, Result<Pixmap>);

/// Decoded image cache shared by renderers and overlays.
///
/// Each source is loaded at most once. Loads run on worker threads and are
/// merged in by [`AssetCache::poll`] between ticks; the entry map is replaced
/// copy-on-write so a render holding a snapshot never sees a partial update.
pub struct AssetCache {
    entries: Arc<HashMap<String, AssetState>>,
    loader: Arc<dyn ImageLoader>,
    tx: Sender<Loaded>,
    rx: Receiver<Loaded>,
    in_flight: usize,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::with_loader(Arc::new(FileImageLoader))
    }

    pub fn with_loader(loader: Arc<dyn ImageLoader>) -> Self {
        let (tx, rx) = channel();
        Self {
            entries: Arc::new(HashMap::new()),
            loader,
            tx,
            rx,
            in_flight: 0,
        }
    }

    /// Start loading `source` unless it is already known. Never blocks.
    pub fn request(&mut self, source: &str) {
        if source.is_empty() || self.entries.contains_key(source) {
            return;
        }
        Arc::make_mut(&mut self.entries).insert(source.to_string(), AssetState::Pending);
        self.in_flight += 1;

        let loader = Arc::clone(&self.loader);
        let tx = self.tx.clone();
        let id = source.to_string();
        std::thread::spawn(move || {
            let result = loader.load(&id);
            // Receiver gone means the cache was torn down.
            let _ = tx.send((id, result));
        });
    }

    /// Merge finished loads. Returns how many entries changed.
    pub fn poll(&mut self) -> usize {
        let mut changed = 0;
        while let Ok((id, result)) = self.rx.try_recv() {
            self.merge(id, result);
            changed += 1;
        }
        changed
    }

    /// Block until every requested load has resolved. Used before a render
    /// starts so the first frames already carry their images.
    pub fn wait_all(&mut self) {
        while self.in_flight > 0 {
            match self.rx.recv() {
                Ok((id, result)) => self.merge(id, result),
                Err(_) => break,
            }
        }
    }

    fn merge(&mut self, id: String, result: Result<Pixmap>) {
        let state = match result {
            Ok(pixmap) => {
                log::debug!("Asset ready: {} ({}x{})", id, pixmap.width(), pixmap.height());
                AssetState::Ready(Arc::new(pixmap))
            }
            Err(err) => {
                log::warn!("{}", err);
                AssetState::Failed(err.to_string())
            }
        };
        Arc::make_mut(&mut self.entries).insert(id, state);
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub fn insert(&mut self, source: &str, pixmap: Pixmap) {
        Arc::make_mut(&mut self.entries)
            .insert(source.to_string(), AssetState::Ready(Arc::new(pixmap)));
    }

    pub fn state(&self, source: &str) -> Option<&AssetState> {
        self.entries.get(source)
    }

    /// The decoded image, or `None` while pending, failed or never requested.
    pub fn get(&self, source: &str) -> Option<&Arc<Pixmap>> {
        match self.entries.get(source) {
            Some(AssetState::Ready(pixmap)) => Some(pixmap),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, AssetState>> {
        Arc::clone(&self.entries)
    }

    pub fn pending(&self) -> usize {
        self.in_flight
    }
}

impl Default for AssetCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        calls: AtomicUsize,
    }

    impl ImageLoader for CountingLoader {
        fn load(&self, source: &str) -> Result<Pixmap> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if source == "broken" {
                return Err(EngineError::asset(source, "bad header"));
            }
            Pixmap::new(4, 2).ok_or_else(|| EngineError::asset(source, "alloc"))
        }
    }

    #[test]
    fn loads_once_and_resolves_after_poll() {
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
        });
        let mut cache = AssetCache::with_loader(loader.clone());
        cache.request("cover.png");
        cache.request("cover.png");
        assert!(matches!(cache.state("cover.png"), Some(AssetState::Pending)));
        assert!(cache.get("cover.png").is_none());

        cache.wait_all();
        assert_eq!(cache.get("cover.png").map(|p| p.width()), Some(4));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failures_are_recorded_not_retried() {
        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
        });
        let mut cache = AssetCache::with_loader(loader.clone());
        cache.request("broken");
        cache.wait_all();
        assert!(matches!(cache.state("broken"), Some(AssetState::Failed(_))));
        cache.request("broken");
        assert_eq!(cache.pending(), 0);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn snapshots_survive_updates() {
        let mut cache = AssetCache::with_loader(Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
        }));
        let before = cache.snapshot();
        cache.insert("a", Pixmap::new(1, 1).unwrap());
        assert!(before.is_empty());
        assert!(cache.get("a").is_some());
    }

    #[test]
    fn file_loader_reports_missing_files() {
        let err = FileImageLoader.load("/nonexistent/cover.png").unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn file_loader_decodes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dot.png");
        image::RgbaImage::from_pixel(3, 2, image::Rgba([255, 0, 0, 255]))
            .save(&path)
            .unwrap();
        let pixmap = FileImageLoader.load(path.to_str().unwrap()).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (3, 2));
    }
}
