//! Reader registry: file extension -> reader factory
//!
//! **Why**: The player opens paths, not reader types. The registry picks the
//! backend from the extension, with an optional `*` reader as fallback.
//!
//! One registry is built at startup by the composition root and passed by
//! reference to whoever resolves readers. Registration is explicit: each
//! backend is added with `register`, or all built-in ones at once with
//! `with_default_readers`.

use indexmap::IndexMap;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::core::event_bus::EventBus;
use crate::core::reader::VideoReader;

/// Extension key matching any file.
pub const WILDCARD: &str = "*";

/// Zero-argument constructor of a reader.
pub type ReaderFactory = fn() -> Box<dyn VideoReader>;

/// Request to load a file into a player slot. Emitted by `load_video`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoLoadAsked {
    pub path: PathBuf,
    /// Target screen/player index, -1 lets the UI decide.
    pub target: i32,
}

#[derive(Clone)]
struct Registration {
    name: &'static str,
    factory: ReaderFactory,
}

/// Extension table plus the bus load requests go through.
#[derive(Clone, Default)]
pub struct VideoTypeManager {
    readers: IndexMap<String, Registration>,
    events: EventBus,
}

impl std::fmt::Debug for VideoTypeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.readers.iter().map(|(ext, reg)| (ext, reg.name)))
            .finish()
    }
}

/// `"AVI"`, `".avi"` -> `".avi"`. The wildcard is kept as is.
pub fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim();
    if trimmed == WILDCARD {
        return WILDCARD.to_string();
    }
    let lower = trimmed.trim_start_matches('.').to_lowercase();
    format!(".{}", lower)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(normalize_extension)
}

impl VideoTypeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with one shared bus, for applications that already own one.
    pub fn with_event_bus(events: EventBus) -> Self {
        Self {
            readers: IndexMap::new(),
            events,
        }
    }

    /// Registry holding every built-in backend.
    pub fn with_default_readers() -> Self {
        let mut manager = Self::new();
        crate::readers::register_defaults(&mut manager);
        manager
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Map `extension` to a reader. The first registration of an extension
    /// wins; later ones are ignored and return false.
    pub fn register(&mut self, extension: &str, name: &'static str, factory: ReaderFactory) -> bool {
        let key = normalize_extension(extension);
        if key == "." {
            warn!("Ignoring reader {} registered without extension", name);
            return false;
        }
        if let Some(existing) = self.readers.get(&key) {
            debug!("{} already handled by {}, ignoring {}", key, existing.name, name);
            return false;
        }
        debug!("Registered {} for {}", name, key);
        self.readers.insert(key, Registration { name, factory });
        true
    }

    /// New reader for `extension`: exact match first, then the wildcard.
    pub fn get_reader(&self, extension: &str) -> Option<Box<dyn VideoReader>> {
        self.resolve(extension).map(|reg| (reg.factory)())
    }

    /// Name of the reader `get_reader` would build.
    pub fn reader_name(&self, extension: &str) -> Option<&'static str> {
        self.resolve(extension).map(|reg| reg.name)
    }

    fn resolve(&self, extension: &str) -> Option<&Registration> {
        self.readers
            .get(&normalize_extension(extension))
            .or_else(|| self.readers.get(WILDCARD))
    }

    /// New reader for a path, from its extension.
    pub fn get_reader_for(&self, path: &Path) -> Option<Box<dyn VideoReader>> {
        match extension_of(path) {
            Some(ext) => self.get_reader(&ext),
            None => self.get_reader(WILDCARD),
        }
    }

    /// Whether a reader is registered for exactly this extension.
    /// The wildcard does not count.
    pub fn is_supported(&self, extension: &str) -> bool {
        let key = normalize_extension(extension);
        key != WILDCARD && self.readers.contains_key(&key)
    }

    pub fn is_supported_path(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.is_supported(&ext))
    }

    /// Registered extensions, in registration order.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.readers.keys().map(String::as_str)
    }

    /// Most recently modified supported file among the files matching a glob
    /// pattern, e.g. `captures/*` or `captures/*.png`.
    pub fn get_most_recent_supported_video(&self, pattern: &str) -> Option<PathBuf> {
        let entries = match glob::glob(pattern) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Invalid pattern {}: {}", pattern, e);
                return None;
            }
        };

        entries
            .filter_map(Result::ok)
            .filter(|p| p.is_file() && self.is_supported_path(p))
            .map(|p| {
                let modified = p.metadata().and_then(|m| m.modified()).unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, p)
            })
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
            .map(|(_, p)| p)
    }

    /// Ask the application to load `path` into `target`.
    ///
    /// Subscribers of `VideoLoadAsked` run synchronously, in subscription
    /// order, before this returns. The request is also queued on the bus.
    pub fn load_video(&self, path: &Path, target: i32) {
        info!("Load requested: {} -> {}", path.display(), target);
        self.events.emit(VideoLoadAsked {
            path: path.to_path_buf(),
            target,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::downcast_event;
    use crate::readers::{FrameGenerator, ImageSequenceReader};
    use std::sync::{Arc, Mutex};

    fn generator() -> Box<dyn VideoReader> {
        Box::new(FrameGenerator::new())
    }

    fn images() -> Box<dyn VideoReader> {
        Box::new(ImageSequenceReader::new())
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_extension("AVI"), ".avi");
        assert_eq!(normalize_extension(".Png"), ".png");
        assert_eq!(normalize_extension("*"), "*");
    }

    #[test]
    fn test_first_registration_wins() {
        let mut manager = VideoTypeManager::new();
        assert!(manager.register(".png", "images", images));
        assert!(!manager.register("PNG", "generator", generator));
        assert_eq!(manager.reader_name(".png"), Some("images"));
    }

    #[test]
    fn test_wildcard_fallback() {
        let mut manager = VideoTypeManager::new();
        manager.register(".avi", "images", images);
        manager.register("*", "generator", generator);

        assert_eq!(manager.reader_name(".mp4"), Some("generator"));
        assert_eq!(manager.reader_name(".avi"), Some("images"));
        assert!(manager.get_reader(".mp4").is_some());
        assert!(manager.is_supported(".avi"));
        assert!(!manager.is_supported(".mp4"));
    }

    #[test]
    fn test_unknown_without_wildcard() {
        let mut manager = VideoTypeManager::new();
        manager.register(".avi", "images", images);
        assert!(!manager.is_supported(".xyz"));
        assert!(manager.get_reader(".xyz").is_none());
    }

    #[test]
    fn test_most_recent_supported() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.png");
        let new = dir.path().join("new.png");
        let other = dir.path().join("newest.txt");
        std::fs::write(&old, b"x").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(&new, b"x").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(&other, b"x").unwrap();

        let mut manager = VideoTypeManager::new();
        manager.register(".png", "images", images);

        let pattern = format!("{}/*", dir.path().display());
        assert_eq!(manager.get_most_recent_supported_video(&pattern), Some(new));

        let missing = format!("{}/nothing/*", dir.path().display());
        assert_eq!(manager.get_most_recent_supported_video(&missing), None);
    }

    #[test]
    fn test_load_video_notifies_in_order() {
        let manager = VideoTypeManager::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for id in 0..2 {
            let seen = Arc::clone(&seen);
            manager.events().subscribe::<VideoLoadAsked, _>(move |e| {
                seen.lock().unwrap().push((id, e.target));
            });
        }

        manager.load_video(Path::new("clip.png"), 1);
        assert_eq!(*seen.lock().unwrap(), vec![(0, 1), (1, 1)]);

        let queued = manager.events().poll();
        assert_eq!(queued.len(), 1);
        let request = downcast_event::<VideoLoadAsked>(&queued[0]).unwrap();
        assert_eq!(request.path, PathBuf::from("clip.png"));
    }

    #[test]
    fn test_default_readers() {
        let manager = VideoTypeManager::with_default_readers();
        assert!(manager.is_supported(".png"));
        assert!(manager.is_supported(".vgen"));
        assert!(manager.get_reader_for(Path::new("a/b/frame_0001.JPG")).is_some());
    }
}
