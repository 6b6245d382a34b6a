//! Still images and numbered image sequences
//!
//! Always-caching backend: frames are whole image files, decoded into the
//! working-zone cache by a background job and served from memory.
//!
//! Frame `i` of the sequence has timestamp `i` (one timestamp per frame).
//! The frame rate is not stored in image files, it comes from settings.

use log::{debug, info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::caching::{CachingPlayback, PopulationReport};
use crate::core::cache_man::CacheManager;
use crate::core::reader::VideoReader;
use crate::entities::loader::{DecodeParams, Loader, is_image};
use crate::entities::{
    FrameError, FrameSource, ImageAspectRatio, ImageRotation, OpenVideoResult, Size, VideoCapabilities,
    VideoDecodingMode, VideoFrame, VideoInfo, VideoOptions, VideoSection, VideoSummary, WorkerPool,
    has_companion_kva,
};
use crate::utils::sequences::detect_sequence;

pub const DEFAULT_FPS: f64 = 25.0;

/// Decodes sequence files in order, for population passes.
#[derive(Debug, Clone)]
pub struct SequenceSource {
    files: Arc<[PathBuf]>,
    params: DecodeParams,
    next: usize,
}

impl SequenceSource {
    pub fn new(files: Arc<[PathBuf]>, params: DecodeParams) -> Self {
        Self { files, params, next: 0 }
    }
}

impl FrameSource for SequenceSource {
    fn seek(&mut self, timestamp: i64) -> Result<(), FrameError> {
        if self.files.is_empty() {
            return Err(FrameError::NoSource);
        }
        self.next = timestamp.max(0) as usize;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>, FrameError> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        let image = Loader::load(path, &self.params)?;
        let frame = VideoFrame::new(self.next as i64, image);
        self.next += 1;
        Ok(Some(frame))
    }
}

/// Reader for one image or a numbered sequence of images.
#[derive(Debug)]
pub struct ImageSequenceReader {
    files: Arc<[PathBuf]>,
    info: VideoInfo,
    options: VideoOptions,
    mode: VideoDecodingMode,
    fps: f64,
    decoding_size: Option<Size>,
    playback: CachingPlayback,
}

impl Default for ImageSequenceReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageSequenceReader {
    pub fn new() -> Self {
        Self::with_playback(CachingPlayback::new())
    }

    /// Reader whose cache reports to a shared memory manager.
    pub fn with_manager(manager: Arc<CacheManager>) -> Self {
        Self::with_playback(CachingPlayback::with_manager(manager))
    }

    fn with_playback(playback: CachingPlayback) -> Self {
        Self {
            files: Arc::from(Vec::new()),
            info: VideoInfo::empty(),
            options: VideoOptions::default(),
            mode: VideoDecodingMode::NotInitialized,
            fps: DEFAULT_FPS,
            decoding_size: None,
            playback,
        }
    }

    /// Frame rate assumed for sequences opened afterwards.
    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        if fps > 0.0 {
            self.fps = fps;
        }
        self
    }

    pub fn frame_count(&self) -> usize {
        self.files.len()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn last_population(&self) -> Option<PopulationReport> {
        self.playback.last_population()
    }

    pub fn is_degraded(&self) -> bool {
        self.playback.is_degraded()
    }

    /// Block until the running population pass ends.
    pub fn join_population(&mut self) {
        self.playback.join_population();
    }

    fn decode_params(&self) -> DecodeParams {
        DecodeParams {
            aspect_size: Some(self.info.aspect_ratio_size),
            rotation: self.options.image_rotation,
            decoding_size: self.decoding_size,
        }
    }

    fn source(&self) -> Box<dyn FrameSource> {
        Box::new(SequenceSource::new(Arc::clone(&self.files), self.decode_params()))
    }

    /// Recompute aspect and reference sizes from the current options.
    fn refresh_sizes(&mut self) {
        let original = self.info.original_size;
        self.info.aspect_ratio_size = self
            .options
            .image_aspect_ratio
            .apply(original, self.info.pixel_aspect_ratio);
        self.info = self.info.with_rotation(self.options.image_rotation);
    }

    /// Drop cached frames after an image adjustment.
    fn invalidate(&mut self) -> bool {
        self.playback.invalidate();
        debug!("Image adjustment on {}, cache invalidated", self.info.file_path.display());
        true
    }
}

impl VideoReader for ImageSequenceReader {
    fn current(&self) -> Option<&VideoFrame> {
        self.playback.current()
    }

    fn flags(&self) -> VideoCapabilities {
        if !self.loaded() {
            return VideoCapabilities::NONE;
        }
        VideoCapabilities::CAN_CACHE
            | VideoCapabilities::CAN_CHANGE_WORKING_ZONE
            | VideoCapabilities::CAN_CHANGE_ASPECT_RATIO
            | VideoCapabilities::CAN_CHANGE_IMAGE_ROTATION
            | VideoCapabilities::CAN_CHANGE_DECODING_SIZE
    }

    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn loaded(&self) -> bool {
        !self.files.is_empty()
    }

    fn working_zone(&self) -> VideoSection {
        self.playback.working_zone()
    }

    fn decoding_mode(&self) -> VideoDecodingMode {
        self.mode
    }

    fn options(&self) -> &VideoOptions {
        &self.options
    }

    fn set_options(&mut self, options: VideoOptions) {
        self.options = options;
        if self.loaded() {
            self.refresh_sizes();
        }
    }

    fn open(&mut self, path: &Path) -> OpenVideoResult {
        self.close();

        if !path.is_file() {
            warn!("Cannot open {}: not a file", path.display());
            return OpenVideoResult::FileNotOpened;
        }
        if !is_image(path) {
            return OpenVideoResult::CodecNotSupported;
        }

        let files = match detect_sequence(path) {
            Ok(files) => files,
            Err(e) => {
                warn!("Cannot list sequence of {}: {}", path.display(), e);
                return OpenVideoResult::FileNotOpened;
            }
        };
        let Some(first) = files.first() else {
            return OpenVideoResult::EmptySource;
        };

        let size = match Loader::header(first) {
            Ok(size) if !size.is_empty() => size,
            Ok(_) => return OpenVideoResult::EmptySource,
            Err(FrameError::UnsupportedFormat(e)) => {
                warn!("Unsupported image {}: {}", first.display(), e);
                return OpenVideoResult::CodecNotSupported;
            }
            Err(e) => {
                warn!("Cannot read {}: {}", first.display(), e);
                return OpenVideoResult::FileNotOpened;
            }
        };

        self.info = VideoInfo::regular(path.to_path_buf(), size, files.len(), 0, 1, self.fps);
        self.files = Arc::from(files);
        self.refresh_sizes();
        self.mode = VideoDecodingMode::Caching;

        info!(
            "Opened {} ({} frames, {}x{})",
            path.display(),
            self.files.len(),
            size.width,
            size.height
        );
        OpenVideoResult::Success
    }

    fn close(&mut self) {
        self.playback.close();
        if self.loaded() {
            debug!("Closed {}", self.info.file_path.display());
        }
        self.files = Arc::from(Vec::new());
        self.info = VideoInfo::empty();
        self.mode = VideoDecodingMode::NotInitialized;
    }

    fn extract_summary(&mut self, path: &Path, thumbs: usize, max_size: Size) -> VideoSummary {
        let files = match detect_sequence(path) {
            Ok(files) if !files.is_empty() => files,
            _ => return VideoSummary::unreadable(path),
        };
        let Ok(size) = Loader::header(&files[0]) else {
            return VideoSummary::unreadable(path);
        };

        // Evenly spaced picks, first frame included
        let count = thumbs.min(files.len());
        let picks: Vec<&PathBuf> = (0..count).map(|i| &files[i * files.len() / count.max(1)]).collect();
        let thumbs: Vec<_> = picks
            .par_iter()
            .filter_map(|p| match Loader::thumbnail(p, max_size) {
                Ok(bmp) => Some(bmp),
                Err(e) => {
                    debug!("Thumbnail of {} failed: {}", p.display(), e);
                    None
                }
            })
            .collect();

        VideoSummary {
            filename: path.to_path_buf(),
            is_image: files.len() == 1,
            has_kva: has_companion_kva(path),
            image_size: size,
            duration_ms: (files.len() as f64 * 1000.0 / self.fps).round() as i64,
            thumbs,
        }
    }

    fn move_next(&mut self, skip: usize, _decode_if_necessary: bool) -> bool {
        self.playback.move_next(skip)
    }

    fn move_to(&mut self, timestamp: i64) -> bool {
        self.playback.move_to(timestamp)
    }

    fn update_working_zone(
        &mut self,
        zone: VideoSection,
        force_reload: bool,
        max_memory: usize,
        workers: &dyn WorkerPool,
    ) {
        if !self.loaded() {
            return;
        }
        let full = self.info.full_section();
        let zone = if zone.is_empty() {
            full
        } else {
            VideoSection::new(zone.start.max(full.start), zone.end.min(full.end))
        };
        let source = self.source();
        self.playback
            .update_working_zone(zone, force_reload, max_memory, workers, source);
    }

    fn change_aspect_ratio(&mut self, ratio: ImageAspectRatio) -> bool {
        if !self.loaded() || ratio == self.options.image_aspect_ratio {
            return false;
        }
        self.options.image_aspect_ratio = ratio;
        self.refresh_sizes();
        self.invalidate()
    }

    fn change_image_rotation(&mut self, rotation: ImageRotation) -> bool {
        if !self.loaded() || rotation == self.options.image_rotation {
            return false;
        }
        self.options.image_rotation = rotation;
        self.refresh_sizes();
        self.invalidate()
    }

    fn change_decoding_size(&mut self, size: Size) -> bool {
        if !self.loaded() || size.is_empty() || self.decoding_size == Some(size) {
            return false;
        }
        self.decoding_size = Some(size);
        self.invalidate()
    }

    fn disable_custom_decoding_size(&mut self) {
        if self.decoding_size.take().is_some() {
            self.invalidate();
        }
    }
}
