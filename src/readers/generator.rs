//! Synthetic frame source
//!
//! Renders deterministic frames (a flat color derived from the frame index
//! with a one-pixel white bar at `x = index % width`) at a configurable size,
//! rate and timestamp spacing. Opened from a `.vgen` JSON file:
//!
//! ```json
//! { "width": 640, "height": 360, "frame_count": 250, "timestamps_per_frame": 512, "fps": 25.0 }
//! ```
//!
//! Supports all three decoding modes, which makes it the reference backend
//! for playback and cache behavior.

use log::{debug, info, trace, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::caching::CachingPlayback;
use crate::core::prebuffer::{DEFAULT_CAPACITY, PreBuffer};
use crate::core::reader::VideoReader;
use crate::entities::{
    Bitmap, FrameError, FrameSource, OpenVideoResult, Size, VideoCapabilities, VideoDecodingMode, VideoFrame,
    VideoInfo, VideoOptions, VideoSection, VideoSummary, WorkerPool, has_companion_kva,
};

pub const VGEN_EXTENSION: &str = "vgen";

/// Generator description, as stored in `.vgen` files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorParams {
    pub width: u32,
    pub height: u32,
    pub frame_count: usize,
    pub first_timestamp: i64,
    pub timestamps_per_frame: i64,
    pub fps: f64,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            frame_count: 250,
            first_timestamp: 0,
            timestamps_per_frame: 1,
            fps: 25.0,
        }
    }
}

impl GeneratorParams {
    /// Read a `.vgen` file. Failures map to the open result they cause.
    pub fn load(path: &Path) -> Result<Self, OpenVideoResult> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            warn!("Cannot read {}: {}", path.display(), e);
            OpenVideoResult::FileNotOpened
        })?;
        let params: GeneratorParams = serde_json::from_str(&json).map_err(|e| {
            warn!("Invalid generator file {}: {}", path.display(), e);
            OpenVideoResult::StreamInfoNotFound
        })?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), OpenVideoResult> {
        if self.width == 0 || self.height == 0 {
            return Err(OpenVideoResult::VideoStreamNotFound);
        }
        if self.frame_count == 0 {
            return Err(OpenVideoResult::EmptySource);
        }
        if self.timestamps_per_frame <= 0 || self.fps <= 0.0 || self.first_timestamp < 0 {
            return Err(OpenVideoResult::StreamInfoNotFound);
        }
        // The whole timeline, one step past the last frame, must fit in i64
        let end = i64::try_from(self.frame_count)
            .ok()
            .and_then(|frames| frames.checked_mul(self.timestamps_per_frame))
            .and_then(|duration| duration.checked_add(self.first_timestamp));
        if end.is_none() {
            return Err(OpenVideoResult::StreamInfoNotFound);
        }
        Ok(())
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn timestamp_of(&self, index: usize) -> i64 {
        self.first_timestamp + index as i64 * self.timestamps_per_frame
    }

    /// Index of the first frame at or after `timestamp`.
    pub fn index_at_or_after(&self, timestamp: i64) -> usize {
        let offset = timestamp.saturating_sub(self.first_timestamp);
        if offset <= 0 {
            return 0;
        }
        let step = self.timestamps_per_frame.max(1);
        (offset / step + i64::from(offset % step != 0)) as usize
    }

    /// Index of the last frame at or before `timestamp`.
    pub fn index_at_or_before(&self, timestamp: i64) -> usize {
        let offset = timestamp.saturating_sub(self.first_timestamp).max(0);
        (offset / self.timestamps_per_frame.max(1)) as usize
    }

    fn duration_ms(&self) -> i64 {
        (self.frame_count as f64 * 1000.0 / self.fps).round() as i64
    }
}

/// Pixels of frame `index` at `size`.
pub fn render_frame(index: usize, size: Size) -> Result<Bitmap, FrameError> {
    let (width, height) = (size.width, size.height);
    let base = [(index * 37 % 256) as u8, (index * 11 % 256) as u8, 96, 255];
    let bar = (index % width.max(1) as usize) as u32;

    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    for _ in 0..height {
        for x in 0..width {
            if x == bar {
                pixels.extend_from_slice(&[255; 4]);
            } else {
                pixels.extend_from_slice(&base);
            }
        }
    }
    // Opaque, so straight and premultiplied agree
    Bitmap::from_premultiplied(width, height, pixels)
}

/// Sequential renderer handed to background jobs.
#[derive(Debug, Clone)]
pub struct GeneratorSource {
    params: GeneratorParams,
    size: Size,
    next: usize,
}

impl GeneratorSource {
    pub fn new(params: GeneratorParams, size: Size) -> Self {
        Self { params, size, next: 0 }
    }

    pub fn frame_at(&self, index: usize) -> Result<Option<VideoFrame>, FrameError> {
        if index >= self.params.frame_count {
            return Ok(None);
        }
        let image = render_frame(index, self.size)?;
        Ok(Some(VideoFrame::new(self.params.timestamp_of(index), image)))
    }
}

impl FrameSource for GeneratorSource {
    fn seek(&mut self, timestamp: i64) -> Result<(), FrameError> {
        self.next = self.params.index_at_or_after(timestamp);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>, FrameError> {
        let frame = self.frame_at(self.next)?;
        if frame.is_some() {
            self.next += 1;
        }
        Ok(frame)
    }
}

/// Reader over a frame generator.
pub struct FrameGenerator {
    params: Option<GeneratorParams>,
    path: PathBuf,
    info: VideoInfo,
    options: VideoOptions,
    mode: VideoDecodingMode,
    decoding_size: Option<Size>,
    zone: VideoSection,
    current: Option<VideoFrame>,
    prebuffer: PreBuffer,
    pool: Option<Arc<dyn WorkerPool>>,
    playback: CachingPlayback,
}

impl std::fmt::Debug for FrameGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameGenerator")
            .field("params", &self.params)
            .field("mode", &self.mode)
            .field("zone", &self.zone)
            .field("current", &self.current().map(|f| f.timestamp()))
            .finish()
    }
}

impl Default for FrameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameGenerator {
    pub fn new() -> Self {
        Self {
            params: None,
            path: PathBuf::new(),
            info: VideoInfo::empty(),
            options: VideoOptions::default(),
            mode: VideoDecodingMode::NotInitialized,
            decoding_size: None,
            zone: VideoSection::EMPTY,
            current: None,
            prebuffer: PreBuffer::new(DEFAULT_CAPACITY),
            pool: None,
            playback: CachingPlayback::new(),
        }
    }

    pub fn with_prebuffer_capacity(mut self, capacity: usize) -> Self {
        self.prebuffer = PreBuffer::new(capacity);
        self
    }

    /// Open from in-memory parameters. `label` stands in for a file path.
    pub fn open_params(&mut self, params: GeneratorParams, label: &Path) -> OpenVideoResult {
        self.close();
        if let Err(result) = params.validate() {
            warn!("Rejected generator {}: {:?}", label.display(), result);
            return result;
        }

        self.info = VideoInfo::regular(
            label.to_path_buf(),
            params.size(),
            params.frame_count,
            params.first_timestamp,
            params.timestamps_per_frame,
            params.fps,
        );
        self.zone = self.info.full_section();
        self.path = label.to_path_buf();
        self.mode = VideoDecodingMode::OnDemand;
        info!(
            "Generator {} opened: {} frames {}x{} @ {} fps",
            label.display(),
            params.frame_count,
            params.width,
            params.height,
            params.fps
        );
        self.params = Some(params);
        OpenVideoResult::Success
    }

    fn source(&self) -> Option<GeneratorSource> {
        let params = self.params.clone()?;
        let size = self.decoding_size.unwrap_or(params.size());
        Some(GeneratorSource::new(params, size))
    }

    /// Last frame index inside the working zone.
    fn last_index(&self, params: &GeneratorParams) -> usize {
        params
            .index_at_or_before(self.zone.end)
            .min(params.frame_count.saturating_sub(1))
    }

    fn render_current(&mut self, index: usize) -> bool {
        let Some(source) = self.source() else {
            return false;
        };
        match source.frame_at(index) {
            Ok(Some(frame)) => {
                self.current = Some(frame);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Rendering frame {} failed: {}", index, e);
                false
            }
        }
    }

    fn restart_prebuffer(&mut self, from: i64) {
        let (Some(source), Some(pool)) = (self.source(), self.pool.clone()) else {
            warn!("Pre-buffering restart without a worker pool");
            return;
        };
        self.prebuffer.start(Box::new(source), from, self.zone, pool.as_ref());
    }

    fn clamp_to_zone(&self, timestamp: i64) -> i64 {
        timestamp.clamp(self.zone.start.max(0), self.zone.end.max(0))
    }

    fn landed_before_end(&self) -> bool {
        self.current().is_some_and(|f| f.timestamp() < self.zone.end)
    }

    fn on_demand_next(&mut self, skip: usize) -> bool {
        let Some(params) = self.params.clone() else {
            return false;
        };
        let last = self.last_index(&params);
        let target = match &self.current {
            Some(frame) => params.index_at_or_before(frame.timestamp()) + skip + 1,
            None => params.index_at_or_after(self.zone.start) + skip,
        };
        let landing = target.min(last);
        if self.current.as_ref().is_some_and(|f| f.timestamp() == params.timestamp_of(landing)) {
            return false;
        }
        self.render_current(landing) && self.landed_before_end()
    }

    fn on_demand_to(&mut self, timestamp: i64) -> bool {
        let Some(params) = self.params.clone() else {
            return false;
        };
        let index = params
            .index_at_or_after(self.clamp_to_zone(timestamp))
            .min(self.last_index(&params));
        self.render_current(index) && self.landed_before_end()
    }

    fn pre_buffered_to(&mut self, timestamp: i64) -> bool {
        let Some(params) = self.params.clone() else {
            return false;
        };
        let index = params
            .index_at_or_after(self.clamp_to_zone(timestamp))
            .min(self.last_index(&params));
        let target = params.timestamp_of(index);

        if !self.prebuffer.skip_to(target) {
            trace!("Seek to {} outside the buffer, restarting", target);
            self.restart_prebuffer(target);
            if !self.prebuffer.move_next(0, true) {
                return false;
            }
        }
        self.landed_before_end()
    }
}

impl VideoReader for FrameGenerator {
    fn current(&self) -> Option<&VideoFrame> {
        match self.mode {
            VideoDecodingMode::PreBuffering => self.prebuffer.current(),
            VideoDecodingMode::Caching => self.playback.current(),
            _ => self.current.as_ref(),
        }
    }

    fn flags(&self) -> VideoCapabilities {
        if !self.loaded() {
            return VideoCapabilities::NONE;
        }
        VideoCapabilities::CAN_DECODE_ON_DEMAND
            | VideoCapabilities::CAN_PRE_BUFFER
            | VideoCapabilities::CAN_CACHE
            | VideoCapabilities::CAN_CHANGE_WORKING_ZONE
            | VideoCapabilities::CAN_CHANGE_DECODING_SIZE
            | VideoCapabilities::CAN_SCALE_INDEFINITELY
    }

    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn loaded(&self) -> bool {
        self.params.is_some()
    }

    fn working_zone(&self) -> VideoSection {
        match self.mode {
            VideoDecodingMode::Caching => self.playback.working_zone(),
            _ => self.zone,
        }
    }

    fn decoding_mode(&self) -> VideoDecodingMode {
        self.mode
    }

    fn options(&self) -> &VideoOptions {
        &self.options
    }

    fn set_options(&mut self, options: VideoOptions) {
        self.options = options;
    }

    fn pre_buffering_segment(&self) -> VideoSection {
        match self.mode {
            VideoDecodingMode::PreBuffering => self.prebuffer.segment(),
            _ => VideoSection::EMPTY,
        }
    }

    fn drops(&self) -> usize {
        match self.mode {
            VideoDecodingMode::PreBuffering => self.prebuffer.drops(),
            _ => 0,
        }
    }

    fn can_draw_unscaled(&self) -> bool {
        true
    }

    /// Entering caching leaves the cache empty until the next
    /// `update_working_zone`.
    fn set_decoding_mode(&mut self, mode: VideoDecodingMode, workers: Arc<dyn WorkerPool>) -> bool {
        if !self.loaded() || mode == VideoDecodingMode::NotInitialized || !self.can_switch_decoding_mode(mode) {
            return false;
        }
        if mode == self.mode {
            return true;
        }

        // Carry the displayed frame over
        let shown = self.current().cloned();
        match self.mode {
            VideoDecodingMode::PreBuffering => {
                self.prebuffer.clear();
                self.pool = None;
            }
            VideoDecodingMode::Caching => self.playback.close(),
            _ => {}
        }

        debug!("{}: {:?} -> {:?}", self.path.display(), self.mode, mode);
        self.mode = mode;
        self.current = None;

        match mode {
            VideoDecodingMode::OnDemand => self.current = shown,
            VideoDecodingMode::PreBuffering => {
                let from = shown.map(|f| f.timestamp()).unwrap_or(self.zone.start);
                self.pool = Some(workers);
                self.restart_prebuffer(from);
            }
            _ => {}
        }
        true
    }

    fn open(&mut self, path: &Path) -> OpenVideoResult {
        match GeneratorParams::load(path) {
            Ok(params) => self.open_params(params, path),
            Err(result) => {
                self.close();
                result
            }
        }
    }

    fn close(&mut self) {
        self.prebuffer.clear();
        self.pool = None;
        self.playback.close();
        if self.params.take().is_some() {
            debug!("Closed generator {}", self.path.display());
        }
        self.path = PathBuf::new();
        self.info = VideoInfo::empty();
        self.zone = VideoSection::EMPTY;
        self.current = None;
        self.decoding_size = None;
        self.mode = VideoDecodingMode::NotInitialized;
    }

    fn extract_summary(&mut self, path: &Path, thumbs: usize, max_size: Size) -> VideoSummary {
        let Ok(params) = GeneratorParams::load(path) else {
            return VideoSummary::unreadable(path);
        };

        let size = params.size().fit_within(max_size);
        let count = thumbs.min(params.frame_count);
        let picks: Vec<usize> = (0..count).map(|i| i * params.frame_count / count.max(1)).collect();
        let thumbs: Vec<Bitmap> = picks
            .par_iter()
            .filter_map(|&index| render_frame(index, size).ok())
            .collect();

        VideoSummary {
            filename: path.to_path_buf(),
            is_image: false,
            has_kva: has_companion_kva(path),
            image_size: params.size(),
            duration_ms: params.duration_ms(),
            thumbs,
        }
    }

    fn move_next(&mut self, skip: usize, decode_if_necessary: bool) -> bool {
        match self.mode {
            VideoDecodingMode::OnDemand => self.on_demand_next(skip),
            VideoDecodingMode::PreBuffering => {
                self.prebuffer.move_next(skip, decode_if_necessary) && self.landed_before_end()
            }
            VideoDecodingMode::Caching => self.playback.move_next(skip),
            VideoDecodingMode::NotInitialized => false,
        }
    }

    fn move_to(&mut self, timestamp: i64) -> bool {
        match self.mode {
            VideoDecodingMode::OnDemand => self.on_demand_to(timestamp),
            VideoDecodingMode::PreBuffering => self.pre_buffered_to(timestamp),
            VideoDecodingMode::Caching => self.playback.move_to(timestamp),
            VideoDecodingMode::NotInitialized => false,
        }
    }

    fn before_playloop(&mut self) {
        if self.mode != VideoDecodingMode::PreBuffering || self.prebuffer.is_running() || self.prebuffer.available() > 0 {
            return;
        }
        let Some(params) = self.params.clone() else {
            return;
        };
        // Buffer ran dry: resume after the displayed frame
        let from = self
            .current()
            .map(|f| f.timestamp() + params.timestamps_per_frame)
            .unwrap_or(self.zone.start);
        if from <= self.zone.end {
            self.restart_prebuffer(from);
        }
    }

    fn reset_drops(&mut self) {
        self.prebuffer.reset_drops();
    }

    fn update_working_zone(
        &mut self,
        zone: VideoSection,
        force_reload: bool,
        max_memory: usize,
        workers: &dyn WorkerPool,
    ) {
        let full = self.info.full_section();
        if !self.loaded() || full.is_empty() {
            return;
        }
        let zone = if zone.is_empty() {
            full
        } else {
            VideoSection::new(zone.start.max(full.start), zone.end.min(full.end))
        };
        if zone.is_empty() {
            warn!("Working zone outside {}, ignored", full);
            return;
        }

        match self.mode {
            VideoDecodingMode::Caching => {
                self.zone = zone;
                if let Some(source) = self.source() {
                    self.playback
                        .update_working_zone(zone, force_reload, max_memory, workers, Box::new(source));
                }
            }
            // The buffer keeps using the pool it was entered with
            VideoDecodingMode::PreBuffering => {
                self.zone = zone;
                self.restart_prebuffer(zone.start);
            }
            _ => {
                self.zone = zone;
                if self.current.as_ref().is_some_and(|f| !zone.contains(f.timestamp())) {
                    self.current = None;
                }
            }
        }
    }

    /// On demand the new size applies from the next render; nothing is
    /// invalidated, so this reports false.
    fn change_decoding_size(&mut self, size: Size) -> bool {
        if !self.loaded() || size.is_empty() || self.decoding_size == Some(size) {
            return false;
        }
        self.decoding_size = Some(size);
        self.after_size_change();
        matches!(self.mode, VideoDecodingMode::Caching | VideoDecodingMode::PreBuffering)
    }

    fn disable_custom_decoding_size(&mut self) {
        if self.decoding_size.take().is_some() {
            self.after_size_change();
        }
    }
}

impl FrameGenerator {
    /// Drop frames rendered at the previous size.
    fn after_size_change(&mut self) {
        match self.mode {
            VideoDecodingMode::Caching => self.playback.invalidate(),
            VideoDecodingMode::PreBuffering => {
                let from = self.current().map(|f| f.timestamp()).unwrap_or(self.zone.start);
                self.prebuffer.clear();
                self.restart_prebuffer(from);
            }
            _ => {
                if let Some(frame) = self.current.take() {
                    if let Some(params) = self.params.clone() {
                        self.render_current(params.index_at_or_before(frame.timestamp()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reader::enumerate_frames;
    use crate::core::workers::{Inline, SpawnThread};

    fn params(frame_count: usize, step: i64) -> GeneratorParams {
        GeneratorParams {
            width: 8,
            height: 2,
            frame_count,
            first_timestamp: 0,
            timestamps_per_frame: step,
            fps: 25.0,
        }
    }

    fn opened(frame_count: usize, step: i64) -> FrameGenerator {
        let mut generator = FrameGenerator::new();
        assert_eq!(
            generator.open_params(params(frame_count, step), Path::new("test.vgen")),
            OpenVideoResult::Success
        );
        generator
    }

    #[test]
    fn test_render_is_deterministic() {
        let a = render_frame(3, Size::new(8, 2)).unwrap();
        let b = render_frame(3, Size::new(8, 2)).unwrap();
        assert_eq!(a.pixels(), b.pixels());
        assert_eq!(a.pixel(3, 1), Some([255, 255, 255, 255]));
        assert_eq!(a.pixel(0, 0), Some([111, 33, 96, 255]));
    }

    #[test]
    fn test_index_mapping() {
        let p = params(10, 100);
        assert_eq!(p.index_at_or_after(0), 0);
        assert_eq!(p.index_at_or_after(101), 2);
        assert_eq!(p.index_at_or_before(199), 1);
        assert_eq!(p.timestamp_of(4), 400);
    }

    #[test]
    fn test_invalid_params() {
        let mut generator = FrameGenerator::new();
        let empty = GeneratorParams { frame_count: 0, ..params(1, 1) };
        assert_eq!(generator.open_params(empty, Path::new("x")), OpenVideoResult::EmptySource);
        let flat = GeneratorParams { width: 0, ..params(1, 1) };
        assert_eq!(generator.open_params(flat, Path::new("x")), OpenVideoResult::VideoStreamNotFound);
        assert!(!generator.loaded());
    }

    /// Timelines that do not fit in i64 are rejected, not panicked on.
    #[test]
    fn test_timeline_overflow_rejected() {
        let huge_step = GeneratorParams { timestamps_per_frame: i64::MAX, ..params(10, 1) };
        assert_eq!(huge_step.validate(), Err(OpenVideoResult::StreamInfoNotFound));
        let late_start = GeneratorParams { first_timestamp: i64::MAX - 5, ..params(10, 1) };
        assert_eq!(late_start.validate(), Err(OpenVideoResult::StreamInfoNotFound));
        let too_many = GeneratorParams { frame_count: usize::MAX, ..params(1, 1) };
        assert_eq!(too_many.validate(), Err(OpenVideoResult::StreamInfoNotFound));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overflow.vgen");
        std::fs::write(
            &path,
            r#"{ "width": 2, "height": 2, "frame_count": 10, "timestamps_per_frame": 9223372036854775807 }"#,
        )
        .unwrap();
        let mut generator = FrameGenerator::new();
        assert_eq!(generator.open(&path), OpenVideoResult::StreamInfoNotFound);
        assert!(!generator.loaded());
    }

    #[test]
    fn test_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.vgen");
        std::fs::write(&path, r#"{ "width": 16, "height": 8, "frame_count": 5 }"#).unwrap();

        let mut generator = FrameGenerator::new();
        assert_eq!(generator.open(&path), OpenVideoResult::Success);
        assert_eq!(generator.info().original_size, Size::new(16, 8));
        assert_eq!(generator.info().frame_count(), 5);
        assert_eq!(generator.decoding_mode(), VideoDecodingMode::OnDemand);

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(generator.open(&path), OpenVideoResult::StreamInfoNotFound);
        assert_eq!(generator.open(&dir.path().join("none.vgen")), OpenVideoResult::FileNotOpened);
    }

    #[test]
    fn test_on_demand_navigation() {
        let mut generator = opened(5, 10);
        assert!(generator.move_first());
        assert_eq!(generator.current().unwrap().timestamp(), 0);

        assert!(generator.move_next(1, true));
        assert_eq!(generator.current().unwrap().timestamp(), 20);

        // Off-grid seek lands on the next frame
        assert!(generator.move_to(25));
        assert_eq!(generator.current().unwrap().timestamp(), 30);

        assert!(!generator.move_next(0, true));
        assert_eq!(generator.current().unwrap().timestamp(), 40);
        assert!(!generator.move_next(0, true));
        assert_eq!(generator.current().unwrap().timestamp(), 40);

        assert!(generator.move_prev());
        assert_eq!(generator.current().unwrap().timestamp(), 30);
    }

    #[test]
    fn test_caching_mode() {
        let mut generator = opened(6, 1);
        assert!(generator.set_decoding_mode(VideoDecodingMode::Caching, Arc::new(Inline)));
        assert!(generator.working_zone().is_empty());

        generator.update_working_zone(VideoSection::new(1, 4), false, usize::MAX, &Inline);
        assert!(generator.working_zone() == VideoSection::new(1, 4));
        let seen: Vec<i64> = enumerate_frames(&mut generator, 0)
            .unwrap()
            .map(|f| f.timestamp())
            .collect();
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_pre_buffering_mode() {
        let mut generator = opened(50, 1).with_prebuffer_capacity(4);
        generator.move_to(10);
        assert!(generator.set_decoding_mode(VideoDecodingMode::PreBuffering, Arc::new(SpawnThread::new())));
        assert_eq!(generator.decoding_mode(), VideoDecodingMode::PreBuffering);

        assert!(generator.move_next(0, true));
        assert_eq!(generator.current().unwrap().timestamp(), 10);
        assert!(generator.move_next(0, true));
        assert_eq!(generator.current().unwrap().timestamp(), 11);

        // Backward seek restarts the job
        assert!(generator.move_to(3));
        assert_eq!(generator.current().unwrap().timestamp(), 3);
        assert!(!generator.pre_buffering_segment().is_empty());

        assert!(matches!(
            enumerate_frames(&mut generator, 0),
            Err(crate::core::reader::ReaderError::EnumerationWhilePreBuffering)
        ));
        assert_eq!(generator.current().unwrap().timestamp(), 3);

        assert!(generator.set_decoding_mode(VideoDecodingMode::OnDemand, Arc::new(Inline)));
        assert_eq!(generator.current().unwrap().timestamp(), 3);
        assert!(generator.pre_buffering_segment().is_empty());
    }

    /// Changing the zone while pre-buffering returns whatever pool the caller hands in.
    #[test]
    fn test_pre_buffering_zone_change_with_inline_pool() {
        let mut generator = opened(100, 1).with_prebuffer_capacity(4);
        assert!(generator.set_decoding_mode(VideoDecodingMode::PreBuffering, Arc::new(SpawnThread::new())));

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let worker = std::thread::spawn(move || {
            generator.update_working_zone(VideoSection::new(20, 99), false, usize::MAX, &Inline);
            let _ = done_tx.send(());
            generator
        });
        assert!(done_rx.recv_timeout(std::time::Duration::from_secs(5)).is_ok());

        let mut generator = worker.join().unwrap();
        assert!(generator.working_zone() == VideoSection::new(20, 99));
        assert!(generator.move_next(0, true));
        assert_eq!(generator.current().unwrap().timestamp(), 20);
    }

    /// Even a pool running jobs on the caller cannot hang pre-buffering.
    #[test]
    fn test_pre_buffering_on_inline_pool() {
        let mut generator = opened(30, 1).with_prebuffer_capacity(4);
        assert!(generator.set_decoding_mode(VideoDecodingMode::PreBuffering, Arc::new(Inline)));
        for expected in 0..4 {
            assert!(generator.move_next(0, true));
            assert_eq!(generator.current().unwrap().timestamp(), expected);
        }
        // Dry buffer, refilled by the play loop hook
        generator.before_playloop();
        assert!(generator.move_next(0, true));
        assert_eq!(generator.current().unwrap().timestamp(), 4);
    }

    #[test]
    fn test_decoding_size() {
        let mut generator = opened(3, 1);
        generator.move_first();
        // Applied, but no cache to invalidate
        assert!(!generator.change_decoding_size(Size::new(4, 1)));
        assert_eq!(generator.current().unwrap().image().size(), Size::new(4, 1));

        generator.disable_custom_decoding_size();
        assert_eq!(generator.current().unwrap().image().size(), Size::new(8, 2));
    }

    #[test]
    fn test_decoding_size_invalidates_cache() {
        let mut generator = opened(3, 1);
        assert!(generator.set_decoding_mode(VideoDecodingMode::Caching, Arc::new(Inline)));
        generator.update_working_zone(VideoSection::EMPTY, false, usize::MAX, &Inline);
        assert!(generator.change_decoding_size(Size::new(4, 1)));
        assert!(!generator.change_decoding_size(Size::new(4, 1)));
        assert!(generator.working_zone().is_empty());

        generator.update_working_zone(VideoSection::EMPTY, false, usize::MAX, &Inline);
        assert!(generator.move_first());
        assert_eq!(generator.current().unwrap().image().size(), Size::new(4, 1));
    }

    #[test]
    fn test_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.vgen");
        std::fs::write(&path, r#"{ "width": 40, "height": 20, "frame_count": 50, "fps": 25.0 }"#).unwrap();

        let mut generator = FrameGenerator::new();
        let summary = generator.extract_summary(&path, 4, Size::new(10, 10));
        assert_eq!(summary.thumbs.len(), 4);
        assert_eq!(summary.thumbs[0].size(), Size::new(10, 5));
        assert_eq!(summary.duration_ms, 2000);
        assert!(!generator.loaded());
    }
}
