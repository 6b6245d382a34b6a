//! VideoReader contract shared by every backend
//!
//! **Why**: The player, exporters and the annotation layer drive any backend
//! (image sequences, generators, codecs) through the same calls: open, move,
//! read `current()`. Backends only differ in how they get a frame under the
//! cursor and which optional operations they support (`flags()`).
//!
//! Required methods are the backend-specific part. Everything expressible in
//! terms of them (seek shortcuts, capability checks, frame enumeration) is
//! provided here.
//!
//! # Decoding modes
//!
//! `NotInitialized` before `open` and after `close`. Switching between
//! `OnDemand`, `PreBuffering` and `Caching` is backend-specific; callers check
//! `can_switch_decoding_mode` first.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::entities::{
    Demosaicing, ImageAspectRatio, ImageRotation, OpenVideoResult, Size, VideoCapabilities,
    VideoDecodingMode, VideoFrame, VideoInfo, VideoOptions, VideoSection, VideoSummary, WorkerPool,
};

/// Invalid use of the reader API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderError {
    /// Enumeration and the pre-buffering job would share the decode cursor.
    EnumerationWhilePreBuffering,
    NotLoaded,
}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderError::EnumerationWhilePreBuffering => {
                write!(f, "Frame enumerator called while pre-buffering")
            }
            ReaderError::NotLoaded => write!(f, "No video loaded"),
        }
    }
}

impl std::error::Error for ReaderError {}

/// Uniform frame access over a media backend.
pub trait VideoReader: Send {
    // ===== State =====

    /// Frame under the cursor. `None` before the first move and after `close`.
    fn current(&self) -> Option<&VideoFrame>;
    fn flags(&self) -> VideoCapabilities;
    fn info(&self) -> &VideoInfo;
    fn loaded(&self) -> bool;
    fn working_zone(&self) -> VideoSection;
    fn decoding_mode(&self) -> VideoDecodingMode;
    fn options(&self) -> &VideoOptions;
    fn set_options(&mut self, options: VideoOptions);

    /// Range currently held by the look-ahead buffer, empty when not pre-buffering.
    fn pre_buffering_segment(&self) -> VideoSection {
        VideoSection::EMPTY
    }

    /// Frames requested but not ready since the last `reset_drops`.
    fn drops(&self) -> usize {
        0
    }

    fn file_path(&self) -> &Path {
        &self.info().file_path
    }

    fn is_single_frame(&self) -> bool {
        self.info().duration_timestamps == 1
    }

    /// Whether frames may be drawn at native size without the decoding-size pass.
    fn can_draw_unscaled(&self) -> bool {
        false
    }

    // ===== Open / close =====

    /// Open the source. Expected failures are reported, never raised.
    fn open(&mut self, path: &Path) -> OpenVideoResult;

    /// Release decoder state and every owned frame. Idempotent.
    fn close(&mut self);

    /// Describe `path` without touching this reader's playback cursor.
    fn extract_summary(&mut self, path: &Path, thumbs: usize, max_size: Size) -> VideoSummary;

    /// Called once the player has attached the reader.
    fn post_load(&mut self) {}

    // ===== Low level frame requests =====

    /// Advance `current` by `skip + 1` frames.
    ///
    /// With `decode_if_necessary == false` this never blocks: a frame that is
    /// not ready counts as a drop and `current` is left unchanged.
    /// Returns false at the end of the working zone.
    fn move_next(&mut self, skip: usize, decode_if_necessary: bool) -> bool;

    /// Seek `current` to the frame closest to `timestamp` inside the working
    /// zone. Returns false when the zone end was reached or exceeded.
    fn move_to(&mut self, timestamp: i64) -> bool;

    // ===== Play loop =====

    fn before_playloop(&mut self) {}

    fn reset_drops(&mut self) {}

    /// Make `zone` the active working zone.
    ///
    /// Caching backends populate their cache in the background through
    /// `workers`, holding at most `max_memory` bytes. `force_reload` discards
    /// cached frames even when `zone` is inside the cached range. A
    /// pre-buffering reader restarts its buffer on the pool it was switched
    /// into that mode with.
    fn update_working_zone(
        &mut self,
        zone: VideoSection,
        force_reload: bool,
        max_memory: usize,
        workers: &dyn WorkerPool,
    );

    fn before_frame_enumeration(&mut self) {}

    fn after_frame_enumeration(&mut self) {}

    fn can_switch_decoding_mode(&self, mode: VideoDecodingMode) -> bool {
        match mode {
            VideoDecodingMode::NotInitialized => true,
            VideoDecodingMode::OnDemand => self.can_decode_on_demand(),
            VideoDecodingMode::PreBuffering => self.can_pre_buffer(),
            VideoDecodingMode::Caching => self.can_cache(),
        }
    }

    /// Switch to `mode`. Pre-buffering backends keep `workers` to restart
    /// their job after seeks. Single-mode backends only accept their own mode.
    fn set_decoding_mode(&mut self, mode: VideoDecodingMode, _workers: Arc<dyn WorkerPool>) -> bool {
        mode == self.decoding_mode()
    }

    fn has_more_frames(&self) -> bool {
        self.current()
            .map(|f| f.timestamp() < self.working_zone().end)
            .unwrap_or(false)
    }

    /// Lazy walk over the working zone, see `enumerate_frames`.
    fn frame_enumerator(&mut self, interval: i64) -> Result<FrameEnumerator<'_>, ReaderError>
    where
        Self: Sized,
    {
        enumerate_frames(self, interval)
    }

    // ===== Seek shortcuts =====

    fn move_first(&mut self) -> bool {
        let start = self.working_zone().start;
        self.move_to(start)
    }

    fn move_last(&mut self) -> bool {
        let end = self.working_zone().end;
        self.move_to(end)
    }

    fn move_prev(&mut self) -> bool {
        self.move_by(-1, true)
    }

    /// Move by `frames` frames. A single step forward goes through `move_next`
    /// so backends keep their sequential fast path.
    fn move_by(&mut self, frames: i64, decode_if_necessary: bool) -> bool {
        if frames == 1 {
            return self.move_next(0, decode_if_necessary);
        }

        let current = self.current().map(|f| f.timestamp()).unwrap_or(0);
        let target = (current + self.info().average_timestamps_per_frame * frames).max(0);
        self.move_to(target)
    }

    // ===== Image adjustments =====
    //
    // Each returns true iff the change was applied and invalidated cached
    // frames. Backends without the capability keep the defaults.

    fn change_aspect_ratio(&mut self, _ratio: ImageAspectRatio) -> bool {
        false
    }

    fn change_image_rotation(&mut self, _rotation: ImageRotation) -> bool {
        false
    }

    fn change_demosaicing(&mut self, _demosaicing: Demosaicing) -> bool {
        false
    }

    fn change_deinterlace(&mut self, _deinterlace: bool) -> bool {
        false
    }

    fn change_decoding_size(&mut self, _size: Size) -> bool {
        false
    }

    fn disable_custom_decoding_size(&mut self) {}

    // ===== Capability shortcuts =====

    fn can_decode_on_demand(&self) -> bool {
        self.flags().contains(VideoCapabilities::CAN_DECODE_ON_DEMAND)
    }

    fn can_pre_buffer(&self) -> bool {
        self.flags().contains(VideoCapabilities::CAN_PRE_BUFFER)
    }

    fn can_cache(&self) -> bool {
        self.flags().contains(VideoCapabilities::CAN_CACHE)
    }

    fn can_change_aspect_ratio(&self) -> bool {
        self.flags().contains(VideoCapabilities::CAN_CHANGE_ASPECT_RATIO)
    }

    fn can_change_image_rotation(&self) -> bool {
        self.flags().contains(VideoCapabilities::CAN_CHANGE_IMAGE_ROTATION)
    }

    fn can_change_demosaicing(&self) -> bool {
        self.flags().contains(VideoCapabilities::CAN_CHANGE_DEMOSAICING)
    }

    fn can_change_deinterlacing(&self) -> bool {
        self.flags().contains(VideoCapabilities::CAN_CHANGE_DEINTERLACING)
    }

    fn can_change_working_zone(&self) -> bool {
        self.flags().contains(VideoCapabilities::CAN_CHANGE_WORKING_ZONE)
    }

    fn can_change_decoding_size(&self) -> bool {
        self.flags().contains(VideoCapabilities::CAN_CHANGE_DECODING_SIZE)
    }

    fn can_scale_indefinitely(&self) -> bool {
        self.flags().contains(VideoCapabilities::CAN_SCALE_INDEFINITELY)
    }

    fn can_stabilize(&self) -> bool {
        self.flags().contains(VideoCapabilities::CAN_STABILIZE)
    }
}

/// Start a lazy, non-restartable walk over the reader's working zone.
///
/// The first frame is the one under `move_first()`. Each following frame comes
/// from `move_next(0, true)` when `interval == 0`, or from
/// `move_to(current + interval)` otherwise. Yielded timestamps are strictly
/// increasing: the walk ends as soon as the cursor stops advancing.
///
/// Fails before touching the cursor if the reader is pre-buffering.
pub fn enumerate_frames<'a>(
    reader: &'a mut dyn VideoReader,
    interval: i64,
) -> Result<FrameEnumerator<'a>, ReaderError> {
    if reader.decoding_mode() == VideoDecodingMode::PreBuffering {
        return Err(ReaderError::EnumerationWhilePreBuffering);
    }
    if !reader.loaded() {
        return Err(ReaderError::NotLoaded);
    }

    debug!(
        "Frame enumeration over {} (interval {})",
        reader.working_zone(),
        interval
    );
    reader.before_frame_enumeration();

    Ok(FrameEnumerator {
        reader,
        interval: interval.max(0),
        started: false,
        has_more: false,
        last_timestamp: None,
    })
}

/// Iterator returned by `enumerate_frames`. Restores the reader through
/// `after_frame_enumeration` when dropped.
pub struct FrameEnumerator<'a> {
    reader: &'a mut dyn VideoReader,
    interval: i64,
    started: bool,
    has_more: bool,
    last_timestamp: Option<i64>,
}

impl FrameEnumerator<'_> {
    fn advance(&mut self) -> bool {
        if !self.started {
            self.started = true;
            return self.reader.move_first();
        }

        if self.interval == 0 {
            self.reader.move_next(0, true)
        } else {
            let current = self.reader.current().map(|f| f.timestamp()).unwrap_or(0);
            self.reader.move_to(current + self.interval)
        }
    }
}

impl Iterator for FrameEnumerator<'_> {
    type Item = VideoFrame;

    fn next(&mut self) -> Option<VideoFrame> {
        if self.started && !self.has_more {
            return None;
        }

        self.has_more = self.advance();

        let frame = self.reader.current()?.clone();
        if self.last_timestamp.is_some_and(|last| frame.timestamp() <= last) {
            self.has_more = false;
            return None;
        }
        self.last_timestamp = Some(frame.timestamp());
        Some(frame)
    }
}

impl Drop for FrameEnumerator<'_> {
    fn drop(&mut self) {
        self.reader.after_frame_enumeration();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Bitmap;
    use std::path::PathBuf;

    /// Minimal on-demand reader over `count` frames spaced by `step`.
    struct ListReader {
        info: VideoInfo,
        options: VideoOptions,
        mode: VideoDecodingMode,
        flags: VideoCapabilities,
        index: Option<usize>,
        current: Option<VideoFrame>,
        enumerations: (usize, usize),
    }

    impl ListReader {
        fn new(count: usize, step: i64) -> Self {
            Self {
                info: VideoInfo::regular(PathBuf::from("list"), Size::new(2, 2), count, 0, step, 25.0),
                options: VideoOptions::default(),
                mode: VideoDecodingMode::OnDemand,
                flags: VideoCapabilities::CAN_DECODE_ON_DEMAND,
                index: None,
                current: None,
                enumerations: (0, 0),
            }
        }

        fn land(&mut self, index: usize) {
            let ts = self.info.first_timestamp + index as i64 * self.info.average_timestamps_per_frame;
            self.index = Some(index);
            self.current = Some(VideoFrame::new(ts, Bitmap::new(2, 2)));
        }
    }

    impl VideoReader for ListReader {
        fn current(&self) -> Option<&VideoFrame> {
            self.current.as_ref()
        }
        fn flags(&self) -> VideoCapabilities {
            self.flags
        }
        fn info(&self) -> &VideoInfo {
            &self.info
        }
        fn loaded(&self) -> bool {
            true
        }
        fn working_zone(&self) -> VideoSection {
            self.info.full_section()
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
        fn open(&mut self, _path: &Path) -> OpenVideoResult {
            OpenVideoResult::Success
        }
        fn close(&mut self) {
            self.current = None;
        }
        fn extract_summary(&mut self, path: &Path, _thumbs: usize, _max_size: Size) -> VideoSummary {
            VideoSummary::unreadable(path)
        }
        fn move_next(&mut self, skip: usize, _decode_if_necessary: bool) -> bool {
            let next = self.index.map(|i| i + skip + 1).unwrap_or(skip);
            let last = self.info.frame_count() - 1;
            self.land(next.min(last));
            next < last
        }
        fn move_to(&mut self, timestamp: i64) -> bool {
            let step = self.info.average_timestamps_per_frame;
            let last = self.info.frame_count() - 1;
            let index = ((timestamp.max(0) + step - 1) / step) as usize;
            self.land(index.min(last));
            self.has_more_frames()
        }
        fn update_working_zone(&mut self, _: VideoSection, _: bool, _: usize, _: &dyn WorkerPool) {}
        fn before_frame_enumeration(&mut self) {
            self.enumerations.0 += 1;
        }
        fn after_frame_enumeration(&mut self) {
            self.enumerations.1 += 1;
        }
    }

    #[test]
    fn test_move_by_steps_on_average_spacing() {
        let mut reader = ListReader::new(10, 100);
        reader.move_first();
        assert!(reader.move_by(3, false));
        assert_eq!(reader.current().unwrap().timestamp(), 300);
        reader.move_by(-5, true);
        assert_eq!(reader.current().unwrap().timestamp(), 0);
    }

    #[test]
    fn test_move_by_one_is_move_next() {
        let mut a = ListReader::new(10, 100);
        let mut b = ListReader::new(10, 100);
        a.move_to(400);
        b.move_to(400);
        a.move_by(1, true);
        b.move_next(0, true);
        assert_eq!(a.current().unwrap().timestamp(), b.current().unwrap().timestamp());
    }

    #[test]
    fn test_has_more_frames() {
        let mut reader = ListReader::new(3, 10);
        assert!(!reader.has_more_frames());
        reader.move_first();
        assert!(reader.has_more_frames());
        reader.move_last();
        assert!(!reader.has_more_frames());
    }

    #[test]
    fn test_switch_mode_follows_flags() {
        let reader = ListReader::new(3, 10);
        assert!(reader.can_switch_decoding_mode(VideoDecodingMode::NotInitialized));
        assert!(reader.can_switch_decoding_mode(VideoDecodingMode::OnDemand));
        assert!(!reader.can_switch_decoding_mode(VideoDecodingMode::PreBuffering));
        assert!(!reader.can_switch_decoding_mode(VideoDecodingMode::Caching));
    }

    #[test]
    fn test_default_adjustments_refuse() {
        let mut reader = ListReader::new(3, 10);
        assert!(!reader.change_aspect_ratio(ImageAspectRatio::Force169));
        assert!(!reader.change_image_rotation(ImageRotation::Rotate90));
        assert!(!reader.change_decoding_size(Size::new(10, 10)));
        assert!(!reader.is_single_frame());
    }

    #[test]
    fn test_enumerate_every_frame() {
        let mut reader = ListReader::new(5, 100);
        let stamps: Vec<i64> = reader
            .frame_enumerator(0)
            .unwrap()
            .map(|f| f.timestamp())
            .collect();
        assert_eq!(stamps, vec![0, 100, 200, 300, 400]);
        assert_eq!(reader.enumerations, (1, 1));
    }

    #[test]
    fn test_enumerate_with_interval() {
        let mut reader = ListReader::new(10, 100);
        let stamps: Vec<i64> = enumerate_frames(&mut reader, 300)
            .unwrap()
            .map(|f| f.timestamp())
            .collect();
        assert_eq!(stamps, vec![0, 300, 600, 900]);
    }

    #[test]
    fn test_enumerate_refused_while_pre_buffering() {
        let mut reader = ListReader::new(10, 100);
        reader.mode = VideoDecodingMode::PreBuffering;
        assert!(matches!(
            reader.frame_enumerator(0),
            Err(ReaderError::EnumerationWhilePreBuffering)
        ));
        assert!(reader.current().is_none());
        assert_eq!(reader.enumerations, (0, 0));
    }
}
