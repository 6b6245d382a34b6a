//! Descriptive metadata of an opened source: sizes, frame rate, timestamp epoch.
//!
//! `VideoInfo` is a snapshot produced at open time. User overrides of frame
//! rate or duration replace the whole struct (`with_frame_rate`, `with_duration`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::frame::Bitmap;
use super::options::ImageRotation;

/// Extension of the companion annotation file.
pub const KVA_EXTENSION: &str = "kva";

/// Pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Swap width and height.
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }

    /// Largest size with the same aspect ratio that fits inside `bounds`.
    /// Never upscales.
    pub fn fit_within(&self, bounds: Size) -> Self {
        if self.is_empty() || bounds.is_empty() {
            return Size::default();
        }
        if self.width <= bounds.width && self.height <= bounds.height {
            return *self;
        }
        let ratio_w = bounds.width as f64 / self.width as f64;
        let ratio_h = bounds.height as f64 / self.height as f64;
        let ratio = ratio_w.min(ratio_h);
        Size::new(
            ((self.width as f64 * ratio).round() as u32).max(1),
            ((self.height as f64 * ratio).round() as u32).max(1),
        )
    }
}

/// Exact ratio, used for sample aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fraction {
    pub numerator: i64,
    pub denominator: i64,
}

impl Fraction {
    pub const fn new(numerator: i64, denominator: i64) -> Self {
        Self { numerator, denominator }
    }

    pub fn is_empty(&self) -> bool {
        self.numerator == 0 || self.denominator == 0
    }

    pub fn as_f64(&self) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            Some(self.numerator as f64 / self.denominator as f64)
        }
    }
}

/// Snapshot of an opened source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub file_path: PathBuf,
    /// Whether `<dir>/<stem>.kva` exists next to the source.
    pub has_kva: bool,
    /// Size stored in the file.
    pub original_size: Size,
    /// Size after pixel aspect ratio correction.
    pub aspect_ratio_size: Size,
    /// Size after aspect correction and rotation. Images are delivered at this size.
    pub reference_size: Size,
    pub pixel_aspect_ratio: f64,
    pub sample_aspect_ratio: Fraction,
    pub average_timestamps_per_frame: i64,
    pub average_timestamps_per_seconds: f64,
    /// Milliseconds between frames.
    pub frame_interval_ms: f64,
    pub first_timestamp: i64,
    pub last_timestamp: i64,
    pub duration_timestamps: i64,
}

impl VideoInfo {
    /// "No video loaded".
    pub fn empty() -> Self {
        Self {
            file_path: PathBuf::new(),
            has_kva: false,
            original_size: Size::default(),
            aspect_ratio_size: Size::default(),
            reference_size: Size::default(),
            pixel_aspect_ratio: 1.0,
            sample_aspect_ratio: Fraction::default(),
            average_timestamps_per_frame: 0,
            average_timestamps_per_seconds: 0.0,
            frame_interval_ms: 0.0,
            first_timestamp: 0,
            last_timestamp: 0,
            duration_timestamps: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.file_path.as_os_str().is_empty() && self.duration_timestamps == 0
    }

    /// Build the info of a source with regular timestamps.
    ///
    /// `frame_count` frames starting at `first_timestamp`, spaced by
    /// `timestamps_per_frame`, played at `fps`. Timelines past `i64::MAX`
    /// saturate.
    pub fn regular(
        file_path: PathBuf,
        size: Size,
        frame_count: usize,
        first_timestamp: i64,
        timestamps_per_frame: i64,
        fps: f64,
    ) -> Self {
        let frames = i64::try_from(frame_count.max(1)).unwrap_or(i64::MAX);
        let has_kva = has_companion_kva(&file_path);
        Self {
            file_path,
            has_kva,
            original_size: size,
            aspect_ratio_size: size,
            reference_size: size,
            pixel_aspect_ratio: 1.0,
            sample_aspect_ratio: Fraction::new(1, 1),
            average_timestamps_per_frame: timestamps_per_frame,
            average_timestamps_per_seconds: timestamps_per_frame as f64 * fps,
            frame_interval_ms: if fps > 0.0 { 1000.0 / fps } else { 0.0 },
            first_timestamp,
            last_timestamp: first_timestamp.saturating_add((frames - 1).saturating_mul(timestamps_per_frame)),
            duration_timestamps: frames.saturating_mul(timestamps_per_frame),
        }
    }

    /// Full timeline as a section.
    pub fn full_section(&self) -> super::section::VideoSection {
        if self.duration_timestamps <= 0 {
            return super::section::VideoSection::EMPTY;
        }
        super::section::VideoSection::new(self.first_timestamp, self.last_timestamp)
    }

    /// Number of frames, derived from duration and frame spacing.
    pub fn frame_count(&self) -> usize {
        if self.average_timestamps_per_frame <= 0 {
            return 0;
        }
        (self.duration_timestamps / self.average_timestamps_per_frame).max(0) as usize
    }

    pub fn duration_ms(&self) -> f64 {
        if self.average_timestamps_per_seconds <= 0.0 {
            return 0.0;
        }
        self.duration_timestamps as f64 * 1000.0 / self.average_timestamps_per_seconds
    }

    /// Override of the playback frame rate. Timestamps are unchanged.
    pub fn with_frame_rate(&self, fps: f64) -> Self {
        let mut info = self.clone();
        if fps > 0.0 {
            info.average_timestamps_per_seconds = self.average_timestamps_per_frame as f64 * fps;
            info.frame_interval_ms = 1000.0 / fps;
        }
        info
    }

    /// Override of the duration, in timestamps.
    pub fn with_duration(&self, duration_timestamps: i64) -> Self {
        let mut info = self.clone();
        let spacing = self.average_timestamps_per_frame.max(1);
        info.duration_timestamps = duration_timestamps.max(spacing);
        info.last_timestamp = self.first_timestamp + info.duration_timestamps - spacing;
        info
    }

    /// Apply a rotation to the aspect-corrected size.
    pub fn with_rotation(&self, rotation: ImageRotation) -> Self {
        let mut info = self.clone();
        info.reference_size = if rotation.swaps_axes() {
            self.aspect_ratio_size.transposed()
        } else {
            self.aspect_ratio_size
        };
        info
    }
}

impl Default for VideoInfo {
    fn default() -> Self {
        Self::empty()
    }
}

/// Lightweight description used for library/browser previews.
#[derive(Debug, Clone)]
pub struct VideoSummary {
    pub filename: PathBuf,
    pub is_image: bool,
    pub has_kva: bool,
    pub image_size: Size,
    pub duration_ms: i64,
    pub thumbs: Vec<Bitmap>,
}

impl VideoSummary {
    /// Summary of a source that could not be read.
    pub fn unreadable(filename: &Path) -> Self {
        Self {
            filename: filename.to_path_buf(),
            is_image: false,
            has_kva: has_companion_kva(filename),
            image_size: Size::default(),
            duration_ms: 0,
            thumbs: Vec::new(),
        }
    }
}

/// `<dir>/<stem>.kva` next to the media file.
pub fn companion_kva_path(path: &Path) -> PathBuf {
    path.with_extension(KVA_EXTENSION)
}

pub fn has_companion_kva(path: &Path) -> bool {
    if path.as_os_str().is_empty() {
        return false;
    }
    companion_kva_path(path).is_file()
}
