//! Frame export
//!
//! Writes the reader's working zone to numbered PNG files, one per enumerated
//! frame: `<dir>/<stem>_<timestamp>.png`. Pixels are converted back to
//! straight alpha for the encoder.

use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::reader::{ReaderError, VideoReader, enumerate_frames};
use crate::entities::{SaveResult, VideoFrame};

/// Outcome of a `save_frames` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub result: SaveResult,
    pub written: Vec<PathBuf>,
}

/// File name of an exported frame.
pub fn frame_file_name(stem: &str, timestamp: i64) -> String {
    format!("{}_{:06}.png", stem, timestamp)
}

/// Write one frame as PNG.
pub fn save_frame(frame: &VideoFrame, path: &Path) -> SaveResult {
    match frame.image().to_straight().save(path) {
        Ok(()) => SaveResult::Success,
        Err(e) => {
            warn!("Cannot write {}: {}", path.display(), e);
            SaveResult::WritingError
        }
    }
}

/// Export every `interval` timestamps of the working zone (`0` = every frame).
pub fn save_frames(reader: &mut dyn VideoReader, interval: i64, dir: &Path, stem: &str) -> SaveResult {
    save_frames_cancellable(reader, interval, dir, stem, &AtomicBool::new(false)).result
}

/// `save_frames` with a cancel flag checked between frames. Files written
/// before cancellation are kept and listed in the report.
pub fn save_frames_cancellable(
    reader: &mut dyn VideoReader,
    interval: i64,
    dir: &Path,
    stem: &str,
    cancel_flag: &AtomicBool,
) -> ExportReport {
    let mut report = ExportReport {
        result: SaveResult::Success,
        written: Vec::new(),
    };

    if !reader.loaded() {
        report.result = SaveResult::MovieNotLoaded;
        return report;
    }
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!("Cannot create {}: {}", dir.display(), e);
        report.result = SaveResult::FileNotOpened;
        return report;
    }

    info!(
        "Exporting {} of {} to {}",
        reader.working_zone(),
        reader.file_path().display(),
        dir.display()
    );

    let frames = match enumerate_frames(reader, interval) {
        Ok(frames) => frames,
        Err(ReaderError::NotLoaded) => {
            report.result = SaveResult::MovieNotLoaded;
            return report;
        }
        Err(e) => {
            warn!("Export refused: {}", e);
            report.result = SaveResult::ReadingError;
            return report;
        }
    };

    for frame in frames {
        if cancel_flag.load(Ordering::Relaxed) {
            report.result = SaveResult::Cancelled;
            break;
        }
        let path = dir.join(frame_file_name(stem, frame.timestamp()));
        let result = save_frame(&frame, &path);
        if result != SaveResult::Success {
            report.result = result;
            break;
        }
        debug!("Wrote {}", path.display());
        report.written.push(path);
    }

    if report.result == SaveResult::Success && report.written.is_empty() {
        // Loaded but nothing under the cursor, e.g. an unpopulated cache
        report.result = SaveResult::ReadingError;
    }
    info!("Export ended: {:?}, {} files", report.result, report.written.len());
    report
}
