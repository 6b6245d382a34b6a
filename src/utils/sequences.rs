//! Image sequence detection utilities
//!
//! A file named `<prefix><digits>.<ext>` is a frame of a numbered sequence.
//! Opening one frame opens the contiguous run of numbers around it, e.g.
//! `shot_0007.png` in a folder holding `shot_0001..0040.png` yields all 40.

use log::{debug, info};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::entities::frame::FrameError;

/// Parsed sequence filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceParts {
    /// Directory plus the stem before the digits, e.g. `/path/seq.`
    pub prefix: String,
    pub number: usize,
    pub ext: String,
    /// Digit count in the filename.
    pub padding: usize,
}

impl SequenceParts {
    /// Glob pattern matching every frame of this sequence.
    pub fn pattern(&self) -> String {
        format!("{}*.{}", glob::Pattern::escape(&self.prefix), glob::Pattern::escape(&self.ext))
    }
}

/// Frames of the sequence `path` belongs to, in frame-number order.
///
/// A file without trailing digits, or whose siblings cannot be listed, is a
/// sequence of one.
pub fn detect_sequence(path: &Path) -> Result<Vec<PathBuf>, FrameError> {
    let Some(parts) = split_sequence_path(path)? else {
        return Ok(vec![path.to_path_buf()]);
    };

    let pattern = parts.pattern();
    let mut numbered: BTreeMap<usize, PathBuf> = BTreeMap::new();
    for candidate in glob_paths(&pattern)? {
        match split_sequence_path(&candidate)? {
            Some(p) if p.prefix == parts.prefix && p.ext.eq_ignore_ascii_case(&parts.ext) => {
                numbered.entry(p.number).or_insert(candidate);
            }
            _ => {}
        }
    }

    if !numbered.contains_key(&parts.number) {
        debug!("{} not listed by {}, opening it alone", path.display(), pattern);
        return Ok(vec![path.to_path_buf()]);
    }

    // Contiguous run around the requested frame
    let mut first = parts.number;
    while first > 0 && numbered.contains_key(&(first - 1)) {
        first -= 1;
    }
    let frames: Vec<PathBuf> = numbered
        .range(first..)
        .zip(first..)
        .take_while(|((number, _), expected)| *number == expected)
        .map(|((_, p), _)| p.clone())
        .collect();

    info!("Detected sequence: {} ({} frames from {})", pattern, frames.len(), first);
    Ok(frames)
}

/// Expand a glob pattern into a list of paths
pub fn glob_paths(pattern: &str) -> Result<Vec<PathBuf>, FrameError> {
    let mut paths = Vec::new();
    for entry in glob::glob(pattern)
        .map_err(|e| FrameError::Io(format!("Glob error for pattern {}: {}", pattern, e)))?
    {
        match entry {
            Ok(path) => paths.push(path),
            Err(e) => return Err(FrameError::Io(format!("Glob entry error: {}", e))),
        }
    }
    Ok(paths)
}

/// Split a sequence filename into prefix, number, extension and padding.
///
/// Example: "/path/seq.0001.png" -> ("/path/seq.", 1, "png", 4)
pub fn split_sequence_path(path: &Path) -> Result<Option<SequenceParts>, FrameError> {
    let ext = match path.extension().and_then(|s| s.to_str()) {
        Some(e) => e.to_string(),
        None => return Ok(None),
    };

    let stem = match path.file_stem().and_then(|s| s.to_str()) {
        Some(s) => s,
        None => return Ok(None),
    };

    // Trailing digits of the stem
    let digit_start = stem
        .char_indices()
        .rev()
        .take_while(|(_, ch)| ch.is_ascii_digit())
        .last()
        .map(|(i, _)| i);
    let Some(digit_start) = digit_start else {
        return Ok(None);
    };

    // Digit runs too long for a frame number (timestamps, hashes) are not frames
    let number_str = &stem[digit_start..];
    let Ok(number) = number_str.parse::<usize>() else {
        return Ok(None);
    };

    let mut prefix = String::new();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        prefix.push_str(&parent.to_string_lossy());
        if !prefix.ends_with(std::path::MAIN_SEPARATOR) {
            prefix.push(std::path::MAIN_SEPARATOR);
        }
    }
    prefix.push_str(&stem[..digit_start]);

    Ok(Some(SequenceParts {
        prefix,
        number,
        ext,
        padding: number_str.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sequence_path() {
        let parts = split_sequence_path(Path::new("/shots/seq.0042.png")).unwrap().unwrap();
        assert_eq!(parts.number, 42);
        assert_eq!(parts.padding, 4);
        assert_eq!(parts.ext, "png");
        assert!(parts.prefix.ends_with("seq."));

        assert!(split_sequence_path(Path::new("/shots/still.png")).unwrap().is_none());
        assert!(split_sequence_path(Path::new("/shots/0001")).unwrap().is_none());
    }

    #[test]
    fn test_detect_contiguous_run() {
        let dir = tempfile::tempdir().unwrap();
        for n in [1, 2, 3, 4, 6, 7] {
            std::fs::write(dir.path().join(format!("take_{:03}.png", n)), b"").unwrap();
        }
        std::fs::write(dir.path().join("other_002.png"), b"").unwrap();

        let frames = detect_sequence(&dir.path().join("take_002.png")).unwrap();
        let names: Vec<String> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["take_001.png", "take_002.png", "take_003.png", "take_004.png"]);

        let tail = detect_sequence(&dir.path().join("take_007.png")).unwrap();
        assert_eq!(tail.len(), 2);
    }

    /// Overlong digit runs open alone and never break a sibling sequence.
    #[test]
    fn test_long_digit_run() {
        let dir = tempfile::tempdir().unwrap();
        for n in 1..=3 {
            std::fs::write(dir.path().join(format!("shot_{:04}.png", n)), b"").unwrap();
        }
        let stray = dir.path().join("shot_123456789012345678901234.png");
        std::fs::write(&stray, b"").unwrap();

        assert!(split_sequence_path(&stray).unwrap().is_none());
        assert_eq!(detect_sequence(&dir.path().join("shot_0001.png")).unwrap().len(), 3);
        assert_eq!(detect_sequence(&stray).unwrap(), vec![stray]);
    }

    #[test]
    fn test_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.png");
        std::fs::write(&path, b"").unwrap();
        assert_eq!(detect_sequence(&path).unwrap(), vec![path]);
    }
}
