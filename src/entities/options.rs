//! Reader configuration, capability flags, decoding modes and status codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use super::info::Size;

/// Forced display aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageAspectRatio {
    /// Use the pixel aspect ratio stored in the file.
    #[default]
    Auto,
    Force43,
    Force169,
    /// Ignore the stored pixel aspect ratio.
    ForcedSquarePixels,
}

impl ImageAspectRatio {
    /// Display size for an image of `original` pixels with the given pixel aspect ratio.
    pub fn apply(&self, original: Size, pixel_aspect_ratio: f64) -> Size {
        match self {
            ImageAspectRatio::Auto => {
                if pixel_aspect_ratio > 0.0 && pixel_aspect_ratio != 1.0 {
                    Size::new((original.width as f64 * pixel_aspect_ratio).round() as u32, original.height)
                } else {
                    original
                }
            }
            ImageAspectRatio::Force43 => Size::new((original.height as f64 * 4.0 / 3.0).round() as u32, original.height),
            ImageAspectRatio::Force169 => Size::new((original.height as f64 * 16.0 / 9.0).round() as u32, original.height),
            ImageAspectRatio::ForcedSquarePixels => original,
        }
    }
}

/// Clockwise rotation applied after aspect correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageRotation {
    #[default]
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl ImageRotation {
    pub fn degrees(&self) -> u32 {
        match self {
            ImageRotation::Rotate0 => 0,
            ImageRotation::Rotate90 => 90,
            ImageRotation::Rotate180 => 180,
            ImageRotation::Rotate270 => 270,
        }
    }

    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(ImageRotation::Rotate0),
            90 => Some(ImageRotation::Rotate90),
            180 => Some(ImageRotation::Rotate180),
            270 => Some(ImageRotation::Rotate270),
            _ => None,
        }
    }

    pub fn swaps_axes(&self) -> bool {
        matches!(self, ImageRotation::Rotate90 | ImageRotation::Rotate270)
    }
}

/// Bayer pattern for raw sensor images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Demosaicing {
    #[default]
    None,
    Rggb,
    Bggr,
    Grbg,
    Gbrg,
}

/// Image-level options carried by every reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoOptions {
    pub image_aspect_ratio: ImageAspectRatio,
    pub image_rotation: ImageRotation,
    pub demosaicing: Demosaicing,
    pub deinterlace: bool,
}

/// Optional operations a backend supports.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VideoCapabilities(u32);

impl VideoCapabilities {
    pub const NONE: Self = Self(0);
    pub const CAN_DECODE_ON_DEMAND: Self = Self(1);
    pub const CAN_PRE_BUFFER: Self = Self(1 << 1);
    pub const CAN_CACHE: Self = Self(1 << 2);
    pub const CAN_CHANGE_ASPECT_RATIO: Self = Self(1 << 3);
    pub const CAN_CHANGE_IMAGE_ROTATION: Self = Self(1 << 4);
    pub const CAN_CHANGE_DEMOSAICING: Self = Self(1 << 5);
    pub const CAN_CHANGE_DEINTERLACING: Self = Self(1 << 6);
    pub const CAN_CHANGE_WORKING_ZONE: Self = Self(1 << 7);
    pub const CAN_CHANGE_DECODING_SIZE: Self = Self(1 << 8);
    pub const CAN_SCALE_INDEFINITELY: Self = Self(1 << 9);
    pub const CAN_STABILIZE: Self = Self(1 << 10);

    const NAMES: [(Self, &'static str); 11] = [
        (Self::CAN_DECODE_ON_DEMAND, "DecodeOnDemand"),
        (Self::CAN_PRE_BUFFER, "PreBuffer"),
        (Self::CAN_CACHE, "Cache"),
        (Self::CAN_CHANGE_ASPECT_RATIO, "ChangeAspectRatio"),
        (Self::CAN_CHANGE_IMAGE_ROTATION, "ChangeImageRotation"),
        (Self::CAN_CHANGE_DEMOSAICING, "ChangeDemosaicing"),
        (Self::CAN_CHANGE_DEINTERLACING, "ChangeDeinterlacing"),
        (Self::CAN_CHANGE_WORKING_ZONE, "ChangeWorkingZone"),
        (Self::CAN_CHANGE_DECODING_SIZE, "ChangeDecodingSize"),
        (Self::CAN_SCALE_INDEFINITELY, "ScaleIndefinitely"),
        (Self::CAN_STABILIZE, "Stabilize"),
    ];

    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// All bits of `other` are set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for VideoCapabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for VideoCapabilities {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for VideoCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "VideoCapabilities({})", names.join(" | "))
    }
}

/// How frames are produced relative to playback requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoDecodingMode {
    /// Before `open` and after `close`.
    #[default]
    NotInitialized,
    /// Each request decodes synchronously.
    OnDemand,
    /// A background job decodes ahead of the playhead.
    PreBuffering,
    /// The whole working zone is decoded into memory.
    Caching,
}

/// Outcome of `VideoReader::open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenVideoResult {
    Success,
    FileNotOpened,
    StreamInfoNotFound,
    VideoStreamNotFound,
    CodecNotFound,
    CodecNotOpened,
    CodecNotSupported,
    Cancelled,
    EmptySource,
    UnknownError,
}

impl OpenVideoResult {
    pub fn is_success(&self) -> bool {
        matches!(self, OpenVideoResult::Success)
    }
}

impl fmt::Display for OpenVideoResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            OpenVideoResult::Success => "success",
            OpenVideoResult::FileNotOpened => "file not found or not opened",
            OpenVideoResult::StreamInfoNotFound => "stream information not found",
            OpenVideoResult::VideoStreamNotFound => "no video stream",
            OpenVideoResult::CodecNotFound => "codec not found",
            OpenVideoResult::CodecNotOpened => "codec could not be opened",
            OpenVideoResult::CodecNotSupported => "codec not supported",
            OpenVideoResult::Cancelled => "cancelled",
            OpenVideoResult::EmptySource => "source contains no frame",
            OpenVideoResult::UnknownError => "unknown error",
        };
        f.write_str(text)
    }
}

/// Outcome of a save/export operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveResult {
    Success,
    MovieNotLoaded,
    FileNotOpened,
    EncoderNotFound,
    ReadingError,
    WritingError,
    Cancelled,
    UnknownError,
}

impl fmt::Display for SaveResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SaveResult::Success => "success",
            SaveResult::MovieNotLoaded => "no video loaded",
            SaveResult::FileNotOpened => "output could not be opened",
            SaveResult::EncoderNotFound => "no encoder for the requested format",
            SaveResult::ReadingError => "error while reading frames",
            SaveResult::WritingError => "error while writing frames",
            SaveResult::Cancelled => "cancelled",
            SaveResult::UnknownError => "unknown error",
        };
        f.write_str(text)
    }
}
