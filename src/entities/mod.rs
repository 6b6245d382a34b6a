//! Entities module - value types exchanged between readers, caches and consumers
//!
//! Leaf layer: nothing here depends on `core/` or `readers/`.

pub mod frame;
pub mod info;
pub mod loader;
pub mod options;
pub mod section;
pub mod traits;

pub use frame::{Bitmap, FrameError, VideoFrame};
pub use info::{Fraction, Size, VideoInfo, VideoSummary, companion_kva_path, has_companion_kva};
pub use loader::{DecodeParams, Loader};
pub use options::{
    Demosaicing, ImageAspectRatio, ImageRotation, OpenVideoResult, SaveResult, VideoCapabilities,
    VideoDecodingMode, VideoOptions,
};
pub use section::VideoSection;
pub use traits::{FrameSource, WorkerPool};
