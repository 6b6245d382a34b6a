//! vidcache - video reader contract and working-zone frame cache
//!
//! Re-exports all modules for use by binary targets.

// Core engine (reader contract, caches, workers, registry)
pub mod core;

// Value types and concrete backends
pub mod entities;
pub mod readers;

// App modules
pub mod cli;
pub mod config;
pub mod utils;

// Re-export commonly used types from core
pub use core::cache_man::CacheManager;
pub use core::event_bus::{BoxedEvent, EventBus, downcast_event};
pub use core::reader::{FrameEnumerator, ReaderError, VideoReader, enumerate_frames};
pub use core::registry::{VideoLoadAsked, VideoTypeManager};

// Re-export entities
pub use entities::{
    Bitmap, OpenVideoResult, SaveResult, Size, VideoCapabilities, VideoDecodingMode, VideoFrame, VideoInfo,
    VideoOptions, VideoSection, VideoSummary,
};
