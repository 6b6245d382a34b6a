//! Core engine modules - reader contract, caches, background work, registry
//!
//! These modules form the playback engine, independent of any backend.

pub mod cache;
pub mod cache_man;
pub mod caching;
pub mod event_bus;
pub mod export;
pub mod prebuffer;
pub mod reader;
pub mod registry;
pub mod workers;

// Re-exports for convenience
pub use cache::{Cache, PushOutcome};
pub use cache_man::CacheManager;
pub use caching::{CachingPlayback, PopulationOutcome, PopulationReport, populate};
pub use event_bus::EventBus;
pub use export::{ExportReport, save_frame, save_frames, save_frames_cancellable};
pub use prebuffer::PreBuffer;
pub use reader::{FrameEnumerator, ReaderError, VideoReader, enumerate_frames};
pub use registry::{VideoLoadAsked, VideoTypeManager};
pub use workers::{Inline, SpawnThread, Workers};
