//! Abstract traits for dependency inversion.
//!
//! Backends expose their decoder as a `FrameSource` so that the engine in
//! `core/` can run population and pre-buffering jobs without knowing the
//! format. Background jobs are started through a `WorkerPool` supplied by
//! the caller.
//!
//! Implementations live in `core/` (pools) and `readers/` (sources).

use std::sync::Arc;

use super::frame::{FrameError, VideoFrame};

/// Sequential frame decoder detached from any reader state.
///
/// Sources are moved to background threads, so they own everything they need
/// (file list, decoder handle, generation parameters).
pub trait FrameSource: Send + 'static {
    /// Position the source so that the next decoded frame is the first one
    /// whose timestamp is at or after `timestamp`.
    fn seek(&mut self, timestamp: i64) -> Result<(), FrameError>;

    /// Decode the next frame in increasing timestamp order, `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, FrameError>;
}

impl FrameSource for Box<dyn FrameSource> {
    fn seek(&mut self, timestamp: i64) -> Result<(), FrameError> {
        (**self).seek(timestamp)
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>, FrameError> {
        (**self).next_frame()
    }
}

/// Background work starter.
///
/// This is the hook callers pass to `update_working_zone` and pre-buffering:
/// the engine hands over a job, the pool decides which thread runs it.
pub trait WorkerPool: Send + Sync {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>);
}

/// Blanket impl: Arc<T> implements the trait if T does
impl<T: WorkerPool + ?Sized> WorkerPool for Arc<T> {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        (**self).execute(job)
    }
}
