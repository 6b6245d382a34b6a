//! Working-zone frame store with random seek
//!
//! **Why**: Some backends can only decode sequentially, or too slowly for
//! scrubbing and backward play. For those the whole working zone is decoded
//! once into memory and every seek becomes an index lookup.
//!
//! **Used by**: `CachingPlayback` (population writes, playback reads)
//!
//! # Invariants
//!
//! - Frames are stored in strictly increasing timestamp order.
//! - The cursor is a valid index whenever the store is non-empty.
//! - `working_zone()` is `[first.timestamp, last.timestamp]`, or empty.
//! - Total bytes never exceed the ceiling passed to `try_push`.
//!
//! # Threading
//!
//! The population job appends from a worker thread while the control thread
//! moves the cursor. Appending never moves the cursor, and only the move
//! methods change which frame is current.

use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::cache_man::CacheManager;
use crate::entities::{VideoFrame, VideoSection};

/// Result of an append attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Stored,
    /// The frame would take the store past the ceiling. Nothing was stored.
    CeilingReached,
    /// Timestamp not greater than the last stored frame. Nothing was stored.
    OutOfOrder,
}

#[derive(Debug, Default)]
struct CacheInner {
    frames: Vec<VideoFrame>,
    cursor: usize,
    bytes: usize,
}

impl CacheInner {
    fn working_zone(&self) -> VideoSection {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => VideoSection::new(first.timestamp(), last.timestamp()),
            _ => VideoSection::EMPTY,
        }
    }

    /// First index whose timestamp is >= `timestamp`.
    fn index_at_or_after(&self, timestamp: i64) -> usize {
        self.frames.partition_point(|f| f.timestamp() < timestamp)
    }
}

/// Bounded, timestamp-ordered store of decoded frames plus a cursor.
#[derive(Debug, Default)]
pub struct Cache {
    inner: Mutex<CacheInner>,
    manager: Option<Arc<CacheManager>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache whose bytes are reported to a shared manager.
    pub fn with_manager(manager: Arc<CacheManager>) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            manager: Some(manager),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `[first, last]` stored timestamps, empty when nothing is stored.
    pub fn working_zone(&self) -> VideoSection {
        self.lock().working_zone()
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    /// Bytes held by stored frames.
    pub fn mem(&self) -> usize {
        self.lock().bytes
    }

    pub fn cursor(&self) -> Option<usize> {
        let inner = self.lock();
        if inner.frames.is_empty() { None } else { Some(inner.cursor) }
    }

    /// Frame under the cursor.
    pub fn current(&self) -> Option<VideoFrame> {
        let inner = self.lock();
        inner.frames.get(inner.cursor).cloned()
    }

    /// Stored timestamps in order.
    pub fn timestamps(&self) -> Vec<i64> {
        self.lock().frames.iter().map(|f| f.timestamp()).collect()
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.working_zone().contains(timestamp)
    }

    /// Whether at least `count` frames follow the cursor.
    pub fn has_next(&self, count: usize) -> bool {
        let inner = self.lock();
        !inner.frames.is_empty() && inner.cursor + count < inner.frames.len()
    }

    /// Move the cursor by `offset` positions.
    ///
    /// Out of range moves clamp to the first/last frame and return false.
    pub fn move_by(&self, offset: isize) -> bool {
        let mut inner = self.lock();
        if inner.frames.is_empty() {
            return false;
        }
        let last = inner.frames.len() - 1;
        let target = inner.cursor as isize + offset;
        if target < 0 {
            inner.cursor = 0;
            false
        } else if target as usize > last {
            inner.cursor = last;
            false
        } else {
            inner.cursor = target as usize;
            true
        }
    }

    /// Move the cursor to the first frame whose timestamp is >= `timestamp`.
    ///
    /// Returns false and leaves the cursor alone if `timestamp` is outside the
    /// working zone. Deterministic: the same timestamp always lands on the same frame.
    pub fn move_to(&self, timestamp: i64) -> bool {
        let mut inner = self.lock();
        if !inner.working_zone().contains(timestamp) {
            return false;
        }
        // Inside the zone, so some frame has ts >= timestamp.
        inner.cursor = inner.index_at_or_after(timestamp);
        true
    }

    pub fn move_first(&self) -> bool {
        let mut inner = self.lock();
        if inner.frames.is_empty() {
            return false;
        }
        inner.cursor = 0;
        true
    }

    pub fn move_last(&self) -> bool {
        let mut inner = self.lock();
        if inner.frames.is_empty() {
            return false;
        }
        inner.cursor = inner.frames.len() - 1;
        true
    }

    /// Append a frame if it keeps the store ordered and under `max_bytes`.
    pub fn try_push(&self, frame: VideoFrame, max_bytes: usize) -> PushOutcome {
        let mut inner = self.lock();

        if let Some(last) = inner.frames.last() {
            if frame.timestamp() <= last.timestamp() {
                warn!(
                    "Rejected out of order frame {} (last stored {})",
                    frame.timestamp(),
                    last.timestamp()
                );
                return PushOutcome::OutOfOrder;
            }
        }

        let size = frame.mem();
        if inner.bytes + size > max_bytes {
            return PushOutcome::CeilingReached;
        }

        inner.bytes += size;
        inner.frames.push(frame);
        if let Some(manager) = &self.manager {
            manager.add_memory(size);
        }
        PushOutcome::Stored
    }

    /// Drop every frame outside `zone`, keeping the cursor on the same frame
    /// when it survives, or on the nearest surviving one otherwise.
    pub fn retain_within(&self, zone: VideoSection) {
        let mut inner = self.lock();
        if inner.frames.is_empty() {
            return;
        }

        let current_ts = inner.frames[inner.cursor].timestamp();
        let before = inner.frames.len();
        let mut freed = 0usize;
        inner.frames.retain(|f| {
            let keep = zone.contains(f.timestamp());
            if !keep {
                freed += f.mem();
            }
            keep
        });
        inner.bytes -= freed;
        if let Some(manager) = &self.manager {
            manager.free_memory(freed);
        }

        let len = inner.frames.len();
        inner.cursor = inner.index_at_or_after(current_ts).min(len.saturating_sub(1));

        debug!(
            "Cache purged to {}: {} -> {} frames, {} KB freed",
            zone,
            before,
            len,
            freed / 1024
        );
    }

    /// Drop trailing frames until the store fits in `max_bytes`.
    /// Returns the number of frames dropped.
    pub fn truncate_to(&self, max_bytes: usize) -> usize {
        let mut inner = self.lock();
        let mut dropped = 0usize;
        let mut freed = 0usize;
        while inner.bytes > max_bytes {
            let Some(frame) = inner.frames.pop() else {
                break;
            };
            inner.bytes -= frame.mem();
            freed += frame.mem();
            dropped += 1;
        }
        if dropped == 0 {
            return 0;
        }

        inner.cursor = inner.cursor.min(inner.frames.len().saturating_sub(1));
        if let Some(manager) = &self.manager {
            manager.free_memory(freed);
        }
        debug!("Cache truncated to {} bytes: {} frames dropped", max_bytes, dropped);
        dropped
    }

    /// Release every frame.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let freed = inner.bytes;
        let count = inner.frames.len();
        inner.frames.clear();
        inner.cursor = 0;
        inner.bytes = 0;
        if let Some(manager) = &self.manager {
            manager.free_memory(freed);
        }
        if count > 0 {
            debug!("Cache cleared: {} frames, {} KB freed", count, freed / 1024);
        }
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        self.clear();
    }
}
