//! Always-caching playback helper
//!
//! **Why**: Backends that cannot seek cheaply decode their whole working zone
//! into a `Cache` and serve every move from memory. The bookkeeping is the
//! same for all of them, so it lives here and backends embed a
//! `CachingPlayback` and forward their `VideoReader` calls to it.
//!
//! # Population
//!
//! `update_working_zone` hands a `FrameSource` to a background job that seeks
//! it to the zone start and stores frames in increasing order until the zone
//! end, the memory ceiling, the end of the source, or cancellation. When the
//! ceiling stops the pass, the cached zone is `[start, last stored]`.
//!
//! # Single flight
//!
//! Each helper owns an epoch counter. A new pass bumps the epoch (the running
//! pass checks it between frames and stops), waits for the previous pass to
//! finish, then starts. `close` cancels and waits the same way.
//!
//! # Threading
//!
//! The job only writes into the `Cache`. `current` belongs to the controlling
//! thread and only changes in move calls and `update_working_zone`.

use crossbeam_channel::{Receiver, TryRecvError};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::core::cache::{Cache, PushOutcome};
use crate::core::cache_man::CacheManager;
use crate::entities::{FrameSource, VideoFrame, VideoSection, WorkerPool};

/// How a population pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopulationOutcome {
    /// Every frame of the zone (or of the source) is cached.
    Completed,
    /// Stopped because the next frame would exceed the ceiling.
    CeilingReached,
    /// Superseded by a newer pass or by `close`.
    Cancelled,
    /// Source error. Frames stored before the error stay cached.
    Failed(String),
}

/// Summary of the last population pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationReport {
    /// Zone the caller asked for.
    pub requested: VideoSection,
    /// Zone actually cached.
    pub cached: VideoSection,
    pub frames: usize,
    pub bytes: usize,
    pub outcome: PopulationOutcome,
}

impl PopulationReport {
    /// Ceiling hit before a single frame fit: the reader has nothing to play.
    pub fn is_degraded(&self) -> bool {
        self.frames == 0 && self.outcome == PopulationOutcome::CeilingReached
    }
}

/// Decode `zone` from `source` into `cache` until done, full or cancelled.
///
/// `cancelled` is checked before every decode and again before every insert.
pub fn populate<F>(
    source: &mut dyn FrameSource,
    cache: &Cache,
    zone: VideoSection,
    max_memory: usize,
    cancelled: F,
) -> PopulationReport
where
    F: Fn() -> bool,
{
    let mut frames = 0usize;
    let mut bytes = 0usize;

    let outcome = match source.seek(zone.start) {
        Err(e) => PopulationOutcome::Failed(e.to_string()),
        Ok(()) => loop {
            if cancelled() {
                break PopulationOutcome::Cancelled;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break PopulationOutcome::Completed,
                Err(e) => break PopulationOutcome::Failed(e.to_string()),
            };

            if frame.timestamp() < zone.start {
                continue;
            }
            if frame.timestamp() > zone.end {
                break PopulationOutcome::Completed;
            }
            if cancelled() {
                break PopulationOutcome::Cancelled;
            }

            let size = frame.mem();
            match cache.try_push(frame, max_memory) {
                PushOutcome::Stored => {
                    frames += 1;
                    bytes += size;
                }
                PushOutcome::CeilingReached => break PopulationOutcome::CeilingReached,
                PushOutcome::OutOfOrder => continue,
            }
        },
    };

    PopulationReport {
        requested: zone,
        cached: cache.working_zone(),
        frames,
        bytes,
        outcome,
    }
}

/// Working-zone cache, cursor and population job of one reader.
#[derive(Debug)]
pub struct CachingPlayback {
    cache: Arc<Cache>,
    current: Option<VideoFrame>,
    epoch: Arc<AtomicU64>,
    /// Disconnects when the running pass ends.
    pending: Option<Receiver<()>>,
    report: Arc<Mutex<Option<PopulationReport>>>,
}

impl Default for CachingPlayback {
    fn default() -> Self {
        Self::new()
    }
}

impl CachingPlayback {
    pub fn new() -> Self {
        Self::from_cache(Cache::new())
    }

    /// Helper whose cache reports its bytes to `manager`.
    pub fn with_manager(manager: Arc<CacheManager>) -> Self {
        Self::from_cache(Cache::with_manager(manager))
    }

    fn from_cache(cache: Cache) -> Self {
        Self {
            cache: Arc::new(cache),
            current: None,
            epoch: Arc::new(AtomicU64::new(0)),
            pending: None,
            report: Arc::new(Mutex::new(None)),
        }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn current(&self) -> Option<&VideoFrame> {
        self.current.as_ref()
    }

    /// Zone held in memory right now. Grows while a pass is running.
    pub fn working_zone(&self) -> VideoSection {
        self.cache.working_zone()
    }

    pub fn last_population(&self) -> Option<PopulationReport> {
        self.report.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_degraded(&self) -> bool {
        self.last_population().is_some_and(|r| r.is_degraded())
    }

    pub fn is_populating(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|rx| matches!(rx.try_recv(), Err(TryRecvError::Empty)))
    }

    /// Ask the running pass to stop. Does not wait.
    pub fn cancel(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Block until the running pass (if any) has ended.
    pub fn join_population(&mut self) {
        if let Some(rx) = self.pending.take() {
            // Err means the job dropped its sender: finished or never ran.
            let _ = rx.recv();
        }
    }

    /// Make `zone` the cached working zone.
    ///
    /// A zone inside the cached range is served by dropping the frames around
    /// it, unless `force_reload`. Anything else clears the cache and starts a
    /// population pass of `source` on `workers`.
    pub fn update_working_zone(
        &mut self,
        zone: VideoSection,
        force_reload: bool,
        max_memory: usize,
        workers: &dyn WorkerPool,
        mut source: Box<dyn FrameSource>,
    ) {
        self.cancel();
        self.join_population();

        if zone.is_empty() || zone.is_wrapped() {
            warn!("Ignoring invalid working zone {}", zone);
            return;
        }

        let cached = self.cache.working_zone();
        if !force_reload && cached.contains_section(&zone) {
            self.cache.retain_within(zone);
            // The new ceiling binds the frames kept as well
            let outcome = if self.cache.truncate_to(max_memory) > 0 {
                warn!("Memory ceiling reached: working zone truncated to {}", self.cache.working_zone());
                PopulationOutcome::CeilingReached
            } else {
                PopulationOutcome::Completed
            };
            if self.current.is_some() {
                self.current = self.cache.current();
            }
            info!("Working zone {} served from cached {}", zone, cached);
            self.store_report(PopulationReport {
                requested: zone,
                cached: self.cache.working_zone(),
                frames: self.cache.len(),
                bytes: self.cache.mem(),
                outcome,
            });
            return;
        }

        self.cache.clear();
        self.current = None;

        let epoch = self.epoch.load(Ordering::SeqCst);
        let epoch_cell = Arc::clone(&self.epoch);
        let cache = Arc::clone(&self.cache);
        let report = Arc::clone(&self.report);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
        self.pending = Some(done_rx);

        info!(
            "Populating working zone {} (ceiling {} MB)",
            zone,
            max_memory / 1024 / 1024
        );

        workers.execute(Box::new(move || {
            let started = Instant::now();
            let result = populate(source.as_mut(), &cache, zone, max_memory, || {
                epoch_cell.load(Ordering::Relaxed) != epoch
            });

            match &result.outcome {
                PopulationOutcome::Completed => info!(
                    "Population of {} done: {} frames, {} MB in {:.1?}",
                    zone,
                    result.frames,
                    result.bytes / 1024 / 1024,
                    started.elapsed()
                ),
                PopulationOutcome::CeilingReached if result.frames == 0 => warn!(
                    "Memory ceiling ({} bytes) below one frame, working zone is empty",
                    max_memory
                ),
                PopulationOutcome::CeilingReached => warn!(
                    "Memory ceiling reached: working zone truncated to {}",
                    result.cached
                ),
                PopulationOutcome::Cancelled => debug!("Population of {} cancelled", zone),
                PopulationOutcome::Failed(e) => warn!("Population of {} failed: {}", zone, e),
            }

            *report.lock().unwrap_or_else(|e| e.into_inner()) = Some(result);
            drop(done_tx);
        }));
    }

    /// Advance by `skip + 1` cached frames. False at the end of the zone.
    pub fn move_next(&mut self, skip: usize) -> bool {
        if self.cache.is_empty() {
            return false;
        }

        let moved = if self.current.is_none() {
            self.cache.move_first() && self.cache.move_by(skip as isize)
        } else {
            self.cache.move_by(skip as isize + 1)
        };
        self.current = self.cache.current();
        moved && self.has_more_frames()
    }

    /// Land on the first cached frame at or after `timestamp`, clamped to the zone.
    /// True iff the landed frame is before the zone end.
    pub fn move_to(&mut self, timestamp: i64) -> bool {
        let zone = self.cache.working_zone();
        if zone.is_empty() {
            return false;
        }

        let target = timestamp.clamp(zone.start, zone.end);
        self.cache.move_to(target);
        self.current = self.cache.current();
        self.has_more_frames()
    }

    fn has_more_frames(&self) -> bool {
        let end = self.cache.working_zone().end;
        self.current.as_ref().is_some_and(|f| f.timestamp() < end)
    }

    /// Drop every cached frame, keeping the running pass alive.
    ///
    /// Used by image adjustments: the caller starts a new pass right after.
    pub fn invalidate(&mut self) {
        self.cancel();
        self.join_population();
        self.cache.clear();
        self.current = None;
        *self.report.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Stop population and release every frame.
    pub fn close(&mut self) {
        self.invalidate();
    }

    fn store_report(&self, report: PopulationReport) {
        *self.report.lock().unwrap_or_else(|e| e.into_inner()) = Some(report);
    }
}

impl Drop for CachingPlayback {
    fn drop(&mut self) {
        self.cancel();
        self.join_population();
    }
}
