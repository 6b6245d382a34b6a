//! Bounded look-ahead buffer for the pre-buffering decoding mode
//!
//! A background job decodes forward from the playhead into a bounded channel
//! and blocks when it is full. The control thread consumes frames from the
//! other end in `move_next`:
//!
//! - non-blocking: if fewer frames than requested are ready, nothing is
//!   consumed, `current` stays, and the shortfall is owed as drops. The next
//!   request also consumes the owed frames so playback catches up.
//! - blocking: waits for each requested frame.
//!
//! Stopping drops the receiving end, which unblocks the producer. A job that
//! runs on the thread that started it (`Inline`) fills the buffer once and
//! ends instead of waiting for a consumer that cannot run.

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use log::{debug, trace, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use crate::entities::{FrameSource, VideoFrame, VideoSection, WorkerPool};

/// Frames kept ahead of the playhead by default.
pub const DEFAULT_CAPACITY: usize = 25;

/// Bound on a single blocking wait, so a stalled producer cannot hang playback.
const BLOCKING_TIMEOUT: Duration = Duration::from_secs(10);

const NO_TIMESTAMP: i64 = -1;

/// Look-ahead frame buffer fed by one background decoding job.
#[derive(Debug)]
pub struct PreBuffer {
    capacity: usize,
    frames: Option<Receiver<VideoFrame>>,
    current: Option<VideoFrame>,
    drops: usize,
    epoch: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    /// Timestamp of the last frame decoded for the channel.
    produced: Arc<AtomicI64>,
    pending: Option<Receiver<()>>,
}

impl Default for PreBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PreBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            frames: None,
            current: None,
            drops: 0,
            epoch: Arc::new(AtomicU64::new(0)),
            finished: Arc::new(AtomicBool::new(true)),
            produced: Arc::new(AtomicI64::new(NO_TIMESTAMP)),
            pending: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn current(&self) -> Option<&VideoFrame> {
        self.current.as_ref()
    }

    /// Frames owed since the last successful move or `reset_drops`.
    pub fn drops(&self) -> usize {
        self.drops
    }

    pub fn reset_drops(&mut self) {
        self.drops = 0;
    }

    pub fn is_running(&self) -> bool {
        self.frames.is_some() && !self.finished.load(Ordering::Acquire)
    }

    /// Frames decoded and waiting.
    pub fn available(&self) -> usize {
        self.frames.as_ref().map(|rx| rx.len()).unwrap_or(0)
    }

    /// `[current, last decoded]`, empty when nothing is buffered.
    pub fn segment(&self) -> VideoSection {
        let produced = self.produced.load(Ordering::Acquire);
        match &self.current {
            Some(frame) if produced >= frame.timestamp() => VideoSection::new(frame.timestamp(), produced),
            Some(frame) => VideoSection::new(frame.timestamp(), frame.timestamp()),
            None if produced != NO_TIMESTAMP => VideoSection::new(produced, produced),
            None => VideoSection::EMPTY,
        }
    }

    /// Start decoding `source` from `from` up to the end of `zone`.
    ///
    /// Any running job is stopped first. `current` is kept so the display
    /// does not blank while the buffer refills.
    pub fn start(&mut self, mut source: Box<dyn FrameSource>, from: i64, zone: VideoSection, workers: &dyn WorkerPool) {
        self.stop();

        let (tx, rx) = crossbeam_channel::bounded::<VideoFrame>(self.capacity);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
        self.frames = Some(rx);
        self.pending = Some(done_rx);
        self.drops = 0;
        self.finished.store(false, Ordering::Release);
        self.produced.store(NO_TIMESTAMP, Ordering::Release);

        let epoch = self.epoch.load(Ordering::SeqCst);
        let epoch_cell = Arc::clone(&self.epoch);
        let finished = Arc::clone(&self.finished);
        let produced = Arc::clone(&self.produced);
        let start = from.max(zone.start);
        let starter = std::thread::current().id();

        debug!("Pre-buffering {} from {} ({} frames ahead)", zone, start, self.capacity);

        workers.execute(Box::new(move || {
            let mut sent = 0usize;
            let inline = std::thread::current().id() == starter;
            if let Err(e) = source.seek(start) {
                warn!("Pre-buffering seek to {} failed: {}", start, e);
            } else {
                while epoch_cell.load(Ordering::Relaxed) == epoch {
                    let frame = match source.next_frame() {
                        Ok(Some(frame)) => frame,
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Pre-buffering decode failed: {}", e);
                            break;
                        }
                    };
                    if frame.timestamp() > zone.end {
                        break;
                    }
                    let timestamp = frame.timestamp();
                    // Blocks while the buffer is full. Fails once the consumer is gone.
                    let delivered = if inline { tx.try_send(frame).is_ok() } else { tx.send(frame).is_ok() };
                    if !delivered {
                        break;
                    }
                    produced.store(timestamp, Ordering::Release);
                    sent += 1;
                }
            }
            trace!("Pre-buffering job ended after {} frames", sent);
            finished.store(true, Ordering::Release);
            drop(tx);
            drop(done_tx);
        }));
    }

    /// Stop the job and discard buffered frames. `current` is kept.
    pub fn stop(&mut self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        // Dropping the receiver unblocks a producer waiting on a full channel.
        self.frames = None;
        if let Some(done) = self.pending.take() {
            let _ = done.recv();
        }
        self.finished.store(true, Ordering::Release);
        self.produced.store(NO_TIMESTAMP, Ordering::Release);
    }

    /// Stop and forget everything, including `current`.
    pub fn clear(&mut self) {
        self.stop();
        self.current = None;
        self.drops = 0;
    }

    /// Advance by `skip + 1` frames plus any owed drops.
    ///
    /// Returns false when the frames are not ready (non-blocking) or the
    /// stream ended before the target was reached.
    pub fn move_next(&mut self, skip: usize, block: bool) -> bool {
        let Some(rx) = self.frames.clone() else {
            return false;
        };
        let needed = skip + 1 + self.drops;

        if !block {
            let available = rx.len();
            if available < needed && !self.finished.load(Ordering::Acquire) {
                self.drops = needed;
                trace!("Pre-buffer underrun: {} ready, {} needed", available, needed);
                return false;
            }
        }

        let mut consumed = 0;
        while consumed < needed {
            let received = if block {
                rx.recv_timeout(BLOCKING_TIMEOUT).map_err(|e| matches!(e, RecvTimeoutError::Disconnected))
            } else {
                rx.try_recv().map_err(|e| matches!(e, TryRecvError::Disconnected))
            };
            match received {
                Ok(frame) => {
                    self.current = Some(frame);
                    consumed += 1;
                }
                Err(true) => break,
                Err(false) => {
                    if block {
                        warn!("Pre-buffer producer stalled for {:?}", BLOCKING_TIMEOUT);
                    }
                    break;
                }
            }
        }

        self.drops = 0;
        consumed == needed
    }

    /// Discard buffered frames up to the first one at or after `timestamp`.
    ///
    /// Only looks at frames already decoded. Returns false if none qualifies,
    /// in which case the caller restarts the job at `timestamp`.
    pub fn skip_to(&mut self, timestamp: i64) -> bool {
        if self.current.as_ref().is_some_and(|f| f.timestamp() == timestamp) {
            return true;
        }
        let produced = self.produced.load(Ordering::Acquire);
        let Some(rx) = self.frames.clone() else {
            return false;
        };
        if produced == NO_TIMESTAMP || timestamp > produced {
            return false;
        }
        if self.current.as_ref().is_some_and(|f| timestamp < f.timestamp()) {
            return false;
        }

        while let Ok(frame) = rx.try_recv() {
            let reached = frame.timestamp() >= timestamp;
            self.current = Some(frame);
            if reached {
                self.drops = 0;
                return true;
            }
        }
        false
    }
}

impl Drop for PreBuffer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::workers::{Inline, SpawnThread};
    use crate::entities::{Bitmap, FrameError};
    use std::time::Instant;

    struct Counter {
        next: i64,
        count: i64,
    }

    impl FrameSource for Counter {
        fn seek(&mut self, timestamp: i64) -> Result<(), FrameError> {
            self.next = timestamp.max(0);
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Option<VideoFrame>, FrameError> {
            if self.next >= self.count {
                return Ok(None);
            }
            let frame = VideoFrame::new(self.next, Bitmap::new(1, 1));
            self.next += 1;
            Ok(Some(frame))
        }
    }

    fn started(capacity: usize, count: i64) -> PreBuffer {
        let mut buffer = PreBuffer::new(capacity);
        let source = Box::new(Counter { next: 0, count });
        buffer.start(source, 0, VideoSection::new(0, count - 1), &SpawnThread::new());
        buffer
    }

    fn wait_for(buffer: &PreBuffer, frames: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while buffer.available() < frames && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_blocking_reads_in_order() {
        let mut buffer = started(4, 10);
        for expected in 0..10 {
            assert!(buffer.move_next(0, true));
            assert_eq!(buffer.current().unwrap().timestamp(), expected);
        }
        // End of stream
        assert!(!buffer.move_next(0, true));
        assert_eq!(buffer.current().unwrap().timestamp(), 9);
    }

    #[test]
    fn test_skip_consumes_extra_frames() {
        let mut buffer = started(8, 20);
        assert!(buffer.move_next(2, true));
        assert_eq!(buffer.current().unwrap().timestamp(), 2);
    }

    #[test]
    fn test_underrun_counts_drops_and_keeps_current() {
        let mut buffer = started(3, 100);
        wait_for(&buffer, 3);
        assert!(buffer.move_next(0, false));
        assert_eq!(buffer.current().unwrap().timestamp(), 0);

        // Asking for more than the buffer can ever hold
        assert!(!buffer.move_next(5, false));
        assert_eq!(buffer.drops(), 6);
        assert_eq!(buffer.current().unwrap().timestamp(), 0);

        buffer.reset_drops();
        assert_eq!(buffer.drops(), 0);
    }

    #[test]
    fn test_owed_drops_are_caught_up() {
        let mut buffer = started(3, 100);
        wait_for(&buffer, 3);
        assert!(!buffer.move_next(3, false));
        assert_eq!(buffer.drops(), 4);

        buffer.reset_drops();
        assert!(buffer.move_next(1, true));
        assert_eq!(buffer.current().unwrap().timestamp(), 1);
    }

    #[test]
    fn test_segment_tracks_producer() {
        let mut buffer = started(5, 100);
        wait_for(&buffer, 5);
        buffer.move_next(0, true);
        let segment = buffer.segment();
        assert_eq!(segment.start, 0);
        assert!(segment.end >= 4);
    }

    #[test]
    fn test_skip_to_buffered_frame() {
        let mut buffer = started(10, 100);
        wait_for(&buffer, 10);
        assert!(buffer.skip_to(6));
        assert_eq!(buffer.current().unwrap().timestamp(), 6);
        assert!(!buffer.skip_to(2));
        assert!(!buffer.skip_to(90));
    }

    #[test]
    fn test_stop_unblocks_producer() {
        let mut buffer = started(2, 1_000_000);
        wait_for(&buffer, 2);
        assert!(buffer.is_running());
        buffer.stop();
        assert!(!buffer.is_running());
        assert_eq!(buffer.available(), 0);
        assert!(buffer.segment().is_empty());
    }

    /// A job on the starting thread fills the buffer once and returns.
    #[test]
    fn test_inline_job_fills_once() {
        let mut buffer = PreBuffer::new(4);
        let source = Box::new(Counter { next: 0, count: 100 });
        buffer.start(source, 0, VideoSection::new(0, 99), &Inline);

        assert!(!buffer.is_running());
        assert_eq!(buffer.available(), 4);
        assert_eq!(buffer.segment(), VideoSection::new(3, 3));
        for expected in 0..4 {
            assert!(buffer.move_next(0, false));
            assert_eq!(buffer.current().unwrap().timestamp(), expected);
        }
        assert!(!buffer.move_next(0, false));
    }
}
