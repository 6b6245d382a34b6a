//! Background work starters for population and pre-buffering jobs
//!
//! Three `WorkerPool` implementations:
//! - `Workers`: shared pool with work-stealing deques, for applications that
//!   run many readers at once
//! - `SpawnThread`: one named thread per job
//! - `Inline`: runs the job on the calling thread (tests, batch export)
//!
//! Jobs submitted here are long-running (a population pass decodes a whole
//! working zone), so cancellation is cooperative and lives in the job itself,
//! not in the pool.

use crossbeam::deque::{Injector, Stealer, Worker};
use log::{trace, warn};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::entities::WorkerPool;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Default thread count: leave 25% of the cores for the control thread.
pub fn default_thread_count() -> usize {
    (num_cpus::get() * 3 / 4).max(1)
}

/// Worker pool with work-stealing.
///
/// # Example
/// ```ignore
/// let workers = Workers::new(4)?;
/// reader.update_working_zone(zone, false, budget, &workers);
/// ```
pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    /// Create worker pool with `num_threads` threads (at least one).
    pub fn new(num_threads: usize) -> io::Result<Self> {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers_local: Vec<Worker<Job>> = Vec::new();
        let mut stealers: Vec<Stealer<Job>> = Vec::new();
        for _ in 0..num_threads {
            let worker: Worker<Job> = Worker::new_fifo();
            stealers.push(worker.stealer());
            workers_local.push(worker);
        }

        let mut handles = Vec::new();
        for (worker_id, worker) in workers_local.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let stealers = stealers.clone();

            let handle = thread::Builder::new()
                .name(format!("vidcache-worker-{}", worker_id))
                .spawn(move || {
                    trace!("Worker {} started", worker_id);

                    loop {
                        // Own queue, then global injector, then siblings
                        if let Some(job) = worker.pop() {
                            job();
                            continue;
                        }

                        if let Some(job) = injector.steal_batch_and_pop(&worker).success() {
                            job();
                            continue;
                        }

                        if let Some(job) = stealers.iter().find_map(|s| s.steal().success()) {
                            job();
                            continue;
                        }

                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }

                        // No work: short sleep instead of spinning
                        thread::sleep(Duration::from_millis(1));
                    }

                    trace!("Worker {} stopped", worker_id);
                })?;

            handles.push(handle);
        }

        trace!("Workers initialized: {} threads (work-stealing)", num_threads);

        Ok(Self {
            injector,
            handles,
            shutdown,
        })
    }

    /// Pool sized from settings: `override_threads` if non-zero, else the default.
    pub fn from_override(override_threads: usize) -> io::Result<Self> {
        let count = if override_threads > 0 {
            override_threads
        } else {
            default_thread_count()
        };
        Self::new(count)
    }

    pub fn num_threads(&self) -> usize {
        self.handles.len()
    }

    /// Queue a closure. Runs asynchronously on one of the pool threads.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.injector.push(Box::new(f));
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);

        self.shutdown.store(true, Ordering::SeqCst);

        // Readers cancel and join their jobs on close, so threads finish
        // quickly. The deadline only covers jobs leaked by callers.
        let deadline = Instant::now() + Duration::from_millis(500);

        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    warn!("Worker shutdown timeout reached, detaching remaining threads");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} workers stopped gracefully", num_threads);
    }
}

impl WorkerPool for Workers {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        self.injector.push(job);
    }
}

/// One dedicated thread per job.
#[derive(Debug, Default)]
pub struct SpawnThread {
    spawned: AtomicUsize,
}

impl SpawnThread {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkerPool for SpawnThread {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        let id = self.spawned.fetch_add(1, Ordering::Relaxed);
        let spawned = thread::Builder::new()
            .name(format!("vidcache-job-{}", id))
            .spawn(move || job());

        if let Err(e) = spawned {
            // The job is lost with the closure; callers waiting on it see
            // their completion channel disconnect.
            warn!("Failed to spawn job thread: {}", e);
        }
    }
}

/// Runs every job to completion before `execute` returns.
#[derive(Debug, Default, Clone, Copy)]
pub struct Inline;

impl WorkerPool for Inline {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn test_workers_run_all_jobs() {
        let workers = Workers::new(2).unwrap();
        assert_eq!(workers.num_threads(), 2);

        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 0..16 {
            let tx = tx.clone();
            workers.execute(move || {
                let _ = tx.send(i);
            });
        }
        drop(tx);

        let mut got: Vec<i32> = rx.iter().collect();
        got.sort();
        assert_eq!(got, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_trait_object_dispatch() {
        let workers = Workers::new(1).unwrap();
        let pool: &dyn WorkerPool = &workers;
        let (tx, rx) = crossbeam_channel::bounded(1);
        pool.execute(Box::new(move || {
            let _ = tx.send(7);
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(7));
    }

    #[test]
    fn test_spawn_thread() {
        let pool = SpawnThread::new();
        let (tx, rx) = crossbeam_channel::bounded(1);
        pool.execute(Box::new(move || {
            let name = thread::current().name().map(str::to_owned);
            let _ = tx.send(name);
        }));
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("vidcache-job-0"));
    }

    #[test]
    fn test_inline_runs_before_return() {
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        Inline.execute(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_thread_count() {
        assert!(default_thread_count() >= 1);
    }
}
