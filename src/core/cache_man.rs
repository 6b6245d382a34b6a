//! Memory budget shared by working-zone caches
//!
//! **Why**: Each reader owns its cache, but the application decides how much
//! RAM all of them may hold. The manager turns "fraction of available memory
//! minus a system reserve" into a byte ceiling and keeps a running total of
//! bytes held by every cache attached to it.
//!
//! **Used by**: application composition root (one manager), `Cache` (tracking),
//! `CachingPlayback` callers (ceiling for `update_working_zone`)

use log::{debug, info};
use std::sync::atomic::{AtomicUsize, Ordering};
use sysinfo::System;

use crate::config::Settings;

/// Global cache memory manager
#[derive(Debug)]
pub struct CacheManager {
    /// Bytes currently held by attached caches
    memory_usage: AtomicUsize,
    /// Ceiling (bytes)
    max_memory_bytes: usize,
}

impl CacheManager {
    /// Create cache manager with memory limit
    ///
    /// # Arguments
    ///
    /// * `mem_fraction` - Fraction of available memory (0.0-1.0, e.g. 0.75 = 75%)
    /// * `reserve_gb` - Reserve memory for system (GB, e.g. 2.0 = 2GB)
    pub fn new(mem_fraction: f64, reserve_gb: f64) -> Self {
        let max_memory_bytes = compute_limit(mem_fraction, reserve_gb);

        info!(
            "CacheManager init: limit={} MB ({}% of available, {} GB reserved)",
            max_memory_bytes / 1024 / 1024,
            (mem_fraction * 100.0) as u32,
            reserve_gb
        );

        Self::with_limit(max_memory_bytes)
    }

    /// Create with an explicit byte ceiling (tests, embedded use).
    pub fn with_limit(max_memory_bytes: usize) -> Self {
        Self {
            memory_usage: AtomicUsize::new(0),
            max_memory_bytes,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.cache_memory_fraction(), settings.reserve_system_memory_gb)
    }

    /// Ceiling to pass to `update_working_zone`: what is left of the budget.
    pub fn zone_budget(&self) -> usize {
        let (usage, limit) = self.mem();
        limit.saturating_sub(usage)
    }

    /// Get memory statistics (usage, limit)
    pub fn mem(&self) -> (usize, usize) {
        let usage = self.memory_usage.load(Ordering::Relaxed);
        (usage, self.max_memory_bytes)
    }

    /// Get memory usage percentage (0.0-1.0)
    pub fn mem_usage_fraction(&self) -> f64 {
        let (usage, limit) = self.mem();
        if limit == 0 {
            0.0
        } else {
            usage as f64 / limit as f64
        }
    }

    pub fn add_memory(&self, bytes: usize) {
        let new_usage = self.memory_usage.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let limit = self.max_memory_bytes;
        if new_usage > limit {
            debug!(
                "Memory limit exceeded: {} MB / {} MB",
                new_usage / 1024 / 1024,
                limit / 1024 / 1024
            );
        }
    }

    /// Saturating, so a double free cannot wrap the counter.
    pub fn free_memory(&self, bytes: usize) {
        let _ = self
            .memory_usage
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }
}

fn compute_limit(mem_fraction: f64, reserve_gb: f64) -> usize {
    let mut sys = System::new();
    sys.refresh_memory();

    let available = sys.available_memory() as usize;
    let reserve = (reserve_gb * 1024.0 * 1024.0 * 1024.0) as usize;
    let usable = available.saturating_sub(reserve);
    (usable as f64 * mem_fraction.clamp(0.0, 1.0)) as usize
}
