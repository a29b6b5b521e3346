// perf.rs - Timing and counters for the graph context cache
//
// Timing logs are controlled via the GRAPH_CONTEXT_PERF environment variable:
//   GRAPH_CONTEXT_PERF=1        # Log foreground query durations
//   GRAPH_CONTEXT_PERF=verbose  # Also warn when a query exceeds its threshold

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Global flag indicating whether performance timing is enabled
static PERF_ENABLED: OnceLock<bool> = OnceLock::new();

/// Global flag indicating verbose mode (includes threshold warnings)
static PERF_VERBOSE: OnceLock<bool> = OnceLock::new();

/// Check if performance timing is enabled
pub fn is_enabled() -> bool {
    *PERF_ENABLED.get_or_init(|| {
        std::env::var("GRAPH_CONTEXT_PERF")
            .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
            .unwrap_or(false)
    })
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    *PERF_VERBOSE.get_or_init(|| {
        std::env::var("GRAPH_CONTEXT_PERF")
            .map(|v| v.to_lowercase() == "verbose")
            .unwrap_or(false)
    })
}

/// Times one foreground query and reports how it was served.
///
/// The cache hits and misses logged on drop are the difference between two
/// stats snapshots, so they include lookups made by concurrent queries.
pub struct QueryTimer {
    start: Instant,
    line: u32,
    stats: Arc<CacheStats>,
    before: CacheStatsSnapshot,
    items: Option<usize>,
    threshold_warn_ms: u64,
    enabled: bool,
}

impl QueryTimer {
    pub fn start(line: u32, stats: &Arc<CacheStats>, threshold_warn_ms: u64) -> Self {
        let enabled = is_enabled();
        let before = if enabled {
            stats.snapshot()
        } else {
            CacheStatsSnapshot::default()
        };
        Self {
            start: Instant::now(),
            line,
            stats: Arc::clone(stats),
            before,
            items: None,
            threshold_warn_ms,
            enabled,
        }
    }

    /// Record the number of items handed back to the caller
    pub fn finish(&mut self, items: usize) {
        self.items = Some(items);
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }

        let elapsed = self.start.elapsed();
        let delta = self.stats.snapshot().since(&self.before);
        match self.items {
            Some(items) => log::info!(
                "[PERF] graph context for line {}: {} items, {} hits, {} misses in {:?}",
                self.line,
                items,
                delta.hits,
                delta.misses,
                elapsed
            ),
            None => log::info!(
                "[PERF] graph context for line {} abandoned after {:?}",
                self.line,
                elapsed
            ),
        }

        if elapsed.as_millis() > self.threshold_warn_ms as u128 && is_verbose() {
            log::warn!(
                "[PERF] graph context for line {} exceeded threshold ({}ms > {}ms, {} misses)",
                self.line,
                elapsed.as_millis(),
                self.threshold_warn_ms,
                delta.misses
            );
        }
    }
}

/// Running counters for one cache instance
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    fetch_failures: AtomicU64,
    invalidations: AtomicU64,
    preload_generations: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub fetch_failures: u64,
    pub invalidations: u64,
    pub preload_generations: u64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_preload_generation(&self) {
        self.preload_generations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            preload_generations: self.preload_generations.load(Ordering::Relaxed),
        }
    }
}

impl CacheStatsSnapshot {
    /// Fraction of lookups served from the cache, `None` before the first lookup
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        if total == 0 {
            None
        } else {
            Some(self.hits as f64 / total as f64)
        }
    }

    /// Counter increments between `earlier` and this snapshot
    pub fn since(&self, earlier: &CacheStatsSnapshot) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.saturating_sub(earlier.hits),
            misses: self.misses.saturating_sub(earlier.misses),
            fetch_failures: self.fetch_failures.saturating_sub(earlier.fetch_failures),
            invalidations: self.invalidations.saturating_sub(earlier.invalidations),
            preload_generations: self
                .preload_generations
                .saturating_sub(earlier.preload_generations),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_since_counts_query_lookups() {
        let stats = Arc::new(CacheStats::new());
        stats.record_miss();
        let before = stats.snapshot();

        stats.record_hit();
        stats.record_miss();
        stats.record_miss();
        let delta = stats.snapshot().since(&before);
        assert_eq!(delta.hits, 1);
        assert_eq!(delta.misses, 2);
        assert_eq!(delta.invalidations, 0);

        // Out-of-order snapshots never underflow
        assert_eq!(before.since(&stats.snapshot()), CacheStatsSnapshot::default());
    }

    #[test]
    fn test_query_timer_records_item_count() {
        let stats = Arc::new(CacheStats::new());
        let mut timer = QueryTimer::start(4, &stats, 50);
        assert_eq!(timer.items, None);
        timer.finish(3);
        assert_eq!(timer.items, Some(3));
        assert_eq!(timer.line, 4);
    }

    #[test]
    fn test_cache_stats_snapshot() {
        let stats = CacheStats::new();
        assert_eq!(stats.snapshot(), CacheStatsSnapshot::default());
        assert!(stats.snapshot().hit_rate().is_none());

        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_invalidation();
        stats.record_preload_generation();

        let snap = stats.snapshot();
        assert_eq!(snap.hits, 3);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.invalidations, 1);
        assert_eq!(snap.preload_generations, 1);
        assert_eq!(snap.fetch_failures, 0);
        assert_eq!(snap.hit_rate(), Some(0.75));
    }
}
