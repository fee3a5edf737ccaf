//! # Metrics
//!
//! Lightweight counters for the search engine, exposed through `/stats`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Metrics collector
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    vector_searches: AtomicU64,
    image_searches: AtomicU64,
    search_errors: AtomicU64,
    exact_matches: AtomicU64,
    nearest_fallbacks: AtomicU64,
    search_micros: AtomicU64,

    rebuilds: AtomicU64,
    rebuild_failures: AtomicU64,
    generation_swaps: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_vector_search(&self, elapsed: Duration) {
        self.inner.vector_searches.fetch_add(1, Ordering::Relaxed);
        self.inner
            .search_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_image_search(&self) {
        self.inner.image_searches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_search_error(&self) {
        self.inner.search_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how the self row of a query was resolved
    pub fn record_resolution(&self, exact: bool) {
        if exact {
            self.inner.exact_matches.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.nearest_fallbacks.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rebuild(&self, ok: bool) {
        self.inner.rebuilds.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.inner.rebuild_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_swap(&self) {
        self.inner.generation_swaps.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let searches = self.inner.vector_searches.load(Ordering::Relaxed);
        let micros = self.inner.search_micros.load(Ordering::Relaxed);
        MetricsSnapshot {
            vector_searches: searches,
            image_searches: self.inner.image_searches.load(Ordering::Relaxed),
            search_errors: self.inner.search_errors.load(Ordering::Relaxed),
            exact_matches: self.inner.exact_matches.load(Ordering::Relaxed),
            nearest_fallbacks: self.inner.nearest_fallbacks.load(Ordering::Relaxed),
            mean_search_micros: if searches > 0 { micros as f64 / searches as f64 } else { 0.0 },
            rebuilds: self.inner.rebuilds.load(Ordering::Relaxed),
            rebuild_failures: self.inner.rebuild_failures.load(Ordering::Relaxed),
            generation_swaps: self.inner.generation_swaps.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub vector_searches: u64,
    pub image_searches: u64,
    pub search_errors: u64,
    pub exact_matches: u64,
    pub nearest_fallbacks: u64,
    pub mean_search_micros: f64,
    pub rebuilds: u64,
    pub rebuild_failures: u64,
    pub generation_swaps: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    name: &'static str,
}

impl Timer {
    /// Start new timer
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop timer, log and return the duration
    pub fn stop(self) -> Duration {
        let duration = self.elapsed();
        tracing::debug!(
            name = self.name,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
        duration
    }
}
