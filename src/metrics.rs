//! Cache metrics and derived health classification (§4.3).
//!
//! Counters are plain atomics rather than a mutex-guarded struct like the
//! reference `CacheStatistics` — every field here is independently
//! incremented on the hot read/refresh path and none of them need to be
//! observed together, so there's nothing a lock would buy besides
//! contention.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Overall health derived from the refresh error ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Point-in-time snapshot suitable for serializing onto `/stats/cache`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate: f64,
    pub refresh_count: u64,
    pub refresh_errors: u64,
    pub user_count: u64,
    pub group_count: u64,
    pub computer_count: u64,
    pub last_refresh_duration_ms: u64,
    pub uptime_secs: u64,
    pub health: HealthStatus,
}

/// Atomic counters backing the directory object cache's health surface.
#[derive(Debug)]
pub struct CacheMetrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    refresh_count: AtomicU64,
    refresh_errors: AtomicU64,
    user_count: AtomicU64,
    group_count: AtomicU64,
    computer_count: AtomicU64,
    last_refresh_duration_us: AtomicU64,
    start_time: Instant,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            refresh_count: AtomicU64::new(0),
            refresh_errors: AtomicU64::new(0),
            user_count: AtomicU64::new(0),
            group_count: AtomicU64::new(0),
            computer_count: AtomicU64::new(0),
            last_refresh_duration_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_success(&self, duration: Duration, users: usize, groups: usize, computers: usize) {
        self.refresh_count.fetch_add(1, Ordering::Relaxed);
        self.last_refresh_duration_us
            .store(duration.as_micros() as u64, Ordering::Relaxed);
        self.user_count.store(users as u64, Ordering::Relaxed);
        self.group_count.store(groups as u64, Ordering::Relaxed);
        self.computer_count.store(computers as u64, Ordering::Relaxed);
    }

    pub fn record_refresh_error(&self) {
        self.refresh_count.fetch_add(1, Ordering::Relaxed);
        self.refresh_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    /// Percentage in `[0.0, 100.0]`. `0.0` when no requests have been recorded.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.cache_hits() as f64;
        let misses = self.cache_misses() as f64;
        let total = hits + misses;
        if total == 0.0 {
            0.0
        } else {
            (hits / total) * 100.0
        }
    }

    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::Relaxed)
    }

    pub fn refresh_errors(&self) -> u64 {
        self.refresh_errors.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn last_refresh_duration(&self) -> Duration {
        Duration::from_micros(self.last_refresh_duration_us.load(Ordering::Relaxed))
    }

    /// `Healthy` while no refresh has ever run yet, `Unhealthy` at or above a
    /// 0.5 error ratio, `Degraded` at or above 0.1, else `Healthy`.
    pub fn health_status(&self) -> HealthStatus {
        let total = self.refresh_count();
        if total == 0 {
            return HealthStatus::Healthy;
        }
        let ratio = self.refresh_errors() as f64 / total as f64;
        if ratio >= 0.5 {
            HealthStatus::Unhealthy
        } else if ratio >= 0.1 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits(),
            cache_misses: self.cache_misses(),
            hit_rate: self.hit_rate(),
            refresh_count: self.refresh_count(),
            refresh_errors: self.refresh_errors(),
            user_count: self.user_count.load(Ordering::Relaxed),
            group_count: self.group_count.load(Ordering::Relaxed),
            computer_count: self.computer_count.load(Ordering::Relaxed),
            last_refresh_duration_ms: self.last_refresh_duration().as_millis() as u64,
            uptime_secs: self.uptime().as_secs(),
            health: self.health_status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_is_zero_with_no_requests() {
        let m = CacheMetrics::new();
        assert_eq!(m.hit_rate(), 0.0);
    }

    #[test]
    fn hit_rate_boundary_scenario_6() {
        let m = CacheMetrics::new();
        assert_eq!(m.hit_rate(), 0.0);

        for _ in 0..5 {
            m.record_hit();
        }
        assert_eq!(m.hit_rate(), 100.0);

        for _ in 0..5 {
            m.record_miss();
        }
        assert_eq!(m.hit_rate(), 50.0);
    }

    #[test]
    fn healthy_with_zero_refreshes() {
        let m = CacheMetrics::new();
        assert_eq!(m.health_status(), HealthStatus::Healthy);
    }

    #[test]
    fn unhealthy_at_half_error_ratio() {
        let m = CacheMetrics::new();
        m.record_refresh_error();
        m.record_refresh_success(Duration::from_millis(1), 0, 0, 0);
        assert_eq!(m.health_status(), HealthStatus::Unhealthy);
    }

    #[test]
    fn degraded_between_thresholds() {
        let m = CacheMetrics::new();
        m.record_refresh_error();
        for _ in 0..9 {
            m.record_refresh_success(Duration::from_millis(1), 0, 0, 0);
        }
        assert_eq!(m.health_status(), HealthStatus::Degraded);
    }

    #[test]
    fn healthy_below_degraded_threshold() {
        let m = CacheMetrics::new();
        m.record_refresh_error();
        for _ in 0..99 {
            m.record_refresh_success(Duration::from_millis(1), 0, 0, 0);
        }
        assert_eq!(m.health_status(), HealthStatus::Healthy);
    }

    #[test]
    fn snapshot_carries_entity_counts() {
        let m = CacheMetrics::new();
        m.record_refresh_success(Duration::from_millis(5), 3, 2, 1);
        let snap = m.snapshot();
        assert_eq!(snap.user_count, 3);
        assert_eq!(snap.group_count, 2);
        assert_eq!(snap.computer_count, 1);
        assert_eq!(snap.last_refresh_duration_ms, 5);
    }
}
