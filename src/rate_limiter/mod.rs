//! Per-source-IP failed-attempt throttle (§4.6).
//!
//! One `parking_lot::Mutex` over the per-IP table, the same single-lock
//! shape the reference gateway's sliding-window limiter uses — there's one
//! write on every attempt, so a reader-writer split buys nothing here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub max_attempts: u32,
    pub window_period: Duration,
    pub block_period: Duration,
    pub cleanup_every: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_period: Duration::from_secs(60),
            block_period: Duration::from_secs(5 * 60),
            cleanup_every: Duration::from_secs(60),
        }
    }
}

struct Entry {
    count: u32,
    window_started_at: Instant,
    blocked_until: Option<Instant>,
    last_activity: Instant,
}

/// Per-IP attempt counter with a window/block/cleanup policy.
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Mutex<HashMap<String, Entry>>,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            entries: Mutex::new(HashMap::new()),
            sweep_task: Mutex::new(None),
        })
    }

    /// Increment the attempt counter for `ip`. Returns `true` exactly when
    /// this call is the one that crosses `MaxAttempts`, entering the IP into
    /// a blocked state until `BlockPeriod` elapses.
    pub fn record_attempt(&self, ip: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let entry = entries.entry(ip.to_string()).or_insert_with(|| Entry {
            count: 0,
            window_started_at: now,
            blocked_until: None,
            last_activity: now,
        });

        if let Some(until) = entry.blocked_until {
            if now < until {
                entry.last_activity = now;
                return true;
            }
            entry.blocked_until = None;
            entry.count = 0;
            entry.window_started_at = now;
        }

        if now.duration_since(entry.window_started_at) > self.config.window_period {
            entry.count = 0;
            entry.window_started_at = now;
        }

        entry.count += 1;
        entry.last_activity = now;

        if entry.count >= self.config.max_attempts {
            entry.blocked_until = Some(now + self.config.block_period);
            true
        } else {
            false
        }
    }

    /// Pure query: does not mutate state.
    pub fn is_blocked(&self, ip: &str) -> bool {
        let entries = self.entries.lock();
        match entries.get(ip) {
            Some(entry) => match entry.blocked_until {
                Some(until) => Instant::now() < until,
                None => false,
            },
            None => false,
        }
    }

    /// Clears both the counter and any block — called on successful
    /// authentication.
    pub fn reset_attempts(&self, ip: &str) {
        self.entries.lock().remove(ip);
    }

    pub fn spawn_cleanup(self: &Arc<Self>) {
        let mut guard = self.sweep_task.lock();
        if guard.is_some() {
            return;
        }
        let limiter = Arc::clone(self);
        let handle = tokio::task::spawn(async move {
            loop {
                tokio::time::sleep(limiter.config.cleanup_every).await;
                let max_age = limiter.config.window_period.max(limiter.config.block_period);
                let mut entries = limiter.entries.lock();
                entries.retain(|_, entry| entry.last_activity.elapsed() <= max_age);
            }
        });
        *guard = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(handle) = self.sweep_task.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RateLimiterConfig {
        RateLimiterConfig {
            max_attempts: 3,
            window_period: Duration::from_secs(60),
            block_period: Duration::from_millis(150),
            cleanup_every: Duration::from_secs(60),
        }
    }

    #[test]
    fn rate_limit_scenario_4() {
        let limiter = RateLimiter::new(test_config());
        assert!(!limiter.record_attempt("1.2.3.4"));
        assert!(!limiter.record_attempt("1.2.3.4"));
        assert!(limiter.record_attempt("1.2.3.4"));
        assert!(limiter.is_blocked("1.2.3.4"));

        std::thread::sleep(Duration::from_millis(180));
        assert!(!limiter.is_blocked("1.2.3.4"));

        limiter.reset_attempts("1.2.3.4");
        assert!(!limiter.is_blocked("1.2.3.4"));
    }

    #[test]
    fn is_blocked_does_not_mutate() {
        let limiter = RateLimiter::new(test_config());
        limiter.record_attempt("1.2.3.4");
        assert!(!limiter.is_blocked("1.2.3.4"));
        assert!(!limiter.is_blocked("1.2.3.4"));
    }

    #[test]
    fn distinct_ips_tracked_independently() {
        let limiter = RateLimiter::new(test_config());
        limiter.record_attempt("1.1.1.1");
        limiter.record_attempt("1.1.1.1");
        limiter.record_attempt("1.1.1.1");
        assert!(limiter.is_blocked("1.1.1.1"));
        assert!(!limiter.is_blocked("2.2.2.2"));
    }

    #[test]
    fn reset_attempts_clears_counter_not_just_block() {
        let limiter = RateLimiter::new(test_config());
        limiter.record_attempt("1.2.3.4");
        limiter.record_attempt("1.2.3.4");
        limiter.reset_attempts("1.2.3.4");
        // two fresh attempts after reset should not yet trip the limit
        assert!(!limiter.record_attempt("1.2.3.4"));
        assert!(!limiter.record_attempt("1.2.3.4"));
    }
}
