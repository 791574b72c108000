//! Exponential backoff with jitter for transient directory faults (§4.5).
//!
//! Mirrors the reference connection pool's retry-with-backoff helper but
//! drops the retry-budget scaffolding the spec doesn't call for, and wires
//! cancellation through a [`tokio_util`]-free `CancellationToken`-shaped
//! future so callers can abort a wait without dropping the retry loop.

use std::time::Duration;

use rand::Rng;
use tokio::sync::Notify;

use crate::error::{CoreError, Result};

/// Exponential-backoff retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// `0.0` disables jitter entirely.
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_fraction: 0.0,
        }
    }
}

impl RetryConfig {
    /// `max_attempts <= 0` coerces to 1 per spec §4.5.
    pub fn normalized_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// `min(InitialDelay * Multiplier^(attempt-1), MaxDelay)`, `attempt` is 1-based.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let base_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_ms = base_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        if self.jitter_fraction <= 0.0 {
            return base;
        }
        let max_jitter_ms = base.as_millis() as f64 * self.jitter_fraction;
        let jitter_ms = rand::rng().random_range(0.0..=max_jitter_ms.max(0.0));
        base + Duration::from_millis(jitter_ms as u64)
    }
}

/// A cooperative cancellation signal a caller can fire to interrupt a retry
/// loop at its next sleep boundary without dropping the awaiting future.
#[derive(Default)]
pub struct CancellationToken {
    notify: Notify,
    cancelled: std::sync::atomic::AtomicBool,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::SeqCst)
    }

    async fn cancelled_signal(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

/// Retry an idempotent async operation until it succeeds, attempts are
/// exhausted, or `cancel` fires.
///
/// Non-retryable errors (anything [`CoreError::is_retryable`] returns
/// `false` for) are returned immediately without consuming an attempt.
pub async fn retry<F, Fut, T>(config: &RetryConfig, cancel: &CancellationToken, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let max_attempts = config.normalized_max_attempts();
    let mut last_error = CoreError::Directory("retry engine invoked with no attempts".to_string());

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err);
                }
                last_error = err;
            }
        }

        if attempt == max_attempts {
            break;
        }

        let delay = config.delay_with_jitter(attempt);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled_signal() => return Err(CoreError::Cancelled),
        }
    }

    Err(last_error)
}
