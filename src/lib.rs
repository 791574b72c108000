//! Directory-service object cache and credential-aware connection pool.
//!
//! This crate is the stateful core an embedding HTTP application builds on:
//! a background-refreshed, indexed snapshot of directory objects
//! ([`cache`]), a connection pool that keys reuse on the bound identity
//! ([`pool`]), and the supporting response cache, rate limiter, and retry
//! engine used to make calls into the directory resilient. It never speaks
//! the directory wire protocol itself — see [`directory::client`].

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod rate_limiter;
pub mod response_cache;
pub mod retry;

pub use cache::CacheManager;
pub use config::AppConfig;
pub use error::{CoreError, Result};
pub use metrics::{CacheMetrics, HealthStatus};
pub use pool::{ConnectionPool, PoolConfig, PoolHealth, PooledConnectionGuard};
pub use rate_limiter::RateLimiter;
pub use response_cache::ResponseCache;
pub use retry::{retry, CancellationToken, RetryConfig};
