//! Credential-aware connection pool (§4.1).

pub mod config;
pub mod connection;
pub mod credentials;
pub mod guard;
#[allow(clippy::module_inception)]
pub mod pool;

pub use config::PoolConfig;
pub use credentials::Credentials;
pub use guard::PooledConnectionGuard;
pub use pool::{ConnectionPool, PoolHealth, PoolStats};
