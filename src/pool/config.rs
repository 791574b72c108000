//! Pool configuration and eager validation (§4.1).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub min_connections: usize,
    pub max_idle_time: Duration,
    pub max_lifetime: Duration,
    pub health_check_interval: Duration,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            max_idle_time: Duration::from_secs(15 * 60),
            max_lifetime: Duration::from_secs(60 * 60),
            health_check_interval: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_connections > self.max_connections {
            return Err(CoreError::Configuration(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        if self.max_connections == 0 {
            return Err(CoreError::Configuration(
                "max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
