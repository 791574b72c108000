//! Per-connection bookkeeping and the `Creating → Available ↔ InUse →
//! (Expired | Unhealthy) → Destroyed` state machine (§4.1).

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::directory::client::DirectoryClient;
use crate::pool::config::PoolConfig;
use crate::pool::credentials::Credentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Available,
    InUse,
}

pub(crate) struct Slot {
    pub id: u64,
    pub client: Arc<dyn DirectoryClient>,
    pub credentials: Credentials,
    pub created_at: Instant,
    pub last_used_at: Instant,
    pub state: ConnectionState,
    pub healthy: bool,
}

impl Slot {
    pub fn new(id: u64, client: Arc<dyn DirectoryClient>, credentials: Credentials) -> Self {
        let now = Instant::now();
        Self {
            id,
            client,
            credentials,
            created_at: now,
            last_used_at: now,
            state: ConnectionState::InUse,
            healthy: true,
        }
    }

    fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    fn idle_time(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    /// Rule 1-3 of the reuse predicate. Rule 4 (credential match) is the
    /// caller's job since it also needs the requested pair.
    pub fn is_expired(&self, config: &PoolConfig) -> bool {
        !self.healthy || self.age() > config.max_lifetime || self.idle_time() > config.max_idle_time
    }

    /// Full reuse predicate: all four rules from §4.1.
    pub fn is_reusable_for(&self, requested: &Credentials, config: &PoolConfig) -> bool {
        self.state == ConnectionState::Available
            && !self.is_expired(config)
            && self.credentials.matches(requested)
    }
}
