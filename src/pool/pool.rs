//! Credential-aware connection pool (§4.1): acquisition, release, warm-up,
//! and the background maintenance loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::directory::client::{DirectoryClient, DirectoryClientFactory};
use crate::error::{CoreError, Result};
use crate::pool::config::PoolConfig;
use crate::pool::connection::{ConnectionState, Slot};
use crate::pool::credentials::Credentials;
use crate::pool::guard::PooledConnectionGuard;

/// How long a blocked acquirer waits between re-checks of the slot table.
/// Bounded alongside `Notify` so a missed wakeup costs at most this much
/// extra latency rather than hanging until `AcquireTimeout`.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct PoolState {
    slots: Vec<Slot>,
    /// Connections currently being created; counted against `max_connections`
    /// before they land in `slots`, so concurrent acquirers can't overshoot.
    reserved: usize,
    next_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub active: usize,
    pub available: usize,
    pub acquired: u64,
    pub failed: u64,
    pub max: usize,
}

/// Overall pool health derived from the acquire failure ratio and whether
/// the pool is currently exhausted. Consulted by the binary's readiness
/// route alongside the cache's own health status (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

pub struct ConnectionPool {
    config: PoolConfig,
    factory: Arc<dyn DirectoryClientFactory>,
    state: Mutex<PoolState>,
    notify: Notify,
    acquired_count: AtomicU64,
    failed_count: AtomicU64,
    closed: AtomicBool,
    maintenance_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig, factory: Arc<dyn DirectoryClientFactory>) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            config,
            factory,
            state: Mutex::new(PoolState {
                slots: Vec::new(),
                reserved: 0,
                next_id: 1,
            }),
            notify: Notify::new(),
            acquired_count: AtomicU64::new(0),
            failed_count: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            maintenance_task: Mutex::new(None),
        }))
    }

    /// Best-effort anonymous warm-start to `MinConnections`. Failures are
    /// logged and swallowed — the pool still serves once the directory
    /// recovers.
    pub async fn warm_up(self: &Arc<Self>) {
        for _ in 0..self.config.min_connections {
            match self.factory.with_credentials("", "").await {
                Ok(client) => {
                    let mut state = self.state.lock();
                    let id = state.next_id;
                    state.next_id += 1;
                    let mut slot = Slot::new(id, client, Credentials::anonymous());
                    slot.state = ConnectionState::Available;
                    state.slots.push(slot);
                }
                Err(err) => {
                    warn!(error = %err, "pool warm-up connection failed");
                }
            }
        }
    }

    pub fn spawn_maintenance(self: &Arc<Self>) {
        let mut guard = self.maintenance_task.lock();
        if guard.is_some() {
            return;
        }
        let pool = Arc::clone(self);
        let handle = tokio::task::spawn(async move {
            let mut interval = tokio::time::interval(pool.config.health_check_interval);
            loop {
                interval.tick().await;
                if pool.closed.load(Ordering::SeqCst) {
                    break;
                }
                pool.run_maintenance_pass().await;
            }
            debug!("pool maintenance loop stopped");
        });
        *guard = Some(handle);
    }

    /// Probe every idle connection's liveness, mark failing ones unhealthy,
    /// then destroy anything unhealthy or past its lifetime/idle bound.
    /// `InUse` connections are never probed or destroyed here — only the
    /// holder releasing (or letting expire on release) removes them.
    async fn run_maintenance_pass(&self) {
        let idle: Vec<(u64, Arc<dyn DirectoryClient>)> = {
            let state = self.state.lock();
            state
                .slots
                .iter()
                .filter(|s| s.state == ConnectionState::Available)
                .map(|s| (s.id, Arc::clone(&s.client)))
                .collect()
        };

        let mut unhealthy_ids = Vec::new();
        for (id, client) in idle {
            if !client.is_healthy().await {
                unhealthy_ids.push(id);
            }
        }

        let mut state = self.state.lock();
        if !unhealthy_ids.is_empty() {
            for slot in state.slots.iter_mut() {
                if unhealthy_ids.contains(&slot.id) {
                    slot.healthy = false;
                }
            }
            warn!(count = unhealthy_ids.len(), "pool maintenance marked connections unhealthy");
        }

        let before = state.slots.len();
        let config = &self.config;
        state
            .slots
            .retain(|slot| slot.state == ConnectionState::InUse || !slot.is_expired(config));
        let destroyed = before - state.slots.len();
        if destroyed > 0 {
            info!(destroyed, remaining = state.slots.len(), "pool maintenance destroyed stale connections");
        }
    }

    pub async fn acquire(self: &Arc<Self>, dn: &str, secret: &str) -> Result<PooledConnectionGuard> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CoreError::PoolClosed);
        }
        let credentials = Credentials::new(dn, secret);
        match tokio::time::timeout(self.config.acquire_timeout, self.acquire_inner(credentials)).await {
            Ok(Ok(guard)) => Ok(guard),
            Ok(Err(err)) => {
                self.failed_count.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
            Err(_) => {
                self.failed_count.fetch_add(1, Ordering::Relaxed);
                Err(CoreError::ConnectionTimeout(self.config.acquire_timeout))
            }
        }
    }

    async fn acquire_inner(self: &Arc<Self>, credentials: Credentials) -> Result<PooledConnectionGuard> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(CoreError::PoolClosed);
            }

            enum Action {
                Reused { id: u64, client: Arc<dyn crate::directory::client::DirectoryClient> },
                Reserve,
                Wait,
            }

            let action = {
                let mut state = self.state.lock();
                if let Some(slot) = state
                    .slots
                    .iter_mut()
                    .find(|s| s.is_reusable_for(&credentials, &self.config))
                {
                    slot.state = ConnectionState::InUse;
                    slot.last_used_at = Instant::now();
                    Action::Reused {
                        id: slot.id,
                        client: Arc::clone(&slot.client),
                    }
                } else if state.slots.len() + state.reserved < self.config.max_connections {
                    state.reserved += 1;
                    Action::Reserve
                } else {
                    Action::Wait
                }
            };

            match action {
                Action::Reused { id, client } => {
                    self.acquired_count.fetch_add(1, Ordering::Relaxed);
                    return Ok(PooledConnectionGuard::new(Arc::clone(self), id, client));
                }
                Action::Reserve => match self.factory.with_credentials(credentials.dn(), credentials.secret()).await {
                    Ok(client) => {
                        let mut state = self.state.lock();
                        state.reserved -= 1;
                        let id = state.next_id;
                        state.next_id += 1;
                        state.slots.push(Slot::new(id, Arc::clone(&client), credentials.clone()));
                        drop(state);
                        self.acquired_count.fetch_add(1, Ordering::Relaxed);
                        return Ok(PooledConnectionGuard::new(Arc::clone(self), id, client));
                    }
                    Err(err) => {
                        let mut state = self.state.lock();
                        state.reserved -= 1;
                        drop(state);
                        self.notify.notify_waiters();
                        return Err(err);
                    }
                },
                Action::Wait => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep(WAIT_POLL_INTERVAL) => {}
                    }
                }
            }
        }
    }

    pub(crate) fn release(&self, id: u64) {
        let mut state = self.state.lock();
        if let Some(pos) = state.slots.iter().position(|s| s.id == id) {
            let expired = {
                let slot = &mut state.slots[pos];
                slot.state = ConnectionState::Available;
                slot.last_used_at = Instant::now();
                slot.is_expired(&self.config)
            };
            if expired {
                state.slots.remove(pos);
            }
        }
        drop(state);
        self.notify.notify_waiters();
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let active = state.slots.iter().filter(|s| s.state == ConnectionState::InUse).count();
        let available = state.slots.len() - active;
        PoolStats {
            total: state.slots.len(),
            active,
            available,
            acquired: self.acquired_count.load(Ordering::Relaxed),
            failed: self.failed_count.load(Ordering::Relaxed),
            max: self.config.max_connections,
        }
    }

    /// `Unhealthy` at or above a 0.5 acquire-failure ratio, or when the pool
    /// is fully exhausted (at `max_connections` with nothing available);
    /// `Degraded` at or above 0.1; `Healthy` otherwise, including before any
    /// acquire has ever been attempted.
    pub fn health(&self) -> PoolHealth {
        let stats = self.stats();
        let attempts = stats.acquired + stats.failed;
        let failure_ratio = if attempts == 0 {
            0.0
        } else {
            stats.failed as f64 / attempts as f64
        };

        if failure_ratio >= 0.5 || (stats.total >= stats.max && stats.available == 0) {
            PoolHealth::Unhealthy
        } else if failure_ratio >= 0.1 {
            PoolHealth::Degraded
        } else {
            PoolHealth::Healthy
        }
    }

    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.maintenance_task.lock().take() {
            handle.abort();
        }
        let mut state = self.state.lock();
        state.slots.retain(|s| s.state == ConnectionState::InUse);
        drop(state);
        self.notify.notify_waiters();
    }
}
