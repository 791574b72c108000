//! Composes the three typed caches plus the background refresh controller
//! and invalidation hooks (§4.2).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::typed_cache::TypedCache;
use crate::directory::client::DirectoryClient;
use crate::directory::entities::{
    Computer, ComputerWithGroups, Group, GroupWithMembers, User, UserWithGroups,
};
use crate::metrics::CacheMetrics;

const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(30);

/// Owns the typed caches, their shared metrics, and the background refresh
/// task. Constructed once and shared behind an `Arc` by callers.
pub struct CacheManager {
    users: TypedCache<User>,
    groups: TypedCache<Group>,
    computers: TypedCache<Computer>,
    metrics: Arc<CacheMetrics>,
    refresh_period: Duration,
    shutdown: Arc<AtomicBool>,
    notify: Arc<Notify>,
    refresh_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl CacheManager {
    pub fn new(refresh_period: Duration) -> Arc<Self> {
        let metrics = Arc::new(CacheMetrics::new());
        Arc::new(Self {
            users: TypedCache::new(Arc::clone(&metrics)),
            groups: TypedCache::new(Arc::clone(&metrics)),
            computers: TypedCache::new(Arc::clone(&metrics)),
            metrics,
            refresh_period,
            shutdown: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            refresh_task: parking_lot::Mutex::new(None),
        })
    }

    pub fn with_default_period() -> Arc<Self> {
        Self::new(DEFAULT_REFRESH_PERIOD)
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    pub fn users(&self) -> &TypedCache<User> {
        &self.users
    }

    pub fn groups(&self) -> &TypedCache<Group> {
        &self.groups
    }

    pub fn computers(&self) -> &TypedCache<Computer> {
        &self.computers
    }

    /// Eagerly warm every typed cache once, synchronously. Call before
    /// serving traffic; errors are surfaced (unlike background-loop ticks,
    /// there is a caller here to return them to).
    pub async fn warm_up(self: &Arc<Self>, client: &dyn DirectoryClient) -> crate::error::Result<()> {
        self.refresh_once(client).await
    }

    /// Spawn the periodic refresh loop. Idempotent: calling twice on an
    /// already-running manager is a no-op.
    pub fn spawn_refresh_loop(self: &Arc<Self>, client: Arc<dyn DirectoryClient>) {
        let mut guard = self.refresh_task.lock();
        if guard.is_some() {
            return;
        }
        let manager = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        let notify = Arc::clone(&self.notify);
        let handle = tokio::task::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(manager.refresh_period) => {}
                    _ = notify.notified() => {}
                }
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(err) = manager.refresh_once(client.as_ref()).await {
                    warn!(error = %err, "directory cache refresh failed; serving stale snapshot");
                }
            }
            debug!("cache refresh loop stopped");
        });
        *guard = Some(handle);
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn refresh_once(&self, client: &dyn DirectoryClient) -> crate::error::Result<()> {
        let start = Instant::now();
        let result = async {
            let users = client.find_users().await?;
            let groups = client.find_groups().await?;
            let computers = client.find_computers().await?;
            Ok::<_, crate::error::CoreError>((users, groups, computers))
        }
        .await;

        match result {
            Ok((users, groups, computers)) => {
                let counts = (users.len(), groups.len(), computers.len());
                self.users.set_all(users);
                self.groups.set_all(groups);
                self.computers.set_all(computers);
                self.metrics
                    .record_refresh_success(start.elapsed(), counts.0, counts.1, counts.2);
                info!(
                    users = counts.0,
                    groups = counts.1,
                    computers = counts.2,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "directory cache refreshed"
                );
                Ok(())
            }
            Err(err) => {
                self.metrics.record_refresh_error();
                error!(error = %err, "directory cache refresh error");
                Err(err)
            }
        }
    }

    /// Patch both sides of the denormalized membership relation in place,
    /// without waiting for the next periodic refresh.
    pub fn on_add_user_to_group(&self, user_dn: &str, group_dn: &str) {
        self.users.update(|u| {
            if u.dn == user_dn && !u.groups.iter().any(|g| g == group_dn) {
                u.groups.push(group_dn.to_string());
            }
        });
        self.groups.update(|g| {
            if g.dn == group_dn && !g.members.iter().any(|m| m == user_dn) {
                g.members.push(user_dn.to_string());
            }
        });
    }

    pub fn on_remove_user_from_group(&self, user_dn: &str, group_dn: &str) {
        self.users.update(|u| {
            if u.dn == user_dn {
                u.groups.retain(|g| g != group_dn);
            }
        });
        self.groups.update(|g| {
            if g.dn == group_dn {
                g.members.retain(|m| m != user_dn);
            }
        });
    }

    /// Materialize a user's full group records from the denormalized DN list.
    /// Each membership DN resolves through `TypedCache::find_by_dn`, which
    /// records its own hit or miss — unresolved DNs count as misses here.
    pub fn populate_groups_for_user(&self, user: &User) -> UserWithGroups {
        let groups = user
            .groups
            .iter()
            .filter_map(|dn| self.groups.find_by_dn(dn))
            .map(|g| (*g).clone())
            .collect();
        UserWithGroups {
            user: user.clone(),
            groups,
        }
    }

    /// Materialize a group's full member records, optionally excluding
    /// disabled users. Each member DN resolves through
    /// `TypedCache::find_by_dn`, which records its own hit or miss.
    pub fn populate_users_for_group(&self, group: &Group, include_disabled: bool) -> GroupWithMembers {
        let members = group
            .members
            .iter()
            .filter_map(|dn| self.users.find_by_dn(dn))
            .filter(|u| include_disabled || u.enabled)
            .map(|u| (*u).clone())
            .collect();
        GroupWithMembers {
            group: group.clone(),
            members,
        }
    }

    /// Each membership DN resolves through `TypedCache::find_by_dn`, which
    /// records its own hit or miss.
    pub fn populate_groups_for_computer(&self, computer: &Computer) -> ComputerWithGroups {
        let groups = computer
            .groups
            .iter()
            .filter_map(|dn| self.groups.find_by_dn(dn))
            .map(|g| (*g).clone())
            .collect();
        ComputerWithGroups {
            computer: computer.clone(),
            groups,
        }
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::mock::{MockDirectoryClient, MockDirectoryState};
    use parking_lot::RwLock;

    fn seeded_state() -> Arc<RwLock<MockDirectoryState>> {
        Arc::new(RwLock::new(MockDirectoryState {
            users: vec![User {
                dn: "cn=user1,dc=example,dc=com".into(),
                sam_account_name: "user1".into(),
                enabled: true,
                groups: vec!["cn=groupX,dc=example,dc=com".into()],
            }],
            groups: vec![
                Group {
                    dn: "cn=groupX,dc=example,dc=com".into(),
                    members: vec!["cn=user1,dc=example,dc=com".into()],
                },
                Group {
                    dn: "cn=groupY,dc=example,dc=com".into(),
                    members: vec![],
                },
            ],
            computers: vec![],
            passwords: Default::default(),
        }))
    }

    #[tokio::test]
    async fn warm_up_populates_all_three_caches() {
        let manager = CacheManager::with_default_period();
        let client = MockDirectoryClient::new(seeded_state());
        manager.warm_up(&client).await.unwrap();

        assert_eq!(manager.users().count(), 1);
        assert_eq!(manager.groups().count(), 2);
        assert_eq!(manager.metrics().refresh_count(), 1);
        assert_eq!(manager.metrics().refresh_errors(), 0);
    }

    #[tokio::test]
    async fn refresh_patch_scenario_3() {
        let manager = CacheManager::with_default_period();
        let client = MockDirectoryClient::new(seeded_state());
        manager.warm_up(&client).await.unwrap();

        manager.on_add_user_to_group(
            "cn=user1,dc=example,dc=com",
            "cn=groupY,dc=example,dc=com",
        );

        let user = manager.users().find_by_dn("cn=user1,dc=example,dc=com").unwrap();
        assert!(user.groups.contains(&"cn=groupX,dc=example,dc=com".to_string()));
        assert!(user.groups.contains(&"cn=groupY,dc=example,dc=com".to_string()));

        let group_y = manager.groups().find_by_dn("cn=groupY,dc=example,dc=com").unwrap();
        assert!(group_y.members.contains(&"cn=user1,dc=example,dc=com".to_string()));
    }

    #[tokio::test]
    async fn on_remove_user_from_group_clears_both_sides() {
        let manager = CacheManager::with_default_period();
        let client = MockDirectoryClient::new(seeded_state());
        manager.warm_up(&client).await.unwrap();

        manager.on_remove_user_from_group(
            "cn=user1,dc=example,dc=com",
            "cn=groupX,dc=example,dc=com",
        );

        let user = manager.users().find_by_dn("cn=user1,dc=example,dc=com").unwrap();
        assert!(!user.groups.contains(&"cn=groupX,dc=example,dc=com".to_string()));
        let group_x = manager.groups().find_by_dn("cn=groupX,dc=example,dc=com").unwrap();
        assert!(!group_x.members.contains(&"cn=user1,dc=example,dc=com".to_string()));
    }

    #[tokio::test]
    async fn populate_users_for_group_respects_include_disabled() {
        let state = seeded_state();
        {
            let mut s = state.write();
            s.users.push(User {
                dn: "cn=user2,dc=example,dc=com".into(),
                sam_account_name: "user2".into(),
                enabled: false,
                groups: vec!["cn=groupX,dc=example,dc=com".into()],
            });
            s.groups[0].members.push("cn=user2,dc=example,dc=com".into());
        }
        let manager = CacheManager::with_default_period();
        let client = MockDirectoryClient::new(state);
        manager.warm_up(&client).await.unwrap();

        let group_x = manager.groups().find_by_dn("cn=groupX,dc=example,dc=com").unwrap();
        let enabled_only = manager.populate_users_for_group(&group_x, false);
        assert_eq!(enabled_only.members.len(), 1);

        let all = manager.populate_users_for_group(&group_x, true);
        assert_eq!(all.members.len(), 2);
    }

    #[tokio::test]
    async fn populate_counts_misses_for_unresolved_member_dns() {
        let state = seeded_state();
        {
            let mut s = state.write();
            // a dangling member DN with no matching user — a stale index entry.
            s.groups[0].members.push("cn=ghost,dc=example,dc=com".into());
        }
        let manager = CacheManager::with_default_period();
        let client = MockDirectoryClient::new(state);
        manager.warm_up(&client).await.unwrap();

        let group_x = manager.groups().find_by_dn("cn=groupX,dc=example,dc=com").unwrap();
        let before_misses = manager.metrics().cache_misses();
        let with_members = manager.populate_users_for_group(&group_x, true);

        // one real member resolves (hit), the ghost DN does not (miss).
        assert_eq!(with_members.members.len(), 1);
        assert_eq!(manager.metrics().cache_misses(), before_misses + 1);
    }

    #[tokio::test]
    async fn degraded_but_available_on_refresh_failure() {
        struct FailingClient;

        #[async_trait::async_trait]
        impl DirectoryClient for FailingClient {
            async fn find_users(&self) -> crate::error::Result<Vec<User>> {
                Err(crate::error::CoreError::Directory("down".into()))
            }
            async fn find_groups(&self) -> crate::error::Result<Vec<Group>> {
                Ok(vec![])
            }
            async fn find_computers(&self) -> crate::error::Result<Vec<Computer>> {
                Ok(vec![])
            }
            async fn check_password_for_sam_account_name(
                &self,
                _sam: &str,
                _secret: &str,
            ) -> crate::error::Result<User> {
                unimplemented!()
            }
            async fn add_user_to_group(&self, _u: &str, _g: &str) -> crate::error::Result<()> {
                unimplemented!()
            }
            async fn remove_user_from_group(&self, _u: &str, _g: &str) -> crate::error::Result<()> {
                unimplemented!()
            }
        }

        let manager = CacheManager::with_default_period();
        let good_client = MockDirectoryClient::new(seeded_state());
        manager.warm_up(&good_client).await.unwrap();
        assert_eq!(manager.users().count(), 1);

        let failing = FailingClient;
        assert!(manager.warm_up(&failing).await.is_err());
        // previous snapshot retained
        assert_eq!(manager.users().count(), 1);
        assert_eq!(manager.metrics().refresh_errors(), 1);
    }
}
