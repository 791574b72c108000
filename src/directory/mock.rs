//! In-memory [`DirectoryClient`] / [`DirectoryClientFactory`] used by
//! integration tests and local demos. Never speaks LDAP; exists purely so
//! the pool and cache can be exercised without a real directory server.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::directory::client::{DirectoryClient, DirectoryClientFactory};
use crate::directory::entities::{Computer, Group, User};
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Default)]
pub struct MockDirectoryState {
    pub users: Vec<User>,
    pub groups: Vec<Group>,
    pub computers: Vec<Computer>,
    /// sam_account_name -> secret, for `check_password_for_sam_account_name`.
    pub passwords: std::collections::HashMap<String, String>,
}

pub struct MockDirectoryClient {
    state: Arc<RwLock<MockDirectoryState>>,
}

impl MockDirectoryClient {
    pub fn new(state: Arc<RwLock<MockDirectoryState>>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl DirectoryClient for MockDirectoryClient {
    async fn find_users(&self) -> Result<Vec<User>> {
        Ok(self.state.read().users.clone())
    }

    async fn find_groups(&self) -> Result<Vec<Group>> {
        Ok(self.state.read().groups.clone())
    }

    async fn find_computers(&self) -> Result<Vec<Computer>> {
        Ok(self.state.read().computers.clone())
    }

    async fn check_password_for_sam_account_name(&self, sam: &str, secret: &str) -> Result<User> {
        let state = self.state.read();
        match state.passwords.get(sam) {
            Some(expected) if expected == secret => state
                .users
                .iter()
                .find(|u| u.sam_account_name == sam)
                .cloned()
                .ok_or_else(|| CoreError::UserNotFound(sam.to_string())),
            Some(_) => Err(CoreError::InvalidCredentials),
            None => Err(CoreError::UserNotFound(sam.to_string())),
        }
    }

    async fn add_user_to_group(&self, user_dn: &str, group_dn: &str) -> Result<()> {
        let mut state = self.state.write();
        let mut found = false;
        if let Some(user) = state.users.iter_mut().find(|u| u.dn == user_dn) {
            if !user.groups.iter().any(|g| g == group_dn) {
                user.groups.push(group_dn.to_string());
            }
            found = true;
        }
        if !found {
            return Err(CoreError::UserNotFound(user_dn.to_string()));
        }
        match state.groups.iter_mut().find(|g| g.dn == group_dn) {
            Some(group) => {
                if !group.members.iter().any(|m| m == user_dn) {
                    group.members.push(user_dn.to_string());
                }
                Ok(())
            }
            None => Err(CoreError::GroupNotFound(group_dn.to_string())),
        }
    }

    async fn remove_user_from_group(&self, user_dn: &str, group_dn: &str) -> Result<()> {
        let mut state = self.state.write();
        match state.users.iter_mut().find(|u| u.dn == user_dn) {
            Some(user) => user.groups.retain(|g| g != group_dn),
            None => return Err(CoreError::UserNotFound(user_dn.to_string())),
        }
        match state.groups.iter_mut().find(|g| g.dn == group_dn) {
            Some(group) => {
                group.members.retain(|m| m != user_dn);
                Ok(())
            }
            None => Err(CoreError::GroupNotFound(group_dn.to_string())),
        }
    }
}

pub struct MockDirectoryClientFactory {
    state: Arc<RwLock<MockDirectoryState>>,
    /// When non-empty, binds with these DNs fail with InvalidCredentials.
    pub reject_dns: Arc<RwLock<std::collections::HashSet<String>>>,
}

impl MockDirectoryClientFactory {
    pub fn new(state: Arc<RwLock<MockDirectoryState>>) -> Self {
        Self {
            state,
            reject_dns: Arc::new(RwLock::new(std::collections::HashSet::new())),
        }
    }
}

#[async_trait]
impl DirectoryClientFactory for MockDirectoryClientFactory {
    async fn with_credentials(&self, dn: &str, secret: &str) -> Result<Arc<dyn DirectoryClient>> {
        if self.reject_dns.read().contains(dn) {
            return Err(CoreError::InvalidCredentials);
        }
        let _ = secret; // the mock directory always accepts any secret for a non-rejected DN
        Ok(Arc::new(MockDirectoryClient::new(Arc::clone(&self.state))))
    }
}
