//! Abstract directory client capability set (§6 of the spec).
//!
//! This crate never speaks the LDAP wire protocol itself — it depends on
//! an implementation of [`DirectoryClient`] supplied by the embedding
//! application, the same way the reference codebase's connection pool is
//! generic over a `ConnectionFactory<C>` rather than knowing about any one
//! backend.

use async_trait::async_trait;

use crate::directory::entities::{Computer, Group, User};
use crate::error::Result;

/// A directory session bound to one identity (or anonymous/service-account).
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn find_users(&self) -> Result<Vec<User>>;
    async fn find_groups(&self) -> Result<Vec<Group>>;
    async fn find_computers(&self) -> Result<Vec<Computer>>;

    /// Authenticate by SAMAccountName + secret and return the bound user.
    /// Implementations should return [`crate::error::CoreError::InvalidCredentials`]
    /// on bad credentials and [`crate::error::CoreError::UserNotFound`] when
    /// no such account exists.
    async fn check_password_for_sam_account_name(&self, sam: &str, secret: &str) -> Result<User>;

    async fn add_user_to_group(&self, user_dn: &str, group_dn: &str) -> Result<()>;
    async fn remove_user_from_group(&self, user_dn: &str, group_dn: &str) -> Result<()>;

    /// Cheap liveness probe used by the connection pool's maintenance loop.
    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Produces [`DirectoryClient`] handles bound to a given identity.
///
/// This is the seam the connection pool uses to create per-credential
/// connections (`WithCredentials(dn, secret) -> Client` in the spec).
#[async_trait]
pub trait DirectoryClientFactory: Send + Sync {
    async fn with_credentials(&self, dn: &str, secret: &str) -> Result<std::sync::Arc<dyn DirectoryClient>>;
}
