//! RAII guard releasing a connection back to the pool on drop — the Rust
//! equivalent of the try/finally-released connection called for in §9.

use std::sync::Arc;

use crate::directory::client::DirectoryClient;
use crate::pool::pool::ConnectionPool;

pub struct PooledConnectionGuard {
    pool: Arc<ConnectionPool>,
    id: u64,
    client: Arc<dyn DirectoryClient>,
}

impl PooledConnectionGuard {
    pub(crate) fn new(pool: Arc<ConnectionPool>, id: u64, client: Arc<dyn DirectoryClient>) -> Self {
        Self { pool, id, client }
    }

    pub fn client(&self) -> &dyn DirectoryClient {
        self.client.as_ref()
    }

    /// Identity of the underlying pooled connection. Exposed for tests and
    /// diagnostics; callers should otherwise treat this as opaque.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for PooledConnectionGuard {
    fn drop(&mut self) {
        self.pool.release(self.id);
    }
}
