//! Directory object cache: typed per-entity tables plus the manager that
//! composes them with a background refresh loop (§4.2).

pub mod manager;
pub mod typed_cache;

pub use manager::CacheManager;
pub use typed_cache::TypedCache;
