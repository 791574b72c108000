//! Per-request fingerprinted response memoization (§4.4).
//!
//! A single `parking_lot::Mutex` guards the map and LRU bookkeeping
//! together, the same single-lock discipline the rate limiter uses for its
//! per-IP table — there's no read-heavy fan-out here to justify a
//! reader-writer split the way the typed object cache needs one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;

struct Entry {
    bytes: Vec<u8>,
    created_at: Instant,
    ttl: Duration,
    last_accessed: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseCacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct State {
    entries: HashMap<String, Entry>,
}

/// Fingerprinted response cache with TTL expiry and LRU eviction at capacity.
pub struct ResponseCache {
    state: Mutex<State>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    shutdown: Arc<AtomicBool>,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

/// `hash(path ‖ sorted(query) ‖ user-identity)`. User identity is mandatory
/// so two users' renders can never collide on the same key.
pub fn fingerprint(path: &str, query: &[(String, String)], user_identity: &str) -> String {
    let mut sorted_query = query.to_vec();
    sorted_query.sort();

    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(b"\0");
    for (k, v) in &sorted_query {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b"&");
    }
    hasher.update(b"\0");
    hasher.update(user_identity.as_bytes());

    format!("{:x}", hasher.finalize())
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                entries: HashMap::new(),
            }),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            shutdown: Arc::new(AtomicBool::new(false)),
            sweep_task: Mutex::new(None),
        })
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        match state.entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.last_accessed = Instant::now();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.bytes.clone())
            }
            Some(_) => {
                // Expired: miss, but the sweeper is responsible for eviction.
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set(&self, key: String, bytes: Vec<u8>, ttl: Duration) {
        let mut state = self.state.lock();
        if state.entries.len() >= self.capacity && !state.entries.contains_key(&key) {
            if let Some(lru_key) = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone())
            {
                state.entries.remove(&lru_key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        let now = Instant::now();
        state.entries.insert(
            key,
            Entry {
                bytes,
                created_at: now,
                ttl,
                last_accessed: now,
            },
        );
    }

    /// Global clear: the reference behavior this cache follows drops every
    /// entry whenever a non-empty path is invalidated, rather than tracking
    /// a reverse path→keys index.
    pub fn invalidate_by_path(&self, path: &str) {
        if path.is_empty() {
            return;
        }
        self.clear();
    }

    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    pub fn stats(&self) -> ResponseCacheStats {
        let state = self.state.lock();
        ResponseCacheStats {
            entries: state.entries.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) {
        let mut guard = self.sweep_task.lock();
        if guard.is_some() {
            return;
        }
        let cache = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        let handle = tokio::task::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let mut state = cache.state.lock();
                let before = state.entries.len();
                state.entries.retain(|_, entry| !entry.is_expired());
                let swept = before - state.entries.len();
                if swept > 0 {
                    cache.evictions.fetch_add(swept as u64, Ordering::Relaxed);
                }
            }
        });
        *guard = Some(handle);
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.sweep_task.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for ResponseCache {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_differs_by_user_identity() {
        let a = fingerprint("/users", &[], "alice");
        let b = fingerprint("/users", &[], "bob");
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_is_order_independent_over_query() {
        let a = fingerprint("/users", &[("b".into(), "2".into()), ("a".into(), "1".into())], "alice");
        let b = fingerprint("/users", &[("a".into(), "1".into()), ("b".into(), "2".into())], "alice");
        assert_eq!(a, b);
    }

    #[test]
    fn get_set_round_trip() {
        let cache = ResponseCache::new(10);
        cache.set("k1".into(), b"hello".to_vec(), Duration::from_secs(60));
        assert_eq!(cache.get("k1"), Some(b"hello".to_vec()));
    }

    #[test]
    fn expired_entry_misses_without_panicking() {
        let cache = ResponseCache::new(10);
        cache.set("k1".into(), b"hello".to_vec(), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k1"), None);
    }

    #[test]
    fn lru_eviction_at_capacity() {
        let cache = ResponseCache::new(2);
        cache.set("a".into(), b"1".to_vec(), Duration::from_secs(60));
        cache.set("b".into(), b"2".to_vec(), Duration::from_secs(60));
        // touch "a" so it's most-recently-used
        let _ = cache.get("a");
        cache.set("c".into(), b"3".to_vec(), Duration::from_secs(60));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn invalidate_by_path_clears_everything() {
        let cache = ResponseCache::new(10);
        cache.set("a".into(), b"1".to_vec(), Duration::from_secs(60));
        cache.set("b".into(), b"2".to_vec(), Duration::from_secs(60));
        cache.invalidate_by_path("/users");
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn invalidate_by_empty_path_is_noop() {
        let cache = ResponseCache::new(10);
        cache.set("a".into(), b"1".to_vec(), Duration::from_secs(60));
        cache.invalidate_by_path("");
        assert_eq!(cache.stats().entries, 1);
    }
}
