//! Generic per-type object cache with DN and SAMAccountName indexes (§4.2).
//!
//! One [`parking_lot::RwLock`] per typed cache guards the sequence and both
//! index maps together, so a reader never observes a sequence paired with
//! indexes from a different generation — the same atomicity discipline the
//! reference connection pool uses for its idle/active bookkeeping, applied
//! here to a read-mostly table instead of a connection set.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::directory::entities::DirectoryEntity;
use crate::metrics::CacheMetrics;

struct CacheState<T> {
    items: Vec<Arc<T>>,
    dn_index: HashMap<String, usize>,
    sam_index: HashMap<String, usize>,
}

impl<T: DirectoryEntity> CacheState<T> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            dn_index: HashMap::new(),
            sam_index: HashMap::new(),
        }
    }

    fn rebuild(items: Vec<Arc<T>>) -> Self {
        let mut dn_index = HashMap::with_capacity(items.len());
        let mut sam_index = HashMap::with_capacity(items.len());

        for (i, item) in items.iter().enumerate() {
            let dn = item.dn();
            if !dn.is_empty() {
                dn_index.insert(dn.to_string(), i);
            }
            if let Some(sam) = item.sam_account_name() {
                if !sam.is_empty() {
                    sam_index.insert(sam.to_string(), i);
                }
            }
        }

        Self {
            items,
            dn_index,
            sam_index,
        }
    }
}

/// A typed, read-mostly cache for one directory entity kind.
///
/// Shares one [`CacheMetrics`] with its siblings so `CacheHits`/`CacheMisses`
/// reflect every indexed lookup, not just the join-level calls in
/// [`crate::cache::manager::CacheManager`].
pub struct TypedCache<T: DirectoryEntity> {
    state: RwLock<CacheState<T>>,
    metrics: Arc<CacheMetrics>,
}

impl<T: DirectoryEntity> TypedCache<T> {
    pub fn new(metrics: Arc<CacheMetrics>) -> Self {
        Self {
            state: RwLock::new(CacheState::empty()),
            metrics,
        }
    }

    /// Current sequence snapshot. Cheap: clones `Arc` handles, not the items.
    pub fn get(&self) -> Vec<Arc<T>> {
        self.state.read().items.clone()
    }

    pub fn count(&self) -> usize {
        self.state.read().items.len()
    }

    pub fn find_by_dn(&self, dn: &str) -> Option<Arc<T>> {
        if dn.is_empty() {
            self.metrics.record_miss();
            return None;
        }
        let state = self.state.read();
        let found = state.dn_index.get(dn).map(|&i| Arc::clone(&state.items[i]));
        self.record_outcome(found.is_some());
        found
    }

    pub fn find_by_sam_account_name(&self, sam: &str) -> Option<Arc<T>> {
        if sam.is_empty() {
            self.metrics.record_miss();
            return None;
        }
        let state = self.state.read();
        let found = state
            .sam_index
            .get(sam)
            .map(|&i| Arc::clone(&state.items[i]));
        self.record_outcome(found.is_some());
        found
    }

    fn record_outcome(&self, hit: bool) {
        if hit {
            self.metrics.record_hit();
        } else {
            self.metrics.record_miss();
        }
    }

    pub fn find<P>(&self, mut predicate: P) -> Option<Arc<T>>
    where
        P: FnMut(&T) -> bool,
    {
        self.state
            .read()
            .items
            .iter()
            .find(|item| predicate(item))
            .cloned()
    }

    /// May return an empty `Vec` — never a special "no match" sentinel.
    pub fn filter<P>(&self, mut predicate: P) -> Vec<Arc<T>>
    where
        P: FnMut(&T) -> bool,
    {
        self.state
            .read()
            .items
            .iter()
            .filter(|item| predicate(item))
            .cloned()
            .collect()
    }

    /// Replace the entire sequence and rebuild both indexes atomically.
    /// Duplicate DNs (or SAMAccountNames) resolve last-write-wins because
    /// later entries overwrite earlier index slots during the rebuild scan.
    pub fn set_all(&self, items: Vec<T>) {
        let wrapped = items.into_iter().map(Arc::new).collect();
        let mut state = self.state.write();
        *state = CacheState::rebuild(wrapped);
    }

    /// Apply `visit` to every item in place, then rebuild both indexes.
    /// Held entirely under the writer lock — concurrent readers see either
    /// the fully-old or fully-new generation, never a partial mutation.
    pub fn update<F>(&self, mut visit: F)
    where
        F: FnMut(&mut T),
        T: Clone,
    {
        let mut state = self.state.write();
        let mutated: Vec<Arc<T>> = state
            .items
            .iter()
            .map(|item| {
                let mut owned = (**item).clone();
                visit(&mut owned);
                Arc::new(owned)
            })
            .collect();
        *state = CacheState::rebuild(mutated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::entities::{Group, User};

    fn new_cache<T: DirectoryEntity>() -> TypedCache<T> {
        TypedCache::new(Arc::new(CacheMetrics::new()))
    }

    fn user(dn: &str, sam: &str) -> User {
        User {
            dn: dn.to_string(),
            sam_account_name: sam.to_string(),
            enabled: true,
            groups: vec![],
        }
    }

    #[test]
    fn find_by_dn_after_set_all() {
        let cache = new_cache::<User>();
        let alice = user("cn=alice,dc=example,dc=com", "alice");
        let bob = user("cn=bob,dc=example,dc=com", "bob");
        cache.set_all(vec![alice.clone(), bob.clone()]);

        assert_eq!(cache.find_by_dn(&alice.dn).unwrap().dn, alice.dn);
        assert_eq!(cache.find_by_dn(&bob.dn).unwrap().dn, bob.dn);
    }

    #[test]
    fn empty_dn_always_misses() {
        let cache = new_cache::<User>();
        cache.set_all(vec![user("cn=alice,dc=example,dc=com", "alice")]);
        assert!(cache.find_by_dn("").is_none());
    }

    #[test]
    fn empty_dn_entities_are_stored_but_not_indexed() {
        let cache = new_cache::<User>();
        cache.set_all(vec![user("", "orphan")]);
        assert_eq!(cache.count(), 1);
        assert!(cache.find_by_dn("").is_none());
    }

    #[test]
    fn empty_sam_account_name_always_misses() {
        let cache = new_cache::<User>();
        cache.set_all(vec![user("cn=alice,dc=example,dc=com", "")]);
        assert!(cache.find_by_sam_account_name("").is_none());
    }

    #[test]
    fn set_all_round_trips_as_multiset() {
        let cache = new_cache::<User>();
        let seed = vec![
            user("cn=a,dc=example,dc=com", "a"),
            user("cn=b,dc=example,dc=com", "b"),
            user("cn=c,dc=example,dc=com", "c"),
        ];
        cache.set_all(seed.clone());
        let mut got: Vec<User> = cache.get().into_iter().map(|a| (*a).clone()).collect();
        let mut want = seed;
        got.sort_by(|a, b| a.dn.cmp(&b.dn));
        want.sort_by(|a, b| a.dn.cmp(&b.dn));
        assert_eq!(got, want);
    }

    #[test]
    fn duplicate_dn_last_write_wins() {
        let cache = new_cache::<User>();
        let mut first = user("cn=dup,dc=example,dc=com", "first");
        let second = user("cn=dup,dc=example,dc=com", "second");
        first.enabled = false;
        cache.set_all(vec![first, second.clone()]);

        let found = cache.find_by_dn("cn=dup,dc=example,dc=com").unwrap();
        assert_eq!(found.sam_account_name, "second");
    }

    #[test]
    fn update_mutates_and_reindexes() {
        let cache = new_cache::<User>();
        cache.set_all(vec![user("cn=alice,dc=example,dc=com", "alice")]);

        cache.update(|u| u.enabled = false);

        let found = cache.find_by_dn("cn=alice,dc=example,dc=com").unwrap();
        assert!(!found.enabled);
    }

    #[test]
    fn filter_returns_empty_vec_not_panic_on_no_match() {
        let cache = new_cache::<User>();
        cache.set_all(vec![user("cn=alice,dc=example,dc=com", "alice")]);
        let matches = cache.filter(|u| u.sam_account_name == "nobody");
        assert!(matches.is_empty());
    }

    #[test]
    fn group_cache_indexes_members_but_not_sam() {
        let cache = new_cache::<Group>();
        cache.set_all(vec![Group {
            dn: "cn=admins,dc=example,dc=com".into(),
            members: vec!["cn=alice,dc=example,dc=com".into()],
        }]);
        assert!(cache.find_by_dn("cn=admins,dc=example,dc=com").is_some());
        assert!(cache.find_by_sam_account_name("admins").is_none());
    }

    #[test]
    fn indexed_lookups_record_hits_and_misses() {
        let metrics = Arc::new(CacheMetrics::new());
        let cache: TypedCache<User> = TypedCache::new(Arc::clone(&metrics));
        cache.set_all(vec![user("cn=alice,dc=example,dc=com", "alice")]);

        cache.find_by_dn("cn=alice,dc=example,dc=com");
        cache.find_by_dn("cn=nobody,dc=example,dc=com");
        cache.find_by_sam_account_name("alice");
        cache.find_by_sam_account_name("nobody");

        assert_eq!(metrics.cache_hits(), 2);
        assert_eq!(metrics.cache_misses(), 2);
    }
}
