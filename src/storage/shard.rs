//! A single storage shard.
//!
//! Each shard owns a `HashMap` of entries plus a dense `Vec` of the keys it
//! currently holds. The vector exists so the expiration task can pick random
//! keys in O(1); every entry remembers its position in it so removal is also
//! O(1) (swap the last key into the hole, then fix the moved key's position).
//!
//! ```text
//!   keys:    [ "a" , "b" , "c" , "d" ]        remove("b")
//!               0     1     2     3
//!                                            keys:    [ "a" , "d" , "c" ]
//!   entries: a -> pos 0                      entries: a -> pos 0
//!            b -> pos 1                               d -> pos 1   (moved)
//!            c -> pos 2                               c -> pos 2
//!            d -> pos 3
//! ```
//!
//! Both structures live behind one `RwLock` so they are never observed out
//! of sync.

use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A stored value with its expiry bookkeeping.
#[derive(Debug)]
struct Entry<V> {
    /// The caller's value
    value: V,
    /// When this entry expires (None = never expires)
    expires_at: Option<Instant>,
    /// Index of this entry's key in `ShardInner::keys`
    position: usize,
}

impl<V> Entry<V> {
    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// Lock-protected state of a shard.
#[derive(Debug)]
struct ShardInner<V> {
    entries: HashMap<Arc<str>, Entry<V>>,
    keys: Vec<Arc<str>>,
}

impl<V> ShardInner<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            keys: Vec::new(),
        }
    }

    /// Inserts or overwrites `key`. An existing key keeps its position.
    fn upsert(&mut self, key: String, value: V, expires_at: Option<Instant>) {
        if let Some(entry) = self.entries.get_mut(key.as_str()) {
            entry.value = value;
            entry.expires_at = expires_at;
            return;
        }

        let key: Arc<str> = Arc::from(key);
        let position = self.keys.len();
        self.keys.push(Arc::clone(&key));
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at,
                position,
            },
        );
    }

    /// Removes `key` from both the map and the key list.
    fn remove_entry(&mut self, key: &str) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        let position = entry.position;

        self.keys.swap_remove(position);
        if let Some(moved) = self.keys.get(position) {
            if let Some(moved_entry) = self.entries.get_mut(moved) {
                moved_entry.position = position;
            }
        }

        Some(entry)
    }
}

/// Result of one random sampling round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SampleOutcome {
    /// Number of keys drawn
    pub sampled: usize,
    /// Number of drawn keys that were expired and removed
    pub expired: usize,
}

/// An independently locked partition of the key space.
#[derive(Debug)]
pub(crate) struct Shard<V> {
    inner: RwLock<ShardInner<V>>,
    /// Entries removed because a read found them expired
    lazy_expired: AtomicU64,
    /// Entries removed by sampling or a full purge
    active_expired: AtomicU64,
}

impl<V: Clone> Shard<V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ShardInner::new()),
            lazy_expired: AtomicU64::new(0),
            active_expired: AtomicU64::new(0),
        }
    }

    /// Gets the value for a key.
    ///
    /// An expired entry is removed on the spot (lazy expiry) and reported
    /// as absent.
    pub fn get(&self, key: &str) -> Option<V> {
        // Fast path under the read lock
        {
            let inner = self.inner.read();
            let entry = inner.entries.get(key)?;
            if !entry.is_expired(Instant::now()) {
                return Some(entry.value.clone());
            }
        }

        let mut inner = self.inner.write();
        let entry = inner.entries.get(key)?;
        if !entry.is_expired(Instant::now()) {
            // Race: another writer replaced the key between the two locks
            return Some(entry.value.clone());
        }

        inner.remove_entry(key);
        self.lazy_expired.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Inserts or overwrites a key, replacing its expiry with `ttl`.
    ///
    /// A TTL too large to represent as an `Instant` never expires.
    pub fn set(&self, key: String, value: V, ttl: Option<Duration>) {
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));

        self.inner.write().upsert(key, value, expires_at);
    }

    /// Removes a key, returning its value if it was still live.
    pub fn remove(&self, key: &str) -> Option<V> {
        let entry = self.inner.write().remove_entry(key)?;
        if entry.is_expired(Instant::now()) {
            None
        } else {
            Some(entry.value)
        }
    }

    /// Checks whether a live entry exists without touching it.
    pub fn contains(&self, key: &str) -> bool {
        let inner = self.inner.read();
        inner
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.keys.clear();
    }

    /// Removes every expired entry in one pass.
    pub fn purge_expired(&self) -> u64 {
        let now = Instant::now();
        let mut inner = self.inner.write();

        let expired: Vec<Arc<str>> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| Arc::clone(key))
            .collect();

        for key in &expired {
            inner.remove_entry(key);
        }

        let removed = expired.len() as u64;
        self.active_expired.fetch_add(removed, Ordering::Relaxed);
        removed
    }

    /// Draws up to `sample_size` random keys and removes the expired ones.
    ///
    /// Keys are drawn with replacement under the read lock; the removals
    /// happen afterwards under the write lock, re-checking each candidate
    /// since it may have been overwritten or removed in between.
    pub fn expire_sample(&self, sample_size: usize) -> SampleOutcome {
        let (sampled, candidates) = {
            let inner = self.inner.read();
            let len = inner.keys.len();
            let sampled = sample_size.min(len);
            if sampled == 0 {
                return SampleOutcome::default();
            }

            let now = Instant::now();
            let mut rng = rand::rng();
            let candidates: Vec<Arc<str>> = (0..sampled)
                .map(|_| &inner.keys[rng.random_range(0..len)])
                .filter(|key| {
                    inner
                        .entries
                        .get(&***key)
                        .is_some_and(|entry| entry.is_expired(now))
                })
                .cloned()
                .collect();

            (sampled, candidates)
        };

        let mut expired = 0;
        if !candidates.is_empty() {
            let now = Instant::now();
            let mut inner = self.inner.write();
            for key in &candidates {
                let still_expired = inner
                    .entries
                    .get(&**key)
                    .is_some_and(|entry| entry.is_expired(now));
                if still_expired {
                    inner.remove_entry(key);
                    expired += 1;
                }
            }
        }

        self.active_expired
            .fetch_add(expired as u64, Ordering::Relaxed);

        SampleOutcome { sampled, expired }
    }

    pub fn lazy_expired(&self) -> u64 {
        self.lazy_expired.load(Ordering::Relaxed)
    }

    pub fn active_expired(&self) -> u64 {
        self.active_expired.load(Ordering::Relaxed)
    }

    /// Panics if the key list and the map disagree.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        let inner = self.inner.read();
        assert_eq!(inner.keys.len(), inner.entries.len());
        for (position, key) in inner.keys.iter().enumerate() {
            let entry = inner
                .entries
                .get(key)
                .unwrap_or_else(|| panic!("key {:?} missing from map", key));
            assert_eq!(entry.position, position, "stale position for {:?}", key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::thread;

    #[test]
    fn test_set_and_get() {
        let shard = Shard::new();

        shard.set("key".to_string(), 1, None);
        assert_eq!(shard.get("key"), Some(1));
        assert_eq!(shard.get("missing"), None);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let shard = Shard::new();

        shard.set("a".to_string(), 1, None);
        shard.set("b".to_string(), 2, None);
        shard.set("a".to_string(), 3, None);

        assert_eq!(shard.len(), 2);
        assert_eq!(shard.get("a"), Some(3));
        assert_eq!(shard.inner.read().entries["a"].position, 0);
        shard.assert_consistent();
    }

    #[test]
    fn test_remove_swaps_last() {
        let shard = Shard::new();
        for key in ["a", "b", "c", "d"] {
            shard.set(key.to_string(), key.to_string(), None);
        }

        assert_eq!(shard.remove("b"), Some("b".to_string()));

        {
            let inner = shard.inner.read();
            let keys: Vec<&str> = inner.keys.iter().map(|k| &**k).collect();
            assert_eq!(keys, vec!["a", "d", "c"]);
            assert_eq!(inner.entries["d"].position, 1);
        }
        shard.assert_consistent();

        // Removing every key in turn keeps the bookkeeping intact
        for key in ["a", "c", "d"] {
            shard.remove(key);
            shard.assert_consistent();
        }
        assert_eq!(shard.len(), 0);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let shard: Shard<i32> = Shard::new();
        assert_eq!(shard.remove("missing"), None);
        shard.assert_consistent();
    }

    #[test]
    fn test_lazy_expiry() {
        let shard = Shard::new();

        shard.set("key".to_string(), 1, Some(Duration::from_millis(20)));
        assert_eq!(shard.get("key"), Some(1));
        assert!(shard.contains("key"));

        thread::sleep(Duration::from_millis(40));

        // Still physically present until something touches it
        assert_eq!(shard.len(), 1);
        assert!(!shard.contains("key"));
        assert_eq!(shard.get("key"), None);
        assert_eq!(shard.len(), 0);
        assert_eq!(shard.lazy_expired(), 1);
        shard.assert_consistent();
    }

    #[test]
    fn test_set_without_ttl_clears_expiry() {
        let shard = Shard::new();

        shard.set("key".to_string(), 1, Some(Duration::from_millis(10)));
        shard.set("key".to_string(), 2, None);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(shard.get("key"), Some(2));
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let shard = Shard::new();

        shard.set("key".to_string(), 1, Some(Duration::ZERO));
        assert_eq!(shard.get("key"), None);
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let shard = Shard::new();

        shard.set("key".to_string(), 1, Some(Duration::MAX));
        assert_eq!(shard.get("key"), Some(1));
    }

    #[test]
    fn test_remove_expired_returns_none() {
        let shard = Shard::new();

        shard.set("key".to_string(), 1, Some(Duration::ZERO));
        assert_eq!(shard.remove("key"), None);
        assert_eq!(shard.len(), 0);
    }

    #[test]
    fn test_purge_expired() {
        let shard = Shard::new();

        for i in 0..10 {
            shard.set(format!("short:{}", i), i, Some(Duration::from_millis(10)));
            shard.set(format!("long:{}", i), i, None);
        }

        thread::sleep(Duration::from_millis(30));

        assert_eq!(shard.purge_expired(), 10);
        assert_eq!(shard.len(), 10);
        assert_eq!(shard.active_expired(), 10);
        shard.assert_consistent();
    }

    #[test]
    fn test_expire_sample_empty() {
        let shard: Shard<i32> = Shard::new();
        assert_eq!(shard.expire_sample(20), SampleOutcome::default());
    }

    #[test]
    fn test_expire_sample_caps_at_len() {
        let shard = Shard::new();
        for i in 0..5 {
            shard.set(format!("key:{}", i), i, None);
        }

        let outcome = shard.expire_sample(20);
        assert_eq!(outcome.sampled, 5);
        assert_eq!(outcome.expired, 0);
        assert_eq!(shard.len(), 5);
    }

    #[test]
    fn test_expire_sample_removes_expired() {
        let shard = Shard::new();
        for i in 0..50 {
            shard.set(format!("key:{}", i), i, Some(Duration::ZERO));
        }

        let outcome = shard.expire_sample(20);
        assert_eq!(outcome.sampled, 20);
        // Draws are with replacement, so duplicates are only removed once
        assert!(outcome.expired >= 1 && outcome.expired <= 20);
        assert_eq!(shard.len(), 50 - outcome.expired);
        shard.assert_consistent();
    }

    #[test]
    fn test_concurrent_access() {
        let shard = Arc::new(Shard::new());
        let mut handles = vec![];

        for t in 0..8 {
            let shard = Arc::clone(&shard);
            handles.push(thread::spawn(move || {
                for i in 0..500 {
                    let key = format!("key:{}", (i * 7 + t) % 64);
                    match i % 4 {
                        0 => shard.set(key, i, Some(Duration::from_micros(50))),
                        1 => shard.set(key, i, None),
                        2 => {
                            shard.get(&key);
                        }
                        _ => {
                            shard.remove(&key);
                        }
                    }
                    if i % 16 == 0 {
                        shard.expire_sample(20);
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        shard.assert_consistent();
        assert!(shard.len() <= 64);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Set(u8),
        SetExpired(u8),
        Remove(u8),
        Get(u8),
        Sample,
        Purge,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..16).prop_map(Op::Set),
            (0u8..16).prop_map(Op::SetExpired),
            (0u8..16).prop_map(Op::Remove),
            (0u8..16).prop_map(Op::Get),
            Just(Op::Sample),
            Just(Op::Purge),
        ]
    }

    proptest! {
        #[test]
        fn prop_bookkeeping_stays_consistent(ops in proptest::collection::vec(op(), 0..200)) {
            let shard = Shard::new();
            let mut live = std::collections::HashSet::new();

            for op in ops {
                match op {
                    Op::Set(k) => {
                        shard.set(k.to_string(), k, None);
                        live.insert(k);
                    }
                    Op::SetExpired(k) => {
                        shard.set(k.to_string(), k, Some(Duration::ZERO));
                        live.remove(&k);
                    }
                    Op::Remove(k) => {
                        shard.remove(&k.to_string());
                        live.remove(&k);
                    }
                    Op::Get(k) => {
                        let expected = live.contains(&k).then_some(k);
                        prop_assert_eq!(shard.get(&k.to_string()), expected);
                    }
                    Op::Sample => {
                        shard.expire_sample(4);
                    }
                    Op::Purge => {
                        shard.purge_expired();
                    }
                }
                shard.assert_consistent();
            }

            for k in live {
                prop_assert_eq!(shard.get(&k.to_string()), Some(k));
            }
        }
    }
}
