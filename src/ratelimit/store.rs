//! Shared storage for per-key window records.
//!
//! A store owns the `ClientKey -> WindowRecord` map and defines how
//! concurrent access to it is serialized. Every mutation of a record happens
//! while the store holds the lock covering that key, so concurrent checks for
//! the same key never lose an increment, and eviction never interleaves with a
//! check on the same key.

use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::key::ClientKey;
use super::window::{Decision, Quota, Timestamp, WindowRecord};

/// Storage backend for window records.
pub trait WindowStore: Send + Sync {
    /// Look up or create the record for `key` and count one request against it.
    fn hit(&self, key: &ClientKey, now: Timestamp, quota: &Quota) -> Decision;

    /// Remove every record whose window started at or before `cutoff`.
    ///
    /// Returns the number of records removed.
    fn evict_started_before(&self, cutoff: Timestamp) -> usize;

    /// A copy of the current record for `key`, if any.
    fn get(&self, key: &ClientKey) -> Option<WindowRecord>;

    /// Number of tracked keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all records.
    fn clear(&self);
}

/// Which store implementation to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Lock striping over hash shards.
    #[default]
    Sharded,
    /// A single global mutex.
    Locked,
}

impl StoreKind {
    /// Build an empty store of this kind.
    pub fn build(self) -> Box<dyn WindowStore> {
        match self {
            StoreKind::Sharded => Box::new(ShardedStore::new()),
            StoreKind::Locked => Box::new(LockedStore::new()),
        }
    }
}

/// A store whose keys are spread over independently locked shards.
#[derive(Debug, Default)]
pub struct ShardedStore {
    records: DashMap<ClientKey, WindowRecord>,
}

impl ShardedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WindowStore for ShardedStore {
    fn hit(&self, key: &ClientKey, now: Timestamp, quota: &Quota) -> Decision {
        // Fast path avoids cloning the key for records that already exist.
        if let Some(mut record) = self.records.get_mut(key) {
            return record.hit(now, quota);
        }

        self.records
            .entry(key.clone())
            .or_insert_with(|| WindowRecord::new(now))
            .hit(now, quota)
    }

    fn evict_started_before(&self, cutoff: Timestamp) -> usize {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = record.window_start > cutoff;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn get(&self, key: &ClientKey) -> Option<WindowRecord> {
        self.records.get(key).map(|record| *record)
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn clear(&self) {
        self.records.clear();
    }
}

/// A store guarded by one mutex.
#[derive(Debug, Default)]
pub struct LockedStore {
    records: Mutex<HashMap<ClientKey, WindowRecord>>,
}

impl LockedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WindowStore for LockedStore {
    fn hit(&self, key: &ClientKey, now: Timestamp, quota: &Quota) -> Decision {
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(key) {
            return record.hit(now, quota);
        }

        records
            .entry(key.clone())
            .or_insert_with(|| WindowRecord::new(now))
            .hit(now, quota)
    }

    fn evict_started_before(&self, cutoff: Timestamp) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| record.window_start > cutoff);
        before - records.len()
    }

    fn get(&self, key: &ClientKey) -> Option<WindowRecord> {
        self.records.lock().get(key).copied()
    }

    fn len(&self) -> usize {
        self.records.lock().len()
    }

    fn clear(&self) {
        self.records.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ClientKey {
        ClientKey::new(s).unwrap()
    }

    fn all_kinds() -> Vec<Box<dyn WindowStore>> {
        vec![StoreKind::Sharded.build(), StoreKind::Locked.build()]
    }

    #[test]
    fn test_hit_creates_record_lazily() {
        for store in all_kinds() {
            let quota = Quota::new(5, 1000).unwrap();
            assert!(store.is_empty());

            store.hit(&key("a"), Timestamp(42), &quota);

            assert_eq!(store.len(), 1);
            assert_eq!(
                store.get(&key("a")),
                Some(WindowRecord { count: 1, window_start: Timestamp(42) })
            );
            assert_eq!(store.get(&key("b")), None);
        }
    }

    #[test]
    fn test_evict_started_before() {
        for store in all_kinds() {
            let quota = Quota::new(5, 1000).unwrap();
            store.hit(&key("old"), Timestamp(100), &quota);
            store.hit(&key("edge"), Timestamp(200), &quota);
            store.hit(&key("new"), Timestamp(300), &quota);

            let removed = store.evict_started_before(Timestamp(200));

            assert_eq!(removed, 2);
            assert_eq!(store.len(), 1);
            assert!(store.get(&key("new")).is_some());
        }
    }

    #[test]
    fn test_clear() {
        for store in all_kinds() {
            let quota = Quota::new(5, 1000).unwrap();
            store.hit(&key("a"), Timestamp(0), &quota);
            store.hit(&key("b"), Timestamp(0), &quota);

            store.clear();
            assert!(store.is_empty());
        }
    }

    #[test]
    fn test_concurrent_hits_never_lose_updates() {
        for store in all_kinds() {
            let quota = Quota::new(1_000_000, 60_000).unwrap();
            let hot = key("hot");

            std::thread::scope(|s| {
                for _ in 0..8 {
                    s.spawn(|| {
                        for _ in 0..500 {
                            store.hit(&hot, Timestamp(10), &quota);
                        }
                    });
                }
            });

            assert_eq!(store.get(&hot).map(|r| r.count), Some(4000));
        }
    }

    #[test]
    fn test_store_kind_deserializes_lowercase() {
        let kind: StoreKind = serde_yaml::from_str("locked").unwrap();
        assert_eq!(kind, StoreKind::Locked);
        assert_eq!(StoreKind::default(), StoreKind::Sharded);
    }
}
