use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};

struct Slot<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// Map whose entries expire a fixed time after they were last set or touched.
///
/// Expired entries are invisible to readers immediately and are dropped on
/// the next [`TtlCache::sweep`].
pub struct TtlCache<K, V> {
    slots: HashMap<K, Slot<V>>,
    ttl: Duration,
}

impl<K: Eq + Hash, V> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: HashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &K, now: DateTime<Utc>) -> Option<&V> {
        self.slots
            .get(key)
            .filter(|s| s.expires_at > now)
            .map(|s| &s.value)
    }

    pub fn insert(&mut self, key: K, value: V, now: DateTime<Utc>) {
        self.slots.insert(
            key,
            Slot {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Return the live entry for `key`, creating it with `make` if absent or
    /// expired. Either way the entry's lifetime restarts at `now`.
    pub fn get_or_insert_with(&mut self, key: K, now: DateTime<Utc>, make: impl FnOnce() -> V) -> &mut V {
        let expires_at = now + self.ttl;
        match self.slots.entry(key) {
            Entry::Occupied(occupied) => {
                let slot = occupied.into_mut();
                if slot.expires_at <= now {
                    slot.value = make();
                }
                slot.expires_at = expires_at;
                &mut slot.value
            }
            Entry::Vacant(vacant) => &mut vacant.insert(Slot { value: make(), expires_at }).value,
        }
    }

    pub fn iter_live(&self, now: DateTime<Utc>) -> impl Iterator<Item = (&K, &V)> {
        self.slots
            .iter()
            .filter(move |(_, s)| s.expires_at > now)
            .map(|(k, s)| (k, &s.value))
    }

    pub fn iter_live_mut(&mut self, now: DateTime<Utc>) -> impl Iterator<Item = (&K, &mut V)> {
        self.slots
            .iter_mut()
            .filter(move |(_, s)| s.expires_at > now)
            .map(|(k, s)| (k, &mut s.value))
    }

    /// Drop expired entries, returning how many were removed.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, s| s.expires_at > now);
        before - self.slots.len()
    }
}
