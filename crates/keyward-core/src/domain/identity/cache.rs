//! In-memory cache of resolved user profiles.
//!
//! Bounded LRU with an absolute per-entry TTL: entries past their TTL are
//! treated as a miss even before eviction. The cache is mutated by
//! successful fetches and by out-of-band `USR_MOD` event patches; reads
//! return value clones so a concurrent patch can never surface a
//! half-written record.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::domain::identity::record::{ProfilePatch, UserInfo};

struct Entry {
    info: UserInfo,
    inserted_at: Instant,
    last_used: u64,
}

struct CacheInner {
    map: HashMap<Uuid, Entry>,
    /// Monotonic use counter for LRU ordering
    clock: u64,
}

/// Bounded, time-expiring cache of user records
pub struct UserProfileCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    ttl: Duration,
}

impl UserProfileCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                clock: 0,
            }),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Fetch a cached profile, treating expired entries as a miss
    pub fn get(&self, local_id: Uuid) -> Option<UserInfo> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.clock += 1;
        let clock = inner.clock;
        let ttl = self.ttl;

        match inner.map.get_mut(&local_id) {
            Some(entry) if entry.inserted_at.elapsed() < ttl => {
                entry.last_used = clock;
                Some(entry.info.clone())
            }
            Some(_) => {
                // Expired entry, drop it eagerly
                inner.map.remove(&local_id);
                None
            }
            None => None,
        }
    }

    /// Insert or replace a profile, evicting the least recently used
    /// entry at capacity
    pub fn put(&self, info: UserInfo) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.clock += 1;
        let clock = inner.clock;
        let local_id = info.local_id;

        if !inner.map.contains_key(&local_id) && inner.map.len() >= self.capacity {
            if let Some(victim) = inner
                .map
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(id, _)| *id)
            {
                inner.map.remove(&victim);
            }
        }

        inner.map.insert(
            local_id,
            Entry {
                info,
                inserted_at: Instant::now(),
                last_used: clock,
            },
        );
    }

    /// Apply a field patch to a cached entry.
    ///
    /// No-op when the id is not currently cached; a patch never fetches
    /// and never inserts. Only fields present in the patch are touched;
    /// last writer wins at field granularity.
    pub fn patch(&self, local_id: Uuid, patch: &ProfilePatch) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        let Some(entry) = inner.map.get_mut(&local_id) else {
            return;
        };

        if let Some(is_enabled) = patch.is_enabled {
            entry.info.is_enabled = is_enabled;
        }
        if let Some(ms_max) = patch.ms_max {
            entry.info.ms_max = ms_max;
        }
        if let Some(ds_max) = patch.ds_max {
            entry.info.ds_max = ds_max;
        }
    }

    /// Drop a cached entry
    pub fn invalidate(&self, local_id: Uuid) {
        self.inner
            .lock()
            .expect("cache lock poisoned")
            .map
            .remove(&local_id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
