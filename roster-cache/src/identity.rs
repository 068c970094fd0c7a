//! Weak identity cache.
//!
//! One map per entity kind, key to `Weak<T>`. A lookup either upgrades the
//! existing weak entry or constructs, registers and returns a new instance.
//! The whole check-then-create sequence runs under one mutex, so two callers
//! racing on the same key always observe the same `Arc`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use roster_core::EntityKind;
use tracing::debug;

use crate::stats::CacheStats;

/// Dead entries are swept once the map grows past this many slots.
const MIN_SWEEP_THRESHOLD: usize = 64;

struct Entries<T> {
    map: HashMap<String, Weak<T>>,
    sweep_at: usize,
}

/// Key to weakly held instance registry for one entity kind.
pub struct IdentityMap<T> {
    kind: EntityKind,
    entries: Mutex<Entries<T>>,
    hits: AtomicU64,
    misses: AtomicU64,
    reclaimed: AtomicU64,
}

impl<T> IdentityMap<T> {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                sweep_at: MIN_SWEEP_THRESHOLD,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            reclaimed: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Return the live instance for `key`, or build one with `create`.
    ///
    /// `create` runs with the map locked and must not call back into this
    /// map.
    pub fn find_or_create<F>(&self, key: &str, create: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        let mut entries = self.lock();

        if let Some(existing) = entries.map.get(key).and_then(Weak::upgrade) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return existing;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let instance = Arc::new(create());
        if entries
            .map
            .insert(key.to_string(), Arc::downgrade(&instance))
            .is_some()
        {
            // The previous instance for this key had been dropped.
            self.reclaimed.fetch_add(1, Ordering::Relaxed);
            debug!(kind = %self.kind, key, "identity cache entry rebuilt");
        }

        if entries.map.len() >= entries.sweep_at {
            let swept = Self::sweep(&mut entries.map);
            self.reclaimed.fetch_add(swept as u64, Ordering::Relaxed);
            entries.sweep_at = (entries.map.len() * 2).max(MIN_SWEEP_THRESHOLD);
        }

        instance
    }

    /// The live instance for `key`, without creating one.
    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.lock().map.get(key).and_then(Weak::upgrade)
    }

    /// Every instance still referenced somewhere, paired with its key.
    pub fn live(&self) -> Vec<(String, Arc<T>)> {
        self.lock()
            .map
            .iter()
            .filter_map(|(key, weak)| weak.upgrade().map(|strong| (key.clone(), strong)))
            .collect()
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.lock()
            .map
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries whose instance has been reclaimed. Returns how many.
    pub fn purge(&self) -> usize {
        let mut entries = self.lock();
        let swept = Self::sweep(&mut entries.map);
        self.reclaimed.fetch_add(swept as u64, Ordering::Relaxed);
        swept
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.lock().map.len() as u64,
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
        }
    }

    fn sweep(map: &mut HashMap<String, Weak<T>>) -> usize {
        let before = map.len();
        map.retain(|_, weak| weak.strong_count() > 0);
        before - map.len()
    }

    // Entries hold only weak pointers; a panic mid-insert leaves nothing
    // inconsistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Entries<T>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> std::fmt::Debug for IdentityMap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityMap")
            .field("kind", &self.kind)
            .field("stats", &self.stats())
            .finish()
    }
}
