//! In-process cache backend.
//!
//! Expired entries are swept from a namespace on every `set` and from all
//! namespaces on `flush`. Namespaces themselves are kept, since their
//! generation must survive for stale populates to stay rejected.

use super::Cache;
use crate::model::record::Record;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct CacheEntry {
    value: Record,
    generation: u64,
    stored_at: Instant,
}

#[derive(Default)]
struct Namespace {
    generation: u64,
    entries: HashMap<String, CacheEntry>,
}

/// Hit/miss counters and live entry count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Thread-safe in-memory cache with optional entry lifetime.
#[derive(Default)]
pub struct MemoryCache {
    namespaces: Mutex<HashMap<String, Namespace>>,
    ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries older than `ttl` are treated as misses.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self
            .lock()
            .values()
            .map(|namespace| namespace.entries.len())
            .sum();
        CacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Namespace>> {
        match self.namespaces.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.lock()
            .values_mut()
            .map(|space| self.sweep(space))
            .sum()
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        self.ttl
            .is_some_and(|ttl| entry.stored_at.elapsed() >= ttl)
    }

    fn sweep(&self, space: &mut Namespace) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let before = space.entries.len();
        space.entries.retain(|_, entry| !self.is_expired(entry));
        before - space.entries.len()
    }
}

impl Cache for MemoryCache {
    fn generation(&self, namespace: &str) -> u64 {
        self.lock()
            .get(namespace)
            .map_or(0, |namespace| namespace.generation)
    }

    fn get(&self, namespace: &str, key: &str) -> Option<Record> {
        let mut namespaces = self.lock();
        let found = namespaces.get_mut(namespace).and_then(|space| {
            let current = space.generation;
            let live = space
                .entries
                .get(key)
                .is_some_and(|entry| entry.generation == current && !self.is_expired(entry));
            if live {
                space.entries.get(key).map(|entry| entry.value.clone())
            } else {
                space.entries.remove(key);
                None
            }
        });

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    fn set(&self, namespace: &str, key: &str, value: Record, observed_generation: u64) -> bool {
        let mut namespaces = self.lock();
        let space = namespaces.entry(namespace.to_string()).or_default();
        if space.generation != observed_generation {
            return false;
        }
        self.sweep(space);
        space.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                generation: observed_generation,
                stored_at: Instant::now(),
            },
        );
        true
    }

    fn delete(&self, namespace: &str, key: &str) {
        if let Some(space) = self.lock().get_mut(namespace) {
            space.entries.remove(key);
        }
    }

    fn flush(&self, namespace: &str) {
        let mut namespaces = self.lock();
        let space = namespaces.entry(namespace.to_string()).or_default();
        space.generation += 1;
        space.entries.clear();
        for space in namespaces.values_mut() {
            self.sweep(space);
        }
    }
}
