//! Namespace-scoped record cache used by repositories for cache-aside reads.
//!
//! # Responsibility
//! - Define the `Cache` contract any backend must satisfy.
//! - Provide the in-process `MemoryCache` backend and the namespace-bound
//!   `RepositoryCache` handle repositories hold.
//!
//! # Invariants
//! - Every namespace carries a generation counter; `flush` bumps it.
//! - `set` only stores a value when the caller's observed generation is still
//!   current, so a read that raced a write can never repopulate stale data.

mod memory;

pub use memory::{CacheStats, MemoryCache};

use crate::model::record::Record;
use std::sync::Arc;

/// Backend contract for the repository cache.
pub trait Cache: Send + Sync {
    /// Current generation of `namespace`. Unknown namespaces start at 0.
    fn generation(&self, namespace: &str) -> u64;

    /// Returns a live entry stored under the current generation.
    fn get(&self, namespace: &str, key: &str) -> Option<Record>;

    /// Stores `value` if `observed_generation` is still current.
    /// Returns whether the value was stored.
    fn set(&self, namespace: &str, key: &str, value: Record, observed_generation: u64) -> bool;

    fn delete(&self, namespace: &str, key: &str);

    /// Drops every entry of `namespace` and advances its generation.
    fn flush(&self, namespace: &str);
}

/// Cache handle bound to one namespace.
#[derive(Clone)]
pub struct RepositoryCache {
    namespace: String,
    backend: Arc<dyn Cache>,
}

impl RepositoryCache {
    pub fn new(namespace: impl Into<String>, backend: Arc<dyn Cache>) -> Self {
        Self {
            namespace: namespace.into(),
            backend,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn generation(&self) -> u64 {
        self.backend.generation(&self.namespace)
    }

    pub fn get(&self, key: &str) -> Option<Record> {
        self.backend.get(&self.namespace, key)
    }

    pub fn set(&self, key: &str, value: Record, observed_generation: u64) -> bool {
        self.backend
            .set(&self.namespace, key, value, observed_generation)
    }

    pub fn delete(&self, key: &str) {
        self.backend.delete(&self.namespace, key);
    }

    pub fn flush(&self) {
        self.backend.flush(&self.namespace);
    }
}

impl std::fmt::Debug for RepositoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryCache")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
