//! In-memory TTL cache for computed API payloads

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Key under which the market snapshot is cached
pub const SNAPSHOT_KEY: &str = "v1_market_snapshot";

/// Lifetime of a cached snapshot
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(60);

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Thread-safe map whose entries expire after a per-entry TTL.
/// Expired entries are evicted lazily when read.
pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<V> {
        {
            let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.evict_expired(key);
        None
    }

    /// Remove `key` only if it is still expired once the write lock is held.
    /// A fresh value stored between the read and this call survives.
    fn evict_expired(&self, key: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        if entries.get(key).is_some_and(|entry| entry.expires_at <= Instant::now()) {
            entries.remove(key);
        }
    }

    pub fn invalidate(&self, key: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
