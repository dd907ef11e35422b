// ABOUTME: Bounded-TTL in-process cache used for geocoding results
// ABOUTME: Concurrent map with injectable clock so tests control entry expiry
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Process-wide TTL cache
//!
//! Entries are read-check-then-write without cross-request locking; two
//! concurrent misses for the same key may both fetch and overwrite, which is
//! an accepted idempotent race for the lookups cached here.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Time source abstraction so tests can advance time without sleeping
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> SystemTime;
}

/// Production clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

struct Entry<V> {
    value: V,
    inserted_at: SystemTime,
}

/// Concurrent cache whose entries expire after a fixed TTL
pub struct TtlCache<K, V> {
    map: DashMap<K, Entry<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create a cache with the given TTL and the system clock
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a cache with an injected clock
    #[must_use]
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            map: DashMap::new(),
            ttl,
            clock,
        }
    }

    /// Look up a live entry, dropping it if expired
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        if let Some(entry) = self.map.get(key) {
            let age = now
                .duration_since(entry.inserted_at)
                .unwrap_or(Duration::MAX);
            if age < self.ttl {
                return Some(entry.value.clone());
            }
        }
        // Expired (or clock skew): remove outside the read guard
        self.map.remove(key);
        None
    }

    /// Insert or overwrite an entry, resetting its age
    pub fn insert(&self, key: K, value: V) {
        self.map.insert(
            key,
            Entry {
                value,
                inserted_at: self.clock.now(),
            },
        );
    }

    /// Number of entries currently stored, including expired ones
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop all expired entries
    pub fn clear_expired(&self) {
        let now = self.clock.now();
        self.map.retain(|_, entry| {
            now.duration_since(entry.inserted_at)
                .unwrap_or(Duration::MAX)
                < self.ttl
        });
    }
}
