use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Cache key: one user asking for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    pub user: String,
    pub resource_group: String,
    pub resource: String,
}

impl DecisionKey {
    pub fn new(user: &str, resource_group: &str, resource: &str) -> Self {
        Self {
            user: user.to_string(),
            resource_group: resource_group.to_string(),
            resource: resource.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedDecision {
    allowed: bool,
    computed_at: Instant,
}

/// Short-TTL decision memo. Allow and deny are cached alike; a policy reload
/// does not flush it, entries just age out.
#[derive(Debug)]
pub struct DecisionCache {
    ttl: Duration,
    entries: DashMap<DecisionKey, CachedDecision>,
}

impl DecisionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &DecisionKey) -> Option<bool> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &DecisionKey, now: Instant) -> Option<bool> {
        let hit = self.entries.get(key)?;
        if now.saturating_duration_since(hit.computed_at) < self.ttl {
            Some(hit.allowed)
        } else {
            None
        }
    }

    pub fn insert(&self, key: DecisionKey, allowed: bool) {
        self.insert_at(key, allowed, Instant::now());
    }

    pub fn insert_at(&self, key: DecisionKey, allowed: bool, now: Instant) {
        self.entries.insert(
            key,
            CachedDecision {
                allowed,
                computed_at: now,
            },
        );
    }

    /// Drop expired entries; returns how many were removed.
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, d| now.saturating_duration_since(d.computed_at) < ttl);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
