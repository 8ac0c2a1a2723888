//! Shared, thread-safe server statistics counters.

use dashmap::DashMap;
use std::sync::Arc;

/// A cheaply-cloneable map of named counters, shared across every
/// connection task spawned by a [`crate::Server`].
#[derive(Debug, Clone, Default)]
pub struct Stats {
    counters: Arc<DashMap<String, i64>>,
}

impl Stats {
    pub fn new() -> Self {
        Stats {
            counters: Arc::new(DashMap::new()),
        }
    }

    pub fn incr(&self, key: &str, delta: i64) -> i64 {
        let mut entry = self.counters.entry(key.to_string()).or_insert(0);
        *entry += delta;
        *entry
    }

    pub fn get(&self, key: &str) -> i64 {
        self.counters.get(key).map(|v| *v).unwrap_or(0)
    }

    pub fn set(&self, key: &str, value: i64) {
        self.counters.insert(key.to_string(), value);
    }
}
