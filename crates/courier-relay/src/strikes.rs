// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consecutive-event counters used by the circuit breaker and the audit.

use std::hash::Hash;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Strike {
    count: u32,
    last: Instant,
}

/// Counts consecutive strikes per key. A reset removes the key entirely.
pub struct StrikeCounter<K> {
    strikes: DashMap<K, Strike>,
}

impl<K: Eq + Hash> Default for StrikeCounter<K> {
    fn default() -> Self {
        Self {
            strikes: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash> StrikeCounter<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one strike and return the new count.
    pub fn hit(&self, key: K) -> u32 {
        let now = Instant::now();
        let mut strike = self.strikes.entry(key).or_insert(Strike {
            count: 0,
            last: now,
        });
        strike.count = strike.count.saturating_add(1);
        strike.last = now;
        strike.count
    }

    pub fn reset(&self, key: &K) {
        self.strikes.remove(key);
    }

    pub fn count(&self, key: &K) -> u32 {
        self.strikes.get(key).map_or(0, |s| s.count)
    }

    /// Forget keys whose last strike is older than `ttl`.
    pub fn evict_stale(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let before = self.strikes.len();
        self.strikes
            .retain(|_, strike| now.duration_since(strike.last) < ttl);
        before.saturating_sub(self.strikes.len())
    }

    pub fn len(&self) -> usize {
        self.strikes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strikes.is_empty()
    }
}
