// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Windowed "already delivered" marks.

use std::time::Duration;

use courier_core::{DeviceId, RuleId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

/// Identity of one delivery: an inbound message routed through one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub device_id: DeviceId,
    pub chat_id: i64,
    pub message_id: i32,
    pub rule_id: RuleId,
}

/// Marks keyed by [`DedupKey`] that expire after a fixed window.
///
/// Marking is a single entry-level upsert, so two concurrent callers for the
/// same key cannot both win.
pub struct DedupCache {
    window: Duration,
    entries: DashMap<DedupKey, Instant>,
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: DashMap::new(),
        }
    }

    /// Claim `key`. Returns false when it is already marked and unexpired.
    pub fn try_mark(&self, key: DedupKey) -> bool {
        let now = Instant::now();
        match self.entries.entry(key) {
            Entry::Occupied(mut seen) => {
                if *seen.get() > now {
                    return false;
                }
                seen.insert(now + self.window);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(now + self.window);
                true
            }
        }
    }

    /// Forget a mark so the same delivery may be attempted again.
    pub fn release(&self, key: &DedupKey) {
        self.entries.remove(key);
    }

    /// Drop expired marks. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, expires| *expires > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(message_id: i32) -> DedupKey {
        DedupKey {
            device_id: DeviceId(1),
            chat_id: 100,
            message_id,
            rule_id: RuleId(9),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn marks_expire_after_the_window() {
        let cache = DedupCache::new(Duration::from_secs(300));
        assert!(cache.try_mark(key(1)));
        assert!(!cache.try_mark(key(1)));
        assert!(cache.try_mark(key(2)));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(!cache.try_mark(key(1)));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.try_mark(key(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_only_drops_expired_marks() {
        let cache = DedupCache::new(Duration::from_secs(10));
        cache.try_mark(key(1));
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.try_mark(key(2));
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(!cache.try_mark(key(2)));
    }

    #[test]
    fn release_allows_another_attempt() {
        let cache = DedupCache::new(Duration::from_secs(60));
        assert!(cache.try_mark(key(1)));
        cache.release(&key(1));
        assert!(cache.try_mark(key(1)));
    }

    #[tokio::test]
    async fn concurrent_marks_have_one_winner() {
        let cache = Arc::new(DedupCache::new(Duration::from_secs(60)));
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move { cache.try_mark(key(7)) }));
        }
        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
