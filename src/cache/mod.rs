//! In-process key/value cache with per-entry time-to-live.
//!
//! Expiry is lazy: an entry whose deadline has passed is treated as absent and is
//! removed by the next access that touches its key. `purge_expired` is available for
//! callers that want to reclaim memory from keys that are never read again.
//!
//! There is no capacity bound. Memory grows with the number of distinct live keys,
//! which is acceptable for per-identity attempt counters held for a few minutes.
//!
//! The map is sharded (`DashMap`), so operations on different keys rarely contend,
//! and `update` performs its read-modify-write while holding the shard lock for that
//! key.

use dashmap::{mapref::entry::Entry, DashMap};
use std::time::Duration;
use tokio::time::Instant;

// Roughly 30 years; used when `now + ttl` would overflow.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, now: Instant, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: deadline(now, ttl),
        }
    }

    /// Time left before the entry expires, `None` once it has.
    fn remaining(&self, now: Instant) -> Option<Duration> {
        if now >= self.expires_at {
            None
        } else {
            Some(self.expires_at - now)
        }
    }
}

fn deadline(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE)
}

pub struct ExpiringCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
}

impl<V: Clone> ExpiringCache<V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Return the live value stored under `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_with_ttl(key).map(|(value, _)| value)
    }

    /// Return the live value stored under `key` together with its remaining TTL.
    ///
    /// A stale entry is removed as a side effect.
    pub fn get_with_ttl(&self, key: &str) -> Option<(V, Duration)> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if let Some(remaining) = entry.remaining(now) {
                return Some((entry.value.clone(), remaining));
            }
        } else {
            return None;
        }

        // The read guard is released above; re-check under the write lock in case a
        // concurrent `set` refreshed the entry in between.
        self.entries.remove_if(key, |_, entry| entry.remaining(now).is_none());
        None
    }

    /// Store `value` under `key`, replacing any previous entry and restarting its TTL.
    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        let entry = CacheEntry::new(value, Instant::now(), ttl);
        self.entries.insert(key.to_string(), entry);
    }

    /// Remove `key`. Returns `true` if a live entry was removed.
    pub fn delete(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.remaining(now).is_some())
    }

    /// Atomically replace the value under `key` with `f(current)` and restart its TTL.
    ///
    /// `f` receives `None` when the key is absent or expired. The shard holding `key`
    /// stays locked for the duration of the call, so concurrent updates of the same key
    /// are serialised and none are lost. `f` must not access this cache.
    pub fn update<F>(&self, key: &str, ttl: Duration, f: F) -> V
    where
        F: FnOnce(Option<&V>) -> V,
    {
        let now = Instant::now();

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                let live = current.remaining(now).map(|_| &current.value);
                let value = f(live);
                occupied.insert(CacheEntry::new(value.clone(), now, ttl));
                value
            }
            Entry::Vacant(vacant) => {
                let value = f(None);
                vacant.insert(CacheEntry::new(value.clone(), now, ttl));
                value
            }
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.remaining(now).is_some());
        before.saturating_sub(self.entries.len())
    }

    /// Number of physically stored entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::advance;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn set_then_get_returns_value() {
        let cache = ExpiringCache::new();
        cache.set("a", 1_u32, TTL);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn set_overwrites_existing_value() {
        let cache = ExpiringCache::new();
        cache.set("a", 1_u32, TTL);
        cache.set("a", 2_u32, TTL);
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn delete_removes_entry() {
        let cache = ExpiringCache::new();
        cache.set("a", 1_u32, TTL);
        assert!(cache.delete("a"));
        assert_eq!(cache.get("a"), None);
        assert!(!cache.delete("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_absent_and_evicted_on_read() {
        let cache = ExpiringCache::new();
        cache.set("a", 1_u32, TTL);

        advance(TTL - Duration::from_secs(1)).await;
        assert_eq!(cache.get("a"), Some(1));

        advance(Duration::from_secs(1)).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn get_with_ttl_reports_remaining_time() {
        let cache = ExpiringCache::new();
        cache.set("a", 7_u32, TTL);
        advance(Duration::from_secs(20)).await;

        let (value, remaining) = cache.get_with_ttl("a").expect("entry should be live");
        assert_eq!(value, 7);
        assert_eq!(remaining, Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn set_resets_ttl() {
        let cache = ExpiringCache::new();
        cache.set("a", 1_u32, TTL);
        advance(Duration::from_secs(50)).await;
        cache.set("a", 2_u32, TTL);
        advance(Duration::from_secs(50)).await;
        assert_eq!(cache.get("a"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn update_sees_expired_entry_as_absent() {
        let cache = ExpiringCache::new();
        cache.set("a", 9_u32, TTL);
        advance(TTL).await;

        let value = cache.update("a", TTL, |current| current.map_or(1, |v| v + 1));
        assert_eq!(value, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn update_increments_and_resets_ttl() {
        let cache = ExpiringCache::new();
        cache.update("a", TTL, |current| current.map_or(1_u32, |v| v + 1));
        advance(Duration::from_secs(30)).await;
        let value = cache.update("a", TTL, |current| current.map_or(1_u32, |v| v + 1));
        assert_eq!(value, 2);

        let (_, remaining) = cache.get_with_ttl("a").expect("entry should be live");
        assert_eq!(remaining, TTL);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expired_drops_only_stale_entries() {
        let cache = ExpiringCache::new();
        cache.set("short", 1_u32, Duration::from_secs(5));
        cache.set("long", 2_u32, TTL);
        advance(Duration::from_secs(10)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long"), Some(2));
    }

    #[test]
    fn concurrent_updates_do_not_lose_increments() {
        let cache = Arc::new(ExpiringCache::new());
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    cache.update("shared", TTL, |current| current.map_or(1_u32, |v| v + 1));
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("worker thread panicked");
        }

        assert_eq!(cache.get("shared"), Some(50));
    }
}
