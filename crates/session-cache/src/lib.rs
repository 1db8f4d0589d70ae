//! `SessionCache` (C7) — per-client LRU dedup of tool schemas already sent,
//! so a client's second `tools/list` round-trip since a change need only
//! carry the delta.
//!
//! Grounded in the teacher's `DedupeStore` TTL-map idiom (an
//! `Instant`-stamped map behind a `parking_lot::Mutex`, lazily pruned on
//! read), swapped onto `lru::LruCache` for true O(1) capacity eviction —
//! the teacher's own map has no bound and never evicts by recency.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

const DEFAULT_MAX_SIZE: usize = 4096;
const DEFAULT_TTL_SECS: u64 = 6 * 60 * 60;

#[derive(Debug, Clone)]
struct SessionEntry {
    sent_schemas: HashMap<String, String>,
    last_updated: Instant,
    request_count: u64,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            sent_schemas: HashMap::new(),
            last_updated: Instant::now(),
            request_count: 0,
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_updated.elapsed() >= ttl
    }
}

/// Bounded, TTL-pruned per-session record of which tool schema hashes a
/// client has already been sent.
pub struct SessionCache {
    inner: Mutex<LruCache<String, SessionEntry>>,
    ttl: Duration,
}

impl SessionCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(max_size.max(1)).expect("max_size clamped to at least 1");
        Self {
            inner: Mutex::new(LruCache::new(cap)),
            ttl,
        }
    }

    /// True if `session` is unknown, expired, has never seen `tool`, or saw
    /// it under a different hash. Does not touch LRU order: a mere check is
    /// not a "use" of the session.
    pub fn needs_full(&self, session: &str, tool: &str, current_hash: &str) -> bool {
        let mut cache = self.inner.lock();

        let expired = match cache.peek(session) {
            Some(entry) => entry.is_expired(self.ttl),
            None => return true,
        };
        if expired {
            cache.pop(session);
            return true;
        }

        let entry = cache.peek(session).expect("checked Some above");
        match entry.sent_schemas.get(tool) {
            Some(hash) => hash != current_hash,
            None => true,
        }
    }

    /// Merge `updates` into the session's sent-schema map and promote the
    /// session to the LRU front. Creates the session if absent, evicting the
    /// least-recently-used session first if the cache is at capacity.
    pub fn update(&self, session: &str, updates: HashMap<String, String>) {
        let mut cache = self.inner.lock();
        let entry = cache.get_or_insert_mut(session.to_string(), SessionEntry::new);
        if entry.is_expired(self.ttl) {
            *entry = SessionEntry::new();
        }
        entry.sent_schemas.extend(updates);
        entry.last_updated = Instant::now();
        entry.request_count += 1;
    }

    /// Immediate removal, independent of TTL.
    pub fn invalidate(&self, session: &str) {
        self.inner.lock().pop(session);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE, Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_dedup_scenario() {
        let cache = SessionCache::default();

        assert!(cache.needs_full("s1", "tool_a", "h1"));

        cache.update("s1", HashMap::from([("tool_a".to_string(), "h1".to_string())]));
        assert!(!cache.needs_full("s1", "tool_a", "h1"));

        assert!(cache.needs_full("s1", "tool_a", "h2"));

        cache.invalidate("s1");
        assert!(cache.needs_full("s1", "tool_a", "h1"));
    }

    #[test]
    fn capacity_is_never_exceeded_and_evicts_lru() {
        let cache = SessionCache::new(2, Duration::from_secs(3600));

        cache.update("s1", HashMap::from([("t".to_string(), "h".to_string())]));
        cache.update("s2", HashMap::from([("t".to_string(), "h".to_string())]));
        assert_eq!(cache.len(), 2);

        cache.update("s3", HashMap::from([("t".to_string(), "h".to_string())]));
        assert_eq!(cache.len(), 2);
        // s1 was least-recently-used (s2 was touched after it), so it's gone.
        assert!(cache.needs_full("s1", "t", "h"));
    }

    #[test]
    fn ttl_expires_lazily() {
        let cache = SessionCache::new(16, Duration::from_millis(0));
        cache.update("s1", HashMap::from([("t".to_string(), "h".to_string())]));
        std::thread::sleep(Duration::from_millis(1));
        assert!(cache.needs_full("s1", "t", "h"));
    }

    #[test]
    fn update_on_unseen_tool_requires_full() {
        let cache = SessionCache::default();
        cache.update("s1", HashMap::from([("tool_a".to_string(), "h1".to_string())]));
        assert!(cache.needs_full("s1", "tool_b", "anything"));
    }
}
