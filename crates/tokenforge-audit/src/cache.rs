//! Idempotency cache for bulk exports.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tokenforge_core::audit::{ExportFormat, ExportResult};

#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub fingerprint: String,
    pub payload: String,
    pub format: ExportFormat,
    pub record_count: usize,
    pub created_at: Instant,
}

#[derive(Debug)]
pub(crate) enum CacheLookup {
    Miss,
    Hit(ExportResult),
    Conflict,
}

/// Entries keyed by idempotency key, bounded by age and count.
///
/// Lookups use `peek`, so recency order is insertion order and the LRU tail is
/// always the oldest entry.
#[derive(Debug)]
pub(crate) struct ExportCache {
    entries: LruCache<String, CacheEntry>,
    ttl: Duration,
}

impl ExportCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(cap),
            ttl,
        }
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.created_at) >= self.ttl
    }

    /// Look up `key`, dropping it first if it has expired.
    pub fn lookup(&mut self, key: &str, fingerprint: &str, now: Instant) -> CacheLookup {
        let expired = self
            .entries
            .peek(key)
            .is_some_and(|e| self.is_expired(e, now));
        if expired {
            self.entries.pop(key);
        }

        match self.entries.peek(key) {
            None => CacheLookup::Miss,
            Some(entry) if entry.fingerprint != fingerprint => CacheLookup::Conflict,
            Some(entry) => CacheLookup::Hit(ExportResult::cached(
                entry.format,
                entry.payload.clone(),
                entry.record_count,
            )),
        }
    }

    /// Store `entry`, evicting the oldest entry when full.
    pub fn insert(&mut self, key: String, entry: CacheEntry) {
        let now = entry.created_at;
        while self
            .entries
            .peek_lru()
            .is_some_and(|(_, oldest)| self.is_expired(oldest, now))
        {
            self.entries.pop_lru();
        }
        self.entries.put(key, entry);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
