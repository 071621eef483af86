//! Match result caching.
//!
//! [`MatchCache`] is an LRU cache in front of the matcher service: repeated
//! lookups of the same URL (re-renders, popstate round-trips) skip the tree
//! walk entirely. Gated behind the `cache` feature flag and backed by the
//! [`lru`] crate.
//!
//! The cache stores the full outcome per path, including "no match", so
//! repeated misses on an unknown URL are also served from cache.
//!
//! [`CacheStats`] tracks hits, misses, and invalidations so cache
//! effectiveness can be monitored at runtime. The cache must be cleared
//! whenever the route tree is replaced; the router does this on every
//! `add_route` / `update_route` / `remove_route`.
//!
//! # Examples
//!
//! ```
//! use wayfarer::cache::MatchCache;
//! use wayfarer::params::Params;
//!
//! let mut cache = MatchCache::new();
//! cache.store("/users/view/42".to_string(), Some(("users.view".to_string(), Params::new())));
//!
//! assert!(cache.lookup("/users/view/42").is_some());
//! assert_eq!(cache.stats().hits, 1);
//! ```

use crate::params::Params;
use crate::{debug_log, trace_log};
use lru::LruCache;
use std::num::NonZeroUsize;

/// A cached match outcome: the matched route's full name and its params,
/// or `None` for a path that matched nothing.
pub type CachedMatch = Option<(String, Params)>;

/// Counters tracking cache hit/miss rates and invalidations.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: usize,
    /// Number of cache misses.
    pub misses: usize,
    /// Number of full invalidations (via [`MatchCache::clear`]).
    pub invalidations: usize,
}

impl CacheStats {
    /// Return the hit rate as a value in `0.0..=1.0`.
    ///
    /// Returns `0.0` if no lookups have been performed.
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU cache of path→match outcomes.
///
/// Default capacity is 1000 entries.
#[derive(Debug)]
pub struct MatchCache {
    entries: LruCache<String, CachedMatch>,
    stats: CacheStats,
}

impl MatchCache {
    const DEFAULT_CAPACITY: usize = 1000;

    /// Create a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Create a cache with a custom capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).expect("cache capacity must be non-zero");
        Self {
            entries: LruCache::new(cap),
            stats: CacheStats::default(),
        }
    }

    /// Look up the cached outcome for a path. Updates hit/miss stats.
    pub fn lookup(&mut self, path: &str) -> Option<CachedMatch> {
        if let Some(cached) = self.entries.get(path) {
            self.stats.hits += 1;
            trace_log!("match cache hit for '{}'", path);
            Some(cached.clone())
        } else {
            self.stats.misses += 1;
            trace_log!("match cache miss for '{}'", path);
            None
        }
    }

    /// Insert an outcome for a path.
    pub fn store(&mut self, path: String, outcome: CachedMatch) {
        self.entries.push(path, outcome);
    }

    /// Drop every entry and bump the invalidation counter.
    pub fn clear(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        self.stats.invalidations += 1;
        debug_log!(
            "match cache cleared: {} entries removed ({} invalidations, hit rate {:.1}%)",
            dropped,
            self.stats.invalidations,
            self.stats.hit_rate() * 100.0
        );
    }

    /// Current cache statistics.
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Reset the statistics counters to zero.
    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    /// Number of cached paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MatchCache {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_creation() {
        let cache = MatchCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_cache_miss_then_hit() {
        let mut cache = MatchCache::new();
        assert!(cache.lookup("/users").is_none());
        assert_eq!(cache.stats().misses, 1);

        cache.store("/users".to_string(), Some(("users".to_string(), Params::new())));
        let cached = cache.lookup("/users").unwrap();
        assert_eq!(cached.unwrap().0, "users");
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_cache_stores_negative_outcomes() {
        let mut cache = MatchCache::new();
        cache.store("/missing".to_string(), None);

        let cached = cache.lookup("/missing");
        assert!(cached.is_some());
        assert!(cached.unwrap().is_none());
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_cache_clear() {
        let mut cache = MatchCache::new();
        cache.store("/users".to_string(), None);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = MatchCache::with_capacity(2);
        cache.store("/a".to_string(), None);
        cache.store("/b".to_string(), None);
        cache.store("/c".to_string(), None);

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup("/a").is_none());
        assert!(cache.lookup("/c").is_some());
    }

    #[test]
    fn test_hit_rate() {
        let mut cache = MatchCache::new();
        cache.lookup("/a");
        cache.lookup("/b");
        cache.store("/a".to_string(), None);
        cache.lookup("/a");

        assert!((cache.stats().hit_rate() - (1.0 / 3.0)).abs() < 0.001);
    }
}
