//! Q-matrix column cache
//!
//! The SMO solver repeatedly reads whole columns of the signed kernel matrix
//! `Q[i][j] = y_i y_j K[i][j]`. Columns are computed on demand and kept in an
//! LRU cache whose capacity is derived from a memory budget.

use crate::utils::memory::columns_for_budget;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// LRU cache of Q-matrix columns, keyed by column index
pub struct QCache {
    cache: LruCache<usize, Arc<[f64]>>,
    hits: u64,
    misses: u64,
}

impl QCache {
    /// Create a cache holding at most `capacity` columns
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Create a cache for columns of length `n` within `memory_bytes`
    pub fn with_memory_limit(memory_bytes: usize, n: usize) -> Self {
        Self::new(columns_for_budget(memory_bytes, n))
    }

    /// Column `i`, computing it with `compute` on a miss
    pub fn column(&mut self, i: usize, compute: impl FnOnce() -> Vec<f64>) -> Arc<[f64]> {
        if let Some(column) = self.cache.get(&i) {
            self.hits += 1;
            return Arc::clone(column);
        }
        self.misses += 1;
        let column: Arc<[f64]> = compute().into();
        self.cache.put(i, Arc::clone(&column));
        column
    }

    /// Whether column `i` is currently cached
    pub fn contains(&self, i: usize) -> bool {
        self.cache.contains(&i)
    }

    /// Get cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            capacity: self.cache.cap().get(),
            size: self.cache.len(),
        }
    }

    /// Clear the cache
    pub fn clear(&mut self) {
        self.cache.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub capacity: usize,
    pub size: usize,
}
