//! Size-weighted LRU cache for decoded images.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;

use crate::cache::CacheKey;
use crate::error::{CacheError, Result};
use crate::models::Bitmap;

type Sizer<V> = Arc<dyn Fn(&V) -> usize + Send + Sync>;

/// Usage counters for a [`MemoryCache`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Successful inserts
    pub puts: u64,
    /// Entries dropped to stay under budget
    pub evictions: u64,
    /// Current resident size
    pub size: usize,
    /// Budget
    pub max_size: usize,
    /// Number of entries
    pub entries: usize,
}

impl CacheStats {
    /// Hit rate as a percentage (0.0 - 100.0)
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct Inner<V> {
    map: LruCache<CacheKey, V>,
    size: usize,
    max_size: usize,
    hits: u64,
    misses: u64,
    puts: u64,
    evictions: u64,
}

/// Thread-safe LRU cache bounded by the total size of its values.
///
/// Each operation runs in one critical section, so concurrent callers always
/// observe a consistent total. Inserting a value larger than the whole budget
/// is allowed; it is evicted again before `put` returns.
pub struct MemoryCache<V = Bitmap> {
    inner: Arc<Mutex<Inner<V>>>,
    sizer: Sizer<V>,
}

impl<V> Clone for MemoryCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            sizer: Arc::clone(&self.sizer),
        }
    }
}

impl MemoryCache<Bitmap> {
    /// Create a bitmap cache with a budget in decoded bytes.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self::with_sizer(max_bytes, Bitmap::byte_size)
    }
}

impl<V: Clone> MemoryCache<V> {
    /// Create a cache that weighs values with `sizer`.
    pub fn with_sizer(max_size: usize, sizer: impl Fn(&V) -> usize + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                map: LruCache::unbounded(),
                size: 0,
                max_size,
                hits: 0,
                misses: 0,
                puts: 0,
                evictions: 0,
            })),
            sizer: Arc::new(sizer),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a value and mark it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut inner = self.lock();
        let found = inner.map.get(key).cloned();
        if found.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        found
    }

    /// Check for a key without touching recency or statistics.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().map.contains(key)
    }

    /// Insert a value, returning the one it replaced.
    ///
    /// Least recently used entries are evicted until the total fits the
    /// budget, which may include the value just inserted.
    pub fn put(&self, key: CacheKey, value: V) -> Result<Option<V>> {
        let size = (self.sizer)(&value);
        if size == 0 {
            return Err(CacheError::InvalidEntrySize {
                key: key.to_string(),
                size,
            });
        }

        let mut inner = self.lock();
        inner.puts += 1;
        inner.size += size;
        let previous = inner.map.put(key, value);
        if let Some(old) = &previous {
            inner.size -= (self.sizer)(old);
        }
        let max = inner.max_size;
        self.trim_locked(&mut inner, max);
        Ok(previous)
    }

    /// Remove a value.
    pub fn remove(&self, key: &CacheKey) -> Option<V> {
        let mut inner = self.lock();
        let removed = inner.map.pop(key);
        if let Some(value) = &removed {
            inner.size -= (self.sizer)(value);
        }
        removed
    }

    /// Evict least recently used entries until the total is at most `budget`.
    pub fn trim_to(&self, budget: usize) {
        let mut inner = self.lock();
        self.trim_locked(&mut inner, budget);
    }

    /// Drop every entry.
    pub fn evict_all(&self) {
        let mut inner = self.lock();
        self.trim_locked(&mut inner, 0);
    }

    /// Change the budget, evicting as needed.
    pub fn resize(&self, max_size: usize) {
        let mut inner = self.lock();
        inner.max_size = max_size;
        self.trim_locked(&mut inner, max_size);
    }

    fn trim_locked(&self, inner: &mut Inner<V>, budget: usize) {
        while inner.size > budget {
            let Some((key, value)) = inner.map.pop_lru() else {
                break;
            };
            inner.size -= (self.sizer)(&value);
            inner.evictions += 1;
            tracing::trace!("Evicted {key} from memory cache");
        }
    }

    /// Total size of resident values
    pub fn current_size(&self) -> usize {
        self.lock().size
    }

    /// Configured budget
    pub fn max_size(&self) -> usize {
        self.lock().max_size
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    /// Whether the cache holds nothing
    pub fn is_empty(&self) -> bool {
        self.lock().map.is_empty()
    }

    /// Snapshot of the usage counters
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            puts: inner.puts,
            evictions: inner.evictions,
            size: inner.size,
            max_size: inner.max_size,
            entries: inner.map.len(),
        }
    }
}

impl<V> fmt::Debug for MemoryCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("MemoryCache")
            .field("entries", &inner.map.len())
            .field("size", &inner.size)
            .field("max_size", &inner.max_size)
            .finish()
    }
}
