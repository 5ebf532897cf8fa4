use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;
use ung_core::IdxType;

use crate::search_queue::SearchQueue;
use crate::visited::VisitedSet;

/// Per-query scratch state.
#[derive(Debug, Clone, Default)]
pub struct SearchCache {
    pub search_queue: SearchQueue,
    pub visited: VisitedSet,
    /// Seeds of the current traversal.
    pub entry_points: Vec<IdxType>,
    /// Top-K accumulated over several traversals.
    pub merged: SearchQueue,
}

impl SearchCache {
    pub fn new(num_points: usize, queue_capacity: usize) -> Self {
        Self {
            search_queue: SearchQueue::new(queue_capacity),
            visited: VisitedSet::new(num_points),
            entry_points: Vec::new(),
            merged: SearchQueue::default(),
        }
    }

    /// Empties every buffer, keeping allocations.
    pub fn reset(&mut self) {
        self.search_queue.clear();
        self.visited.clear();
        self.entry_points.clear();
        self.merged.clear();
    }
}

/// Pool of search caches shared by worker threads.
///
/// A cache is owned by one query at a time; [`CacheGuard`] hands it back on drop.
#[derive(Debug)]
pub struct SearchCachePool {
    free: Mutex<Vec<SearchCache>>,
    num_points: usize,
    queue_capacity: usize,
}

impl SearchCachePool {
    pub fn new(num_caches: usize, num_points: usize, queue_capacity: usize) -> Self {
        let free = (0..num_caches)
            .map(|_| SearchCache::new(num_points, queue_capacity))
            .collect();
        Self {
            free: Mutex::new(free),
            num_points,
            queue_capacity,
        }
    }

    /// Takes a free cache, allocating one if the pool is drained.
    pub fn acquire(&self) -> CacheGuard<'_> {
        let cache = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| SearchCache::new(self.num_points, self.queue_capacity));
        CacheGuard { pool: self, cache }
    }

    pub fn num_free(&self) -> usize {
        self.free.lock().len()
    }

    fn release(&self, mut cache: SearchCache) {
        cache.reset();
        self.free.lock().push(cache);
    }
}

pub struct CacheGuard<'a> {
    pool: &'a SearchCachePool,
    cache: SearchCache,
}

impl Deref for CacheGuard<'_> {
    type Target = SearchCache;

    fn deref(&self) -> &SearchCache {
        &self.cache
    }
}

impl DerefMut for CacheGuard<'_> {
    fn deref_mut(&mut self) -> &mut SearchCache {
        &mut self.cache
    }
}

impl Drop for CacheGuard<'_> {
    fn drop(&mut self) {
        let cache = std::mem::take(&mut self.cache);
        self.pool.release(cache);
    }
}
