//! Process-wide cache of decompressed data blocks.
//!
//! No counterpart exists in the teacher, which keeps its whole index (and
//! thus effectively its whole data set) resident per `SSTableReader`. A cell
//! store's data blocks are decompressed on demand instead, so repeated scans
//! over the same block benefit from caching the decompressed payload keyed
//! by `(file_id, file_offset)`. Sized by block count rather than bytes,
//! matching the pack's `lru`-crate idiom of a fixed-capacity recency cache.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default number of decompressed blocks kept resident.
pub const DEFAULT_CAPACITY: usize = 256;

type Key = (u64, u64);

struct Entry {
    data: Arc<Vec<u8>>,
    pinned: usize,
}

/// A shared, thread-safe LRU cache of decompressed blocks.
///
/// `checkout` returns a handle (an `Arc` clone) and marks the entry pinned;
/// `checkin` unpins it. Pinning is informational only — the returned `Arc`
/// keeps the bytes alive regardless — but it lets a caller assert that a
/// block in active use isn't silently evicted out from under a long scan.
pub struct BlockCache {
    inner: Mutex<LruCache<Key, Entry>>,
}

impl BlockCache {
    /// Creates a cache holding at most `capacity` decompressed blocks.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity.max(1) is never zero");
        BlockCache {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Looks up `(file_id, file_offset)`, bumping its recency and pin count
    /// if present.
    #[must_use]
    pub fn checkout(&self, file_id: u64, file_offset: u64) -> Option<Arc<Vec<u8>>> {
        let mut cache = self.inner.lock();
        let entry = cache.get_mut(&(file_id, file_offset))?;
        entry.pinned += 1;
        Some(Arc::clone(&entry.data))
    }

    /// Unpins a previously checked-out block. A no-op if it has since been evicted.
    pub fn checkin(&self, file_id: u64, file_offset: u64) {
        let mut cache = self.inner.lock();
        if let Some(entry) = cache.peek_mut(&(file_id, file_offset)) {
            entry.pinned = entry.pinned.saturating_sub(1);
        }
    }

    /// Inserts a freshly-loaded block, pinned once on the caller's behalf.
    pub fn insert(&self, file_id: u64, file_offset: u64, data: Vec<u8>) -> Arc<Vec<u8>> {
        let data = Arc::new(data);
        let mut cache = self.inner.lock();
        cache.put(
            (file_id, file_offset),
            Entry {
                data: Arc::clone(&data),
                pinned: 1,
            },
        );
        data
    }

    /// Number of blocks currently resident.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// `true` if no blocks are resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached block regardless of pin state.
    pub fn purge(&self) {
        self.inner.lock().clear();
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        BlockCache::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_checkout_returns_same_bytes() {
        let cache = BlockCache::new(4);
        cache.insert(1, 0, vec![1, 2, 3]);
        let got = cache.checkout(1, 0).unwrap();
        assert_eq!(*got, vec![1, 2, 3]);
    }

    #[test]
    fn checkout_of_absent_key_returns_none() {
        let cache = BlockCache::new(4);
        assert!(cache.checkout(1, 0).is_none());
    }

    #[test]
    fn eviction_drops_oldest_entry_past_capacity() {
        let cache = BlockCache::new(2);
        cache.insert(1, 0, vec![0]);
        cache.checkin(1, 0);
        cache.insert(1, 1, vec![1]);
        cache.checkin(1, 1);
        cache.insert(1, 2, vec![2]);
        cache.checkin(1, 2);

        assert_eq!(cache.len(), 2);
        assert!(cache.checkout(1, 0).is_none());
        assert!(cache.checkout(1, 2).is_some());
    }

    #[test]
    fn checkin_on_missing_key_does_not_panic() {
        let cache = BlockCache::new(4);
        cache.checkin(9, 9);
    }

    #[test]
    fn purge_clears_all_entries() {
        let cache = BlockCache::new(4);
        cache.insert(1, 0, vec![1]);
        cache.insert(1, 1, vec![2]);
        cache.purge();
        assert!(cache.is_empty());
    }

    #[test]
    fn distinct_file_ids_do_not_collide_on_same_offset() {
        let cache = BlockCache::new(4);
        cache.insert(1, 0, vec![1]);
        cache.insert(2, 0, vec![2]);
        assert_eq!(*cache.checkout(1, 0).unwrap(), vec![1]);
        assert_eq!(*cache.checkout(2, 0).unwrap(), vec![2]);
    }
}
