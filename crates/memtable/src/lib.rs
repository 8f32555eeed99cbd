//! # Memtable — cell cache
//!
//! An in-memory, sorted, per-access-group write buffer for the storage
//! engine. Where the teacher's `Memtable` keyed a flat `BTreeMap<Vec<u8>,
//! ValueEntry>` by an opaque byte key gated on a bolted-on sequence number,
//! [`CellCache`] is keyed by [`SerializedKey`] directly — timestamp and
//! revision ordering is therefore part of the key, not a side channel — and
//! adds the semantics an access group's write path and compaction staging
//! need: counter-column merging, freeze/unfreeze, split-row candidates, and
//! tombstone bookkeeping for the garbage tracker.
//!
//! ## Example
//! ```rust
//! use keys::{Flag, Key};
//! use memtable::CellCache;
//!
//! let mut cache = CellCache::new();
//! let k = Key::new(b"row1".to_vec(), 1, b"q".to_vec(), Flag::Insert, 100, 1);
//! cache.put(&k, b"hello", false);
//! assert_eq!(cache.get(&k.serialize()), Some(b"hello".as_slice()));
//! ```

use keys::{Key, SerializedKey};
use std::collections::BTreeMap;

/// An in-memory ordered map from serialized key to value bytes, with the
/// bookkeeping an access group's write path and compaction staging need.
///
/// Mirrors the teacher's `Memtable`: a `BTreeMap` for sorted iteration plus
/// an approximate byte-size counter for flush-threshold decisions. Unlike the
/// teacher, there is no sequence-number gate on a raw byte key — the
/// serialized key already encodes `(timestamp, revision)`, so two writes are
/// either distinct keys (both kept) or the exact same key (replaced, or
/// summed when the column family is a counter).
#[derive(Debug, Default)]
pub struct CellCache {
    map: BTreeMap<SerializedKey, Vec<u8>>,
    approx_size: usize,
    delete_count: usize,
    frozen: bool,
}

impl CellCache {
    /// Creates a new, empty, writable cell cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `(key, value)`.
    ///
    /// If `is_counter` is true and an entry already exists at the exact same
    /// serialized key (same row/column family/qualifier/timestamp/revision —
    /// e.g. a batched increment recorded at one timestamp), the two payloads
    /// are summed as big-endian `i64` counters rather than the new value
    /// replacing the old one. Otherwise this is a plain replace-or-insert.
    ///
    /// # Panics
    ///
    /// Panics if the cache is frozen; callers must check [`is_frozen`](Self::is_frozen)
    /// before writing.
    pub fn put(&mut self, key: &Key, value: &[u8], is_counter: bool) {
        assert!(!self.frozen, "cannot write to a frozen cell cache");

        let sk = key.serialize();
        if key.flag.is_delete() {
            self.delete_count += 1;
        }

        if is_counter {
            if let Some(existing) = self.map.get(&sk) {
                let merged = sum_counters(existing, value);
                self.approx_size = self
                    .approx_size
                    .saturating_sub(existing.len())
                    .saturating_add(merged.len());
                self.map.insert(sk, merged);
                return;
            }
        }

        let key_bytes = sk.as_bytes().len();
        match self.map.insert(sk, value.to_vec()) {
            Some(old) => {
                self.approx_size = self
                    .approx_size
                    .saturating_sub(old.len())
                    .saturating_add(value.len());
            }
            None => {
                self.approx_size = self
                    .approx_size
                    .saturating_add(key_bytes)
                    .saturating_add(value.len());
            }
        }
    }

    /// Returns the raw value bytes stored at `key`, if present.
    pub fn get(&self, key: &SerializedKey) -> Option<&[u8]> {
        self.map.get(key).map(|v| v.as_slice())
    }

    /// Returns an iterator over all entries in ascending serialized-key order.
    ///
    /// This includes tombstones; a merge scanner is responsible for shadowing
    /// them against the keys they cover.
    pub fn iter(&self) -> impl Iterator<Item = (&SerializedKey, &[u8])> {
        self.map.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Returns the number of entries, including tombstones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the approximate byte size of all keys and values stored.
    ///
    /// Used to decide when an access group should stage a minor compaction.
    #[must_use]
    pub fn approx_size(&self) -> usize {
        self.approx_size
    }

    /// Returns the number of tombstone entries inserted since construction
    /// (or since the last [`clear`](Self::clear)). Consulted by the garbage tracker.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.delete_count
    }

    /// Returns `true` if this cache has been [`freeze`](Self::freeze)d.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Seals the cache: subsequent writes panic, but it may be read from by
    /// many concurrent scanners. Used when staging a compaction — the cache
    /// becomes the access group's immutable cache while a new, writable one
    /// takes over new writes.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Reverses [`freeze`](Self::freeze), making the cache writable again.
    ///
    /// Only valid when a staged compaction is aborted before any scan has
    /// made forward progress using the frozen cache. The caller (the access
    /// group) is responsible for that invariant; this call only flips the flag.
    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    /// Removes all entries and resets counters to zero. Equivalent to
    /// replacing the cache with [`CellCache::new`] but reuses the allocation.
    pub fn clear(&mut self) {
        self.map.clear();
        self.approx_size = 0;
        self.delete_count = 0;
    }

    /// Returns heuristic candidate split rows: distinct rows present in the
    /// cache, sampled near the median so a range split lands close to the
    /// middle of what is currently cached.
    ///
    /// Returns an empty vector if the cache holds fewer than two distinct rows.
    pub fn split_rows(&self) -> Vec<Vec<u8>> {
        let mut rows: Vec<Vec<u8>> = Vec::new();
        for sk in self.map.keys() {
            if let Ok(row) = sk.row() {
                if rows.last().map(|r| r.as_slice()) != Some(row) {
                    rows.push(row.to_vec());
                }
            }
        }
        if rows.len() < 2 {
            return Vec::new();
        }
        let mid = rows.len() / 2;
        vec![rows[mid].clone()]
    }
}

/// Sums two big-endian `i64` counter payloads. A payload that is not exactly
/// 8 bytes is treated as zero: a counter family should never produce one,
/// but a malformed write must not panic the write path.
fn sum_counters(a: &[u8], b: &[u8]) -> Vec<u8> {
    let av = decode_counter(a);
    let bv = decode_counter(b);
    av.wrapping_add(bv).to_be_bytes().to_vec()
}

fn decode_counter(bytes: &[u8]) -> i64 {
    if bytes.len() != 8 {
        return 0;
    }
    let mut arr = [0u8; 8];
    arr.copy_from_slice(bytes);
    i64::from_be_bytes(arr)
}

#[cfg(test)]
mod tests;
