//! N-way merge scan across cell stores (and, via [`ScanSource`], a frozen
//! cell cache), applying tombstone shadowing, version limits, time-range
//! filtering, and counter-column summation.
//!
//! The heap-merge skeleton is the teacher's `MergeIterator`/`HeapEntry`
//! generalized from two-way "highest seq wins" dedup to N-way ordered
//! iteration: because a serialized key already sorts newest-first within a
//! `(row, column_family, qualifier)` triple, the merge only has to walk the
//! stream once, grouping contiguous same-triple runs and deciding, per
//! group, which entries survive.

use keys::{Flag, Key, SerializedKey};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use crate::CellStoreError;

/// One input stream to a [`MergeScanner`]: cells in strictly ascending
/// [`SerializedKey`] order.
pub trait ScanSource {
    /// Returns the next `(key, value)` pair, or `None` when exhausted.
    fn next(&mut self) -> Result<Option<(SerializedKey, Vec<u8>)>, CellStoreError>;
}

/// A [`ScanSource`] backed by an already-sorted, in-memory vector.
pub struct VecSource {
    items: std::vec::IntoIter<(SerializedKey, Vec<u8>)>,
}

impl VecSource {
    /// Wraps `items`, which must already be in ascending key order.
    #[must_use]
    pub fn new(items: Vec<(SerializedKey, Vec<u8>)>) -> Self {
        VecSource {
            items: items.into_iter(),
        }
    }
}

impl ScanSource for VecSource {
    fn next(&mut self) -> Result<Option<(SerializedKey, Vec<u8>)>, CellStoreError> {
        Ok(self.items.next())
    }
}

struct HeapEntry {
    key: SerializedKey,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the smallest key surfaces first.
        other.key.cmp(&self.key).then_with(|| other.source.cmp(&self.source))
    }
}

/// Configuration governing which cells in a merged stream survive.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Keep at most this many versions per `(row, column_family, qualifier)`.
    /// `None` means unlimited.
    pub max_versions: Option<u32>,
    /// Inclusive timestamp range `[time_min, time_max]`. Cells outside it are dropped.
    pub time_min: i64,
    /// Inclusive timestamp range `[time_min, time_max]`. Cells outside it are dropped.
    pub time_max: i64,
    /// Column-family codes whose cells are summed (as big-endian i64) rather
    /// than kept as separate versions.
    pub counter_column_families: Vec<u8>,
    /// When `true`, tombstone markers (`DeleteRow`/`DeleteColumnFamily`/`DeleteCell`)
    /// are themselves emitted alongside whatever they shadow, rather than
    /// being consumed purely as shadowing state. A merge compaction that
    /// hasn't yet been authorized to forget a delete uses this; a major
    /// compaction or a client-facing scan does not.
    pub return_deletes: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            max_versions: None,
            time_min: i64::MIN,
            time_max: i64::MAX,
            counter_column_families: Vec::new(),
            return_deletes: false,
        }
    }
}

fn decode_counter(value: &[u8]) -> i64 {
    if value.len() != 8 {
        return 0;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(value);
    i64::from_be_bytes(buf)
}

fn encode_counter(v: i64) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

/// Merges N [`ScanSource`]s into one logically-correct stream of cells.
pub struct MergeScanner {
    sources: Vec<Box<dyn ScanSource>>,
    heap: BinaryHeap<HeapEntry>,
    buffered: Vec<Option<(SerializedKey, Vec<u8>)>>,
    config: MergeConfig,

    row_delete_ts: Option<i64>,
    cf_delete_ts: HashMap<u8, i64>,
    current_row: Option<Vec<u8>>,

    pending: VecDeque<(Key, Vec<u8>)>,
}

impl MergeScanner {
    /// Builds a scanner over `sources`, priming the heap with each source's
    /// first entry.
    pub fn new(mut sources: Vec<Box<dyn ScanSource>>, config: MergeConfig) -> Result<Self, CellStoreError> {
        let mut heap = BinaryHeap::new();
        let mut buffered = Vec::with_capacity(sources.len());
        for (i, source) in sources.iter_mut().enumerate() {
            let first = source.next()?;
            if let Some((ref key, _)) = first {
                heap.push(HeapEntry {
                    key: key.clone(),
                    source: i,
                });
            }
            buffered.push(first);
        }

        Ok(MergeScanner {
            sources,
            heap,
            buffered,
            config,
            row_delete_ts: None,
            cf_delete_ts: HashMap::new(),
            current_row: None,
            pending: VecDeque::new(),
        })
    }

    fn pop_heap_entry(&mut self) -> Result<Option<(SerializedKey, Vec<u8>)>, CellStoreError> {
        let top = match self.heap.pop() {
            Some(e) => e,
            None => return Ok(None),
        };
        let (key, value) = self.buffered[top.source].take().expect("heap entry implies a buffered value");

        if let Some(next) = self.sources[top.source].next()? {
            self.heap.push(HeapEntry {
                key: next.0.clone(),
                source: top.source,
            });
            self.buffered[top.source] = Some(next);
        }

        Ok(Some((key, value)))
    }

    /// Collects the next contiguous `(row, column_family, qualifier)` group
    /// and decides which entries survive, pushing results to `pending`.
    fn pump_group(&mut self) -> Result<(), CellStoreError> {
        let first = match self.pop_heap_entry()? {
            Some(e) => e,
            None => return Ok(()),
        };

        let mut group: Vec<(Key, SerializedKey, Vec<u8>)> = Vec::new();
        let decoded = Key::decode(&first.0)?;
        let (row, cfid, cq) = (decoded.row.clone(), decoded.column_family_code, decoded.column_qualifier.clone());
        group.push((decoded, first.0, first.1));

        loop {
            let Some(top) = self.heap.peek() else { break };
            let peek_key = Key::decode(&top.key)?;
            if peek_key.row != row || peek_key.column_family_code != cfid || peek_key.column_qualifier != cq {
                break;
            }
            let (sk, v) = self.pop_heap_entry()?.expect("heap.peek() just confirmed an entry");
            group.push((peek_key, sk, v));
        }

        if self.current_row.as_deref() != Some(row.as_slice()) {
            self.current_row = Some(row.clone());
            self.row_delete_ts = None;
            self.cf_delete_ts.clear();
        }

        self.process_group(group, cfid);
        Ok(())
    }

    fn process_group(&mut self, group: Vec<(Key, SerializedKey, Vec<u8>)>, cfid: u8) {
        let is_counter = self.config.counter_column_families.contains(&cfid);
        let mut version_count = 0u32;
        let mut cell_delete_ts: Option<i64> = None;
        let mut counter_sum: i64 = 0;
        let mut counter_key: Option<Key> = None;

        for (key, _sk, value) in group {
            if key.flag == Flag::DeleteRow {
                self.row_delete_ts = Some(self.row_delete_ts.map_or(key.timestamp, |t| t.max(key.timestamp)));
                if self.config.return_deletes {
                    self.pending.push_back((key, value));
                }
                continue;
            }
            if key.flag == Flag::DeleteColumnFamily {
                let entry = self.cf_delete_ts.entry(cfid).or_insert(i64::MIN);
                *entry = (*entry).max(key.timestamp);
                if self.config.return_deletes {
                    self.pending.push_back((key, value));
                }
                continue;
            }

            if let Some(row_ts) = self.row_delete_ts {
                if key.timestamp <= row_ts {
                    continue;
                }
            }
            if let Some(&cf_ts) = self.cf_delete_ts.get(&cfid) {
                if key.timestamp <= cf_ts {
                    continue;
                }
            }

            if key.flag == Flag::DeleteCell {
                cell_delete_ts = Some(cell_delete_ts.map_or(key.timestamp, |t| t.max(key.timestamp)));
                if self.config.return_deletes {
                    self.pending.push_back((key, value));
                }
                continue;
            }

            debug_assert_eq!(key.flag, Flag::Insert);

            if let Some(ts) = cell_delete_ts {
                if key.timestamp <= ts {
                    continue;
                }
            }
            if key.timestamp < self.config.time_min || key.timestamp > self.config.time_max {
                continue;
            }
            if let Some(max_versions) = self.config.max_versions {
                if version_count >= max_versions {
                    continue;
                }
            }
            version_count += 1;

            if is_counter {
                counter_sum += decode_counter(&value);
                if counter_key.is_none() {
                    counter_key = Some(key);
                }
            } else {
                self.pending.push_back((key, value));
            }
        }

        if is_counter {
            if let Some(key) = counter_key {
                self.pending.push_back((key, encode_counter(counter_sum)));
            }
        }
    }

    /// Returns the next surviving `(key, value)` pair in ascending order, or
    /// `None` once every source is exhausted and fully processed.
    pub fn next_cell(&mut self) -> Result<Option<(Key, Vec<u8>)>, CellStoreError> {
        while self.pending.is_empty() {
            if self.heap.is_empty() {
                return Ok(None);
            }
            self.pump_group()?;
        }
        Ok(self.pending.pop_front())
    }

    /// Collects every surviving cell into a `Vec`, in ascending order.
    pub fn collect_all(&mut self) -> Result<Vec<(Key, Vec<u8>)>, CellStoreError> {
        let mut out = Vec::new();
        while let Some(cell) = self.next_cell()? {
            out.push(cell);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keys::{Flag, Key};

    fn k(row: &str, cfid: u8, cq: &str, flag: Flag, ts: i64, rev: i64) -> Key {
        Key::new(row.as_bytes(), cfid, cq.as_bytes(), flag, ts, rev)
    }

    fn source(items: Vec<(Key, &[u8])>) -> Box<dyn ScanSource> {
        Box::new(VecSource::new(
            items.into_iter().map(|(key, v)| (key.serialize(), v.to_vec())).collect(),
        ))
    }

    #[test]
    fn merges_two_sources_in_key_order() {
        let a = source(vec![(k("a", 1, "q", Flag::Insert, 100, 1), b"va")]);
        let b = source(vec![(k("b", 1, "q", Flag::Insert, 100, 2), b"vb")]);

        let mut scanner = MergeScanner::new(vec![a, b], MergeConfig::default()).unwrap();
        let all = scanner.collect_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0.row, b"a");
        assert_eq!(all[1].0.row, b"b");
    }

    #[test]
    fn delete_cell_shadows_older_versions_in_same_group() {
        let a = source(vec![
            (k("row", 1, "q", Flag::DeleteCell, 200, 3), b""),
            (k("row", 1, "q", Flag::Insert, 150, 2), b"old"),
            (k("row", 1, "q", Flag::Insert, 100, 1), b"older"),
        ]);

        let mut scanner = MergeScanner::new(vec![a], MergeConfig::default()).unwrap();
        let all = scanner.collect_all().unwrap();
        assert!(all.is_empty());
    }

    #[test]
    fn delete_cell_does_not_shadow_newer_versions() {
        let a = source(vec![
            (k("row", 1, "q", Flag::Insert, 300, 4), b"newest"),
            (k("row", 1, "q", Flag::DeleteCell, 200, 3), b""),
            (k("row", 1, "q", Flag::Insert, 100, 1), b"older"),
        ]);

        let mut scanner = MergeScanner::new(vec![a], MergeConfig::default()).unwrap();
        let all = scanner.collect_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1, b"newest");
    }

    #[test]
    fn delete_row_shadows_every_column_family() {
        let a = source(vec![
            (k("row", 0, "", Flag::DeleteRow, 500, 10), b""),
            (k("row", 1, "a", Flag::Insert, 400, 9), b"v1"),
            (k("row", 2, "b", Flag::Insert, 400, 8), b"v2"),
        ]);

        let mut scanner = MergeScanner::new(vec![a], MergeConfig::default()).unwrap();
        let all = scanner.collect_all().unwrap();
        assert!(all.is_empty());
    }

    #[test]
    fn delete_column_family_shadows_only_that_family() {
        let a = source(vec![
            (k("row", 1, "", Flag::DeleteColumnFamily, 500, 10), b""),
            (k("row", 1, "a", Flag::Insert, 400, 9), b"shadowed"),
            (k("row", 2, "b", Flag::Insert, 400, 8), b"kept"),
        ]);

        let mut scanner = MergeScanner::new(vec![a], MergeConfig::default()).unwrap();
        let all = scanner.collect_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1, b"kept");
    }

    #[test]
    fn max_versions_limits_per_group() {
        let a = source(vec![
            (k("row", 1, "q", Flag::Insert, 300, 3), b"v3"),
            (k("row", 1, "q", Flag::Insert, 200, 2), b"v2"),
            (k("row", 1, "q", Flag::Insert, 100, 1), b"v1"),
        ]);

        let config = MergeConfig {
            max_versions: Some(2),
            ..MergeConfig::default()
        };
        let mut scanner = MergeScanner::new(vec![a], config).unwrap();
        let all = scanner.collect_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].1, b"v3");
        assert_eq!(all[1].1, b"v2");
    }

    #[test]
    fn time_range_filters_out_of_window_cells() {
        let a = source(vec![
            (k("row", 1, "q", Flag::Insert, 300, 3), b"in"),
            (k("row", 1, "q", Flag::Insert, 50, 2), b"too old"),
        ]);

        let config = MergeConfig {
            time_min: 100,
            time_max: 400,
            ..MergeConfig::default()
        };
        let mut scanner = MergeScanner::new(vec![a], config).unwrap();
        let all = scanner.collect_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1, b"in");
    }

    #[test]
    fn counter_column_sums_all_surviving_versions() {
        let a = source(vec![
            (k("row", 5, "hits", Flag::Insert, 300, 3), &10i64.to_be_bytes()),
            (k("row", 5, "hits", Flag::Insert, 200, 2), &5i64.to_be_bytes()),
            (k("row", 5, "hits", Flag::Insert, 100, 1), &1i64.to_be_bytes()),
        ]);

        let config = MergeConfig {
            counter_column_families: vec![5],
            ..MergeConfig::default()
        };
        let mut scanner = MergeScanner::new(vec![a], config).unwrap();
        let all = scanner.collect_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(decode_counter(&all[0].1), 16);
    }

    #[test]
    fn return_deletes_keeps_tombstones_in_output() {
        let a = source(vec![
            (k("row", 1, "q", Flag::DeleteCell, 200, 3), b""),
            (k("row", 1, "q", Flag::Insert, 100, 1), b"older"),
        ]);

        let config = MergeConfig {
            return_deletes: true,
            ..MergeConfig::default()
        };
        let mut scanner = MergeScanner::new(vec![a], config).unwrap();
        let all = scanner.collect_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0.flag, Flag::DeleteCell);
    }

    #[test]
    fn empty_sources_yield_nothing() {
        let mut scanner = MergeScanner::new(Vec::new(), MergeConfig::default()).unwrap();
        assert_eq!(scanner.collect_all().unwrap(), Vec::new());
    }
}
