use super::*;
use keys::{Flag, Key};

fn key(row: &str, cfid: u8, cq: &str, ts: i64, rev: i64) -> Key {
    Key::new(row.as_bytes(), cfid, cq.as_bytes(), Flag::Insert, ts, rev)
}

fn delete_key(row: &str, cfid: u8, cq: &str, flag: Flag, ts: i64, rev: i64) -> Key {
    Key::new(row.as_bytes(), cfid, cq.as_bytes(), flag, ts, rev)
}

// -------------------- Basic CRUD --------------------

#[test]
fn put_and_get_single_key() {
    let mut c = CellCache::new();
    let k = key("row1", 1, "q", 100, 1);
    c.put(&k, b"v1", false);
    assert_eq!(c.len(), 1);
    assert_eq!(c.get(&k.serialize()), Some(b"v1".as_slice()));
}

#[test]
fn distinct_timestamps_are_both_kept() {
    let mut c = CellCache::new();
    let older = key("row1", 1, "q", 100, 1);
    let newer = key("row1", 1, "q", 200, 2);
    c.put(&older, b"old", false);
    c.put(&newer, b"new", false);
    assert_eq!(c.len(), 2);
    assert_eq!(c.get(&older.serialize()), Some(b"old".as_slice()));
    assert_eq!(c.get(&newer.serialize()), Some(b"new".as_slice()));
}

#[test]
fn same_serialized_key_replaces_value() {
    let mut c = CellCache::new();
    let k = key("row1", 1, "q", 100, 1);
    c.put(&k, b"v1", false);
    c.put(&k, b"v2", false);
    assert_eq!(c.len(), 1);
    assert_eq!(c.get(&k.serialize()), Some(b"v2".as_slice()));
}

#[test]
fn get_missing_key_returns_none() {
    let c = CellCache::new();
    let k = key("nope", 0, "", 0, 0);
    assert!(c.get(&k.serialize()).is_none());
}

#[test]
fn delete_marker_is_stored_and_counted() {
    let mut c = CellCache::new();
    let d = delete_key("row1", 1, "q", Flag::DeleteCell, 100, 1);
    c.put(&d, b"", false);
    assert_eq!(c.len(), 1);
    assert_eq!(c.delete_count(), 1);
}

// -------------------- Counter merging --------------------

#[test]
fn counter_insert_sums_same_key() {
    let mut c = CellCache::new();
    let k = key("row1", 2, "hits", 100, 1);
    c.put(&k, &5i64.to_be_bytes(), true);
    c.put(&k, &3i64.to_be_bytes(), true);
    let stored = c.get(&k.serialize()).unwrap();
    assert_eq!(i64::from_be_bytes(stored.try_into().unwrap()), 8);
    assert_eq!(c.len(), 1);
}

#[test]
fn non_counter_insert_replaces_even_with_same_flag_true() {
    let mut c = CellCache::new();
    let k = key("row1", 2, "hits", 100, 1);
    c.put(&k, &5i64.to_be_bytes(), false);
    c.put(&k, &3i64.to_be_bytes(), false);
    let stored = c.get(&k.serialize()).unwrap();
    assert_eq!(i64::from_be_bytes(stored.try_into().unwrap()), 3);
}

#[test]
fn counter_insert_first_write_is_stored_verbatim() {
    let mut c = CellCache::new();
    let k = key("row1", 2, "hits", 100, 1);
    c.put(&k, &42i64.to_be_bytes(), true);
    let stored = c.get(&k.serialize()).unwrap();
    assert_eq!(i64::from_be_bytes(stored.try_into().unwrap()), 42);
}

// -------------------- Iterator ordering --------------------

#[test]
fn iter_yields_ascending_serialized_key_order() {
    let mut c = CellCache::new();
    c.put(&key("c", 0, "", 1, 1), b"3", false);
    c.put(&key("a", 0, "", 1, 1), b"1", false);
    c.put(&key("b", 0, "", 1, 1), b"2", false);

    let rows: Vec<Vec<u8>> = c.iter().map(|(k, _)| k.row().unwrap().to_vec()).collect();
    assert_eq!(rows, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn iter_includes_tombstones() {
    let mut c = CellCache::new();
    c.put(&key("a", 1, "q", 1, 1), b"1", false);
    c.put(&delete_key("b", 1, "q", Flag::DeleteCell, 2, 2), b"", false);
    assert_eq!(c.iter().count(), 2);
}

#[test]
fn iter_empty_cache() {
    let c = CellCache::new();
    assert_eq!(c.iter().count(), 0);
}

// -------------------- approx_size tracking --------------------

#[test]
fn approx_size_includes_key_and_value() {
    let mut c = CellCache::new();
    assert_eq!(c.approx_size(), 0);
    let k = key("ab", 1, "q", 1, 1);
    c.put(&k, b"ccc", false);
    assert_eq!(c.approx_size(), k.serialize().as_bytes().len() + 3);
}

#[test]
fn approx_size_adjusts_on_replace() {
    let mut c = CellCache::new();
    let k = key("a", 1, "q", 1, 1);
    c.put(&k, b"aaa", false);
    let after_first = c.approx_size();
    c.put(&k, b"b", false);
    assert_eq!(c.approx_size(), after_first - 2);
}

// -------------------- Freeze / unfreeze --------------------

#[test]
fn frozen_cache_reports_is_frozen() {
    let mut c = CellCache::new();
    assert!(!c.is_frozen());
    c.freeze();
    assert!(c.is_frozen());
}

#[test]
#[should_panic(expected = "frozen")]
fn writing_to_frozen_cache_panics() {
    let mut c = CellCache::new();
    c.freeze();
    c.put(&key("a", 1, "q", 1, 1), b"v", false);
}

#[test]
fn unfreeze_allows_writes_again() {
    let mut c = CellCache::new();
    c.freeze();
    c.unfreeze();
    c.put(&key("a", 1, "q", 1, 1), b"v", false);
    assert_eq!(c.len(), 1);
}

#[test]
fn frozen_cache_still_allows_reads() {
    let mut c = CellCache::new();
    let k = key("a", 1, "q", 1, 1);
    c.put(&k, b"v", false);
    c.freeze();
    assert_eq!(c.get(&k.serialize()), Some(b"v".as_slice()));
}

// -------------------- Split rows --------------------

#[test]
fn split_rows_empty_for_single_row() {
    let mut c = CellCache::new();
    c.put(&key("only", 1, "q", 1, 1), b"v", false);
    assert!(c.split_rows().is_empty());
}

#[test]
fn split_rows_picks_a_median_row() {
    let mut c = CellCache::new();
    for row in ["a", "b", "c", "d", "e"] {
        c.put(&key(row, 1, "q", 1, 1), b"v", false);
    }
    let candidates = c.split_rows();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0], b"c".to_vec());
}

#[test]
fn split_rows_counts_distinct_rows_not_cells() {
    let mut c = CellCache::new();
    // three cells under the same row must count as one distinct row
    c.put(&key("a", 1, "q1", 1, 1), b"v", false);
    c.put(&key("a", 1, "q2", 1, 1), b"v", false);
    c.put(&key("b", 1, "q1", 1, 1), b"v", false);
    assert!(c.split_rows().is_empty());
}

// -------------------- Clear --------------------

#[test]
fn clear_resets_everything() {
    let mut c = CellCache::new();
    c.put(&key("a", 1, "q", 1, 1), b"1", false);
    c.put(&key("b", 1, "q", 2, 2), b"2", false);
    assert!(!c.is_empty());
    assert!(c.approx_size() > 0);

    c.clear();
    assert_eq!(c.len(), 0);
    assert_eq!(c.approx_size(), 0);
    assert_eq!(c.delete_count(), 0);
    assert!(c.is_empty());
}

// -------------------- len / is_empty --------------------

#[test]
fn len_counts_tombstones() {
    let mut c = CellCache::new();
    c.put(&key("a", 1, "q", 1, 1), b"1", false);
    c.put(&delete_key("b", 1, "q", Flag::DeleteRow, 2, 2), b"", false);
    assert_eq!(c.len(), 2);
}

#[test]
fn is_empty_on_new() {
    let c = CellCache::new();
    assert!(c.is_empty());
}

#[test]
fn default_creates_empty() {
    let c = CellCache::default();
    assert!(c.is_empty());
    assert_eq!(c.approx_size(), 0);
}

// -------------------- Many / stress --------------------

#[test]
fn many_distinct_rows_sorted() {
    let mut c = CellCache::new();
    for i in 0u32..1000 {
        let row = format!("row{:04}", i);
        c.put(&key(&row, 1, "q", 1, 1), b"v", false);
    }
    assert_eq!(c.len(), 1000);
    let rows: Vec<Vec<u8>> = c.iter().map(|(k, _)| k.row().unwrap().to_vec()).collect();
    let mut sorted = rows.clone();
    sorted.sort();
    assert_eq!(rows, sorted);
}

#[test]
fn binary_row_and_value() {
    let mut c = CellCache::new();
    // row/qualifier bytes must exclude NUL (cstr-encoded); values have no such restriction.
    let k = Key::new(vec![0xFF, 0x80, 0x01], 1, b"q".to_vec(), Flag::Insert, 1, 1);
    let val = vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x00];
    c.put(&k, &val, false);
    assert_eq!(c.get(&k.serialize()), Some(val.as_slice()));
}

#[test]
fn large_value() {
    let mut c = CellCache::new();
    let k = key("big", 1, "q", 1, 1);
    let val = vec![b'x'; 1_000_000];
    c.put(&k, &val, false);
    assert_eq!(c.get(&k.serialize()).unwrap().len(), 1_000_000);
}
