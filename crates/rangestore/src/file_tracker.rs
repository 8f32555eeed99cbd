//! Live-file bookkeeping for one access group: which cell-store files are
//! logically live, which are still referenced by an outstanding scanner, and
//! which are blocked (retired but not yet deletable).
//!
//! Grounded on `engine::manifest::Manifest`: same "rewrite the whole
//! human-readable listing, then persist it" shape, generalized from a local
//! `MANIFEST` file with two fixed levels (L0/L1) to a single `live+blocked`
//! list written through an abstract [`crate::storage_context::MetadataTable`]
//! column, since spec.md places the metadata table outside this crate.

use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::storage_context::MetadataTable;

/// Serializes the `live`/`blocked` file sets into the `Files` column format:
/// one filename per line, a leading `#` marking a blocked file.
fn encode(live: &HashSet<String>, blocked: &HashSet<String>) -> String {
    let mut names: Vec<&String> = live.iter().chain(blocked.iter()).collect();
    names.sort();
    names.dedup();
    let mut out = String::new();
    for name in names {
        if blocked.contains(name) {
            out.push('#');
        }
        out.push_str(name);
        out.push('\n');
    }
    out
}

/// Tracks which cell-store files belong to one access group and persists
/// that set to the metadata table's `Files` column whenever it changes.
pub struct FileTracker {
    row: String,
    column: String,
    live: HashSet<String>,
    referenced: HashMap<String, u64>,
    blocked: HashSet<String>,
}

impl FileTracker {
    /// Builds a tracker for the access group named `access_group` belonging
    /// to the metadata-table row `row` (`<table_id>:<end_row>` per spec.md §6).
    #[must_use]
    pub fn new(row: impl Into<String>, access_group: impl Into<String>) -> Self {
        FileTracker {
            row: row.into(),
            column: access_group.into(),
            live: HashSet::new(),
            referenced: HashMap::new(),
            blocked: HashSet::new(),
        }
    }

    /// Returns the current live file set, in no particular order.
    #[must_use]
    pub fn live_files(&self) -> Vec<String> {
        self.live.iter().cloned().collect()
    }

    /// Returns the current blocked (retired, still referenced) file set.
    #[must_use]
    pub fn blocked_files(&self) -> Vec<String> {
        self.blocked.iter().cloned().collect()
    }

    /// A scanner has opened `filename`; bump its reference count.
    pub fn acquire(&mut self, filename: &str) {
        *self.referenced.entry(filename.to_string()).or_insert(0) += 1;
    }

    /// A scanner has released `filename` (its release callback fired).
    /// If this drops the refcount to zero and the file is blocked, it
    /// becomes eligible for removal from the `Files` column (and, by the
    /// caller, from disk).
    ///
    /// Returns `true` if `filename` just became deletable.
    pub fn release(&mut self, filename: &str) -> bool {
        let Some(count) = self.referenced.get_mut(filename) else {
            return false;
        };
        *count = count.saturating_sub(1);
        let now_unreferenced = *count == 0;
        if now_unreferenced {
            self.referenced.remove(filename);
        }
        now_unreferenced && self.blocked.contains(filename)
    }

    /// Applies a compaction's result: `removed` input filenames retire from
    /// `live` (moving to `blocked` if still referenced, or dropping entirely
    /// otherwise), and `added` becomes newly live. Returns the filenames that
    /// are immediately deletable (retired and unreferenced).
    pub fn apply_compaction(&mut self, removed: &[String], added: Option<String>) -> Vec<String> {
        let mut deletable = Vec::new();
        for name in removed {
            self.live.remove(name);
            if self.referenced.contains_key(name) {
                self.blocked.insert(name.clone());
            } else {
                deletable.push(name.clone());
            }
        }
        if let Some(name) = added {
            self.live.insert(name);
        }
        deletable
    }

    /// Persists the current `live+blocked` set to the metadata table,
    /// retrying transient I/O errors with exponential backoff starting at
    /// `initial_backoff` for up to `retries` attempts. A hard failure (every
    /// retry exhausted) surfaces to the caller, who treats it as a fatal
    /// range-level error per spec.md §4.9.
    pub fn persist(
        &self,
        table: &dyn MetadataTable,
        retries: u32,
        initial_backoff: Duration,
    ) -> Result<(), std::io::Error> {
        let value = encode(&self.live, &self.blocked);
        let mut backoff = initial_backoff;
        let mut attempt = 0;
        loop {
            match table.set(&self.row, &self.column, &value) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < retries => {
                    warn!(row = %self.row, column = %self.column, attempt, error = %e, "Files column write failed, retrying");
                    thread::sleep(backoff);
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_context::InMemoryMetadataTable;

    #[test]
    fn apply_compaction_moves_unreferenced_inputs_to_deletable() {
        let mut tracker = FileTracker::new("t:end", "default");
        tracker.apply_compaction(&[], Some("cs0".to_string()));
        tracker.apply_compaction(&[], Some("cs1".to_string()));

        let deletable = tracker.apply_compaction(
            &["cs0".to_string(), "cs1".to_string()],
            Some("cs2".to_string()),
        );
        assert_eq!(deletable, vec!["cs0".to_string(), "cs1".to_string()]);
        assert_eq!(tracker.live_files(), vec!["cs2".to_string()]);
        assert!(tracker.blocked_files().is_empty());
    }

    #[test]
    fn referenced_retired_file_becomes_blocked_not_deletable() {
        let mut tracker = FileTracker::new("t:end", "default");
        tracker.apply_compaction(&[], Some("cs0".to_string()));
        tracker.acquire("cs0");

        let deletable = tracker.apply_compaction(&["cs0".to_string()], Some("cs1".to_string()));
        assert!(deletable.is_empty());
        assert_eq!(tracker.blocked_files(), vec!["cs0".to_string()]);

        assert!(tracker.release("cs0"));
    }

    #[test]
    fn encode_marks_blocked_files_with_hash_prefix() {
        let mut live = HashSet::new();
        live.insert("cs1".to_string());
        let mut blocked = HashSet::new();
        blocked.insert("cs0".to_string());
        let encoded = encode(&live, &blocked);
        assert!(encoded.contains("#cs0\n"));
        assert!(encoded.contains("cs1\n"));
        assert!(!encoded.contains("#cs1"));
    }

    #[test]
    fn persist_writes_encoded_value_to_metadata_table() {
        let mut tracker = FileTracker::new("1:zzz", "default");
        tracker.apply_compaction(&[], Some("cs0".to_string()));
        let table = InMemoryMetadataTable::new();
        tracker.persist(&table, 3, Duration::from_millis(1)).unwrap();
        let value = table.get("1:zzz", "default").unwrap().unwrap();
        assert_eq!(value, "cs0\n");
    }
}
