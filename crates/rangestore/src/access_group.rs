//! A vertical partition of a range's column families: its own write cache,
//! its own cell-store files, its own compaction lifecycle.
//!
//! Grounded on `engine::compaction::compact`'s merge-then-write-then-
//! atomic-swap shape (streaming merge into a new file, drop old readers,
//! delete old files, update persisted metadata), generalized from "always
//! merge every SSTable into one L1" to the five distinct compaction types
//! spec.md §4.7 describes, each with its own input set and
//! tombstone-forgetting policy.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{info, warn};

use cellstore::merge::{MergeConfig, MergeScanner, ScanSource, VecSource};
use cellstore::reader::{CellStoreReader, ScanContext};
use cellstore::writer::{CellStoreWriter, CellStoreWriterOptions};
use cellstore::{CellStoreError, CellStoreFs};
use keys::Key;
use memtable::CellCache;

use crate::config::{AccessGroupProperties, ClockSkewPolicy};
use crate::file_tracker::FileTracker;
use crate::garbage_tracker::GarbageTracker;
use crate::scan::{cache_scan_source, store_scan_source, CellScanner, ReleaseToken, RevisionCapSource, ScannerGuard};
use crate::storage_context::{FsForCellStore, StorageContext};
use crate::{Error, Result};

/// Which inputs a compaction merges and whether it is authorized to forget
/// tombstones, per spec.md §4.7's compaction-type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionType {
    /// Immutable cache only.
    Minor,
    /// Immutable cache plus the smallest few existing cell stores.
    Merge,
    /// Immutable cache plus every existing cell store; tombstones dropped.
    Major,
    /// Same inputs as [`Major`](Self::Major), triggered by the garbage tracker.
    Gc,
    /// Immutable cache plus every store, but the cache is retained in memory
    /// afterwards rather than cleared.
    InMemory,
}

impl CompactionType {
    fn merges_all_stores(self) -> bool {
        matches!(self, CompactionType::Major | CompactionType::Gc | CompactionType::InMemory)
    }

    fn forgets_tombstones(self) -> bool {
        matches!(self, CompactionType::Major | CompactionType::Gc)
    }

    fn is_major_flag(self) -> bool {
        matches!(self, CompactionType::Major | CompactionType::Gc)
    }
}

/// How many of the smallest existing stores a [`CompactionType::Merge`]
/// compaction folds in alongside the immutable cache.
const MERGE_COMPACTION_FANIN: usize = 4;

struct StoreEntry {
    filename: String,
    reader: Arc<CellStoreReader>,
}

struct State {
    start_row: Option<Vec<u8>>,
    end_row: Option<Vec<u8>>,
    cell_cache: CellCache,
    immutable_cache: Option<CellCache>,
    stores: Vec<StoreEntry>,
    earliest_cached_revision: i64,
    earliest_cached_revision_saved: i64,
    latest_stored_revision: i64,
    disk_usage: u64,
}

/// One access group within a range: a set of column families, their shared
/// write cache, and the cell-store files that hold their compacted data.
pub struct AccessGroup {
    name: String,
    dir: PathBuf,
    ctx: Arc<StorageContext>,
    /// `ctx.fs` adapted to the narrower seam cell-store readers/writers are
    /// built against, so every cell-store file this access group opens goes
    /// through the same filesystem `ctx.fs` does.
    cell_store_fs: Arc<dyn CellStoreFs>,
    properties: AccessGroupProperties,
    column_families: Vec<u8>,
    counter_column_families: Vec<u8>,
    max_versions: Vec<(u8, Option<u32>)>,
    /// Stamped into every cell store this access group finalizes, so a
    /// reopened file can be validated against the range that owns it.
    table_id: u64,
    schema_generation: u64,
    next_store_id: AtomicU64,
    state: Mutex<State>,
    outstanding_scanners: Mutex<u64>,
    garbage_tracker: Mutex<GarbageTracker>,
    file_tracker: Mutex<FileTracker>,
}

impl AccessGroup {
    /// Builds a fresh access group with no cached data and no stores.
    ///
    /// `metadata_row` is the metadata-table row (`<table_id>:<end_row>`) its
    /// file tracker persists the `Files` column under.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        dir: PathBuf,
        ctx: Arc<StorageContext>,
        properties: AccessGroupProperties,
        column_families: Vec<u8>,
        counter_column_families: Vec<u8>,
        max_versions: Vec<(u8, Option<u32>)>,
        metadata_row: impl Into<String>,
        start_row: Option<Vec<u8>>,
        end_row: Option<Vec<u8>>,
        table_id: u64,
        schema_generation: u64,
    ) -> Self {
        let name = name.into();
        let split_size = ctx.config.split_size;
        let garbage_threshold_percent = ctx.config.garbage_threshold_percent;
        let any_max_versions = max_versions.iter().any(|(_, v)| v.is_some());
        let cell_store_fs: Arc<dyn CellStoreFs> = Arc::new(FsForCellStore(Arc::clone(&ctx.fs)));
        AccessGroup {
            file_tracker: Mutex::new(FileTracker::new(metadata_row, name.clone())),
            garbage_tracker: Mutex::new(GarbageTracker::new(
                split_size,
                None,
                None,
                any_max_versions,
                garbage_threshold_percent,
            )),
            name,
            dir,
            ctx,
            cell_store_fs,
            properties,
            column_families,
            counter_column_families,
            max_versions,
            table_id,
            schema_generation,
            next_store_id: AtomicU64::new(0),
            state: Mutex::new(State {
                start_row,
                end_row,
                cell_cache: CellCache::new(),
                immutable_cache: None,
                stores: Vec::new(),
                earliest_cached_revision: i64::MAX,
                earliest_cached_revision_saved: i64::MAX,
                latest_stored_revision: i64::MIN,
                disk_usage: 0,
            }),
            outstanding_scanners: Mutex::new(0),
        }
    }

    /// The access group's administrative name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column family ids this access group owns.
    #[must_use]
    pub fn column_families(&self) -> &[u8] {
        &self.column_families
    }

    fn is_counter(&self, cfid: u8) -> bool {
        self.counter_column_families.contains(&cfid)
    }

    fn max_versions_for(&self, cfid: u8) -> Option<u32> {
        self.max_versions.iter().find(|(id, _)| *id == cfid).and_then(|(_, v)| *v)
    }

    /// Total approximate on-disk bytes across every cell store, used by a
    /// range to decide when to stage a split.
    #[must_use]
    pub fn disk_usage(&self) -> u64 {
        self.state.lock().disk_usage
    }

    /// Approximate byte size of the live (unstaged) cell cache.
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.state.lock().cell_cache.approx_size()
    }

    /// `true` if the live cache has grown past the configured minor-compaction
    /// threshold.
    #[must_use]
    pub fn needs_minor_compaction(&self) -> bool {
        self.cache_size() >= self.properties.minor_compaction_threshold
    }

    /// Candidate split rows: on-disk stores have no exposed first-key list in
    /// this format (a documented simplification — see `DESIGN.md`), so this
    /// falls back directly to the live cache's median-row heuristic.
    #[must_use]
    pub fn split_row_candidates(&self) -> Vec<Vec<u8>> {
        self.state.lock().cell_cache.split_rows()
    }

    pub(crate) fn increment_outstanding_scanners(&self) {
        *self.outstanding_scanners.lock() += 1;
    }

    pub(crate) fn decrement_outstanding_scanners(&self) {
        let mut count = self.outstanding_scanners.lock();
        *count = count.saturating_sub(1);
    }

    pub(crate) fn acquire_files(&self, filenames: &[String]) {
        let mut ft = self.file_tracker.lock();
        for name in filenames {
            ft.acquire(name);
        }
    }

    pub(crate) fn release_files(&self, filenames: &[String]) {
        let mut deletable = Vec::new();
        {
            let mut ft = self.file_tracker.lock();
            for name in filenames {
                if ft.release(name) {
                    deletable.push(name.clone());
                }
            }
        }
        for name in deletable {
            if let Err(e) = self.ctx.fs.remove(&self.dir.join(&name)) {
                warn!(access_group = %self.name, file = %name, error = %e, "failed to remove unreferenced cell store");
            }
        }
    }

    /// Applies one write. `recovering` is `true` while replaying a commit
    /// log, in which case clock skew is never rejected or dropped — the
    /// write already happened once and must be reproduced exactly.
    ///
    /// Per spec.md §4.7: a write whose revision is newer than every
    /// previously stored revision always lands in the cache. Otherwise this
    /// is clock skew, resolved per [`ClockSkewPolicy`].
    pub fn add(&self, key: &Key, value: &[u8], recovering: bool) -> Result<()> {
        let is_counter = self.is_counter(key.column_family_code);
        let mut st = self.state.lock();

        if key.revision > st.latest_stored_revision {
            st.earliest_cached_revision = st.earliest_cached_revision.min(key.revision);
            st.latest_stored_revision = key.revision;
            st.cell_cache.put(key, value, is_counter);
            return Ok(());
        }

        if recovering || self.properties.in_memory {
            st.cell_cache.put(key, value, is_counter);
            return Ok(());
        }

        match self.properties.clock_skew_policy {
            ClockSkewPolicy::Reject => Err(Error::ClockSkewRejected {
                write: key.revision,
                latest: st.latest_stored_revision,
            }),
            ClockSkewPolicy::WarnAndAccept => {
                warn!(
                    access_group = %self.name,
                    write_revision = key.revision,
                    latest_revision = st.latest_stored_revision,
                    "clock skew: accepting write not newer than latest stored revision"
                );
                st.cell_cache.put(key, value, is_counter);
                Ok(())
            }
            ClockSkewPolicy::WarnAndDrop => {
                warn!(
                    access_group = %self.name,
                    write_revision = key.revision,
                    latest_revision = st.latest_stored_revision,
                    "clock skew: dropping write not newer than latest stored revision"
                );
                Ok(())
            }
        }
    }

    /// Builds a scan over this access group's cache, immutable cache (if
    /// staged), and every cell store, restricted to `scan_ctx` and capped at
    /// `captured_revision` (ignoring any cell with a newer revision).
    ///
    /// Per spec.md §4.7: a cell store with a bloom filter is consulted via
    /// `scan_ctx`'s own bloom check inside `store.scan`; stores are included
    /// unconditionally here and let their own bloom filter short-circuit.
    pub fn create_scanner(self: &Arc<Self>, scan_ctx: &ScanContext, captured_revision: i64) -> Result<CellScanner> {
        let scanner_guard = ScannerGuard::new(self);

        let (sources, filenames) = {
            let st = self.state.lock();
            let mut sources: Vec<Box<dyn ScanSource>> = Vec::new();
            sources.push(cache_scan_source(&st.cell_cache, scan_ctx)?);
            if let Some(ref imm) = st.immutable_cache {
                sources.push(cache_scan_source(imm, scan_ctx)?);
            }
            let mut filenames = Vec::new();
            for store in &st.stores {
                sources.push(store_scan_source(&store.reader, scan_ctx)?);
                filenames.push(store.filename.clone());
            }
            (sources, filenames)
        };

        let capped: Vec<Box<dyn ScanSource>> = sources
            .into_iter()
            .map(|s| Box::new(RevisionCapSource::new(s, captured_revision)) as Box<dyn ScanSource>)
            .collect();

        let mut max_versions_cfg: Option<u32> = None;
        for &cfid in &self.column_families {
            if let Some(limit) = self.max_versions_for(cfid) {
                max_versions_cfg = Some(max_versions_cfg.map_or(limit, |v| v.max(limit)));
            }
        }

        let config = MergeConfig {
            max_versions: max_versions_cfg,
            counter_column_families: self.counter_column_families.clone(),
            ..MergeConfig::default()
        };

        let merge = MergeScanner::new(capped, config)?;
        let release = ReleaseToken::new(self, filenames);
        Ok(CellScanner::new(merge, vec![release], vec![scanner_guard]))
    }

    /// Stages a compaction: freezes the live cache as the immutable cache
    /// and installs a fresh writable one. Must be called while the owning
    /// range's update barrier is activated (writers paused). Returns `false`
    /// if there is nothing to compact.
    pub fn stage_compaction(&self) -> bool {
        let mut st = self.state.lock();
        if st.cell_cache.is_empty() && st.immutable_cache.is_none() {
            return false;
        }
        let mut frozen = std::mem::take(&mut st.cell_cache);
        frozen.freeze();
        st.immutable_cache = Some(frozen);
        st.earliest_cached_revision_saved = st.earliest_cached_revision;
        st.earliest_cached_revision = i64::MAX;
        true
    }

    /// Reverses a staged compaction after an error: merges the immutable
    /// cache back into the live cache and restores `earliest_cached_revision`.
    pub fn unstage_compaction(&self) {
        let mut st = self.state.lock();
        let Some(mut imm) = st.immutable_cache.take() else {
            return;
        };
        imm.unfreeze();
        let entries: Vec<(keys::SerializedKey, Vec<u8>)> =
            imm.iter().map(|(k, v)| (k.clone(), v.to_vec())).collect();
        for (sk, value) in entries {
            if let Ok(decoded) = Key::decode(&sk) {
                let is_counter = self.is_counter(decoded.column_family_code);
                st.cell_cache.put(&decoded, &value, is_counter);
            }
        }
        st.earliest_cached_revision = st.earliest_cached_revision.min(st.earliest_cached_revision_saved);
        warn!(access_group = %self.name, "compaction unstaged after error");
    }

    fn next_store_filename(&self) -> String {
        let id = self.next_store_id.fetch_add(1, Ordering::SeqCst);
        format!("cs{id}")
    }

    /// Runs the compaction algorithm over the currently staged immutable
    /// cache (see [`stage_compaction`](Self::stage_compaction)) per
    /// spec.md §4.7. `is_split_output` sets the cell store's `SPLIT` trailer
    /// flag, for compactions run as part of a range split.
    pub fn run_compaction(self: &Arc<Self>, compaction_type: CompactionType, is_split_output: bool) -> Result<()> {
        let outcome = self.try_run_compaction(compaction_type, is_split_output);
        if outcome.is_err() {
            self.unstage_compaction();
        }
        outcome
    }

    fn try_run_compaction(self: &Arc<Self>, requested_type: CompactionType, is_split_output: bool) -> Result<()> {
        let unbounded = ScanContext::unbounded();

        let (input_filenames, mut compaction_type) = {
            let st = self.state.lock();
            if st.immutable_cache.is_none() {
                return Ok(());
            }
            let filenames = if requested_type.merges_all_stores() {
                st.stores.iter().map(|s| s.filename.clone()).collect::<Vec<_>>()
            } else if matches!(requested_type, CompactionType::Merge) {
                let mut by_size: Vec<&StoreEntry> = st.stores.iter().collect();
                by_size.sort_by_key(|s| s.reader.trailer().total_length);
                by_size
                    .into_iter()
                    .take(MERGE_COMPACTION_FANIN)
                    .map(|s| s.filename.clone())
                    .collect::<Vec<_>>()
            } else {
                Vec::new()
            };
            (filenames, requested_type)
        };

        if matches!(compaction_type, CompactionType::Minor) {
            if let Some(escalated) = self.maybe_escalate_to_gc(&unbounded)? {
                compaction_type = escalated;
            }
        }

        let input_filenames = if compaction_type.merges_all_stores() && input_filenames.is_empty() {
            let st = self.state.lock();
            st.stores.iter().map(|s| s.filename.clone()).collect::<Vec<_>>()
        } else {
            input_filenames
        };

        let (sources, expected_items) = {
            let st = self.state.lock();
            let imm = st.immutable_cache.as_ref().expect("checked above");
            let mut sources: Vec<Box<dyn ScanSource>> = vec![Box::new(VecSource::new(
                imm.iter().map(|(k, v)| (k.clone(), v.to_vec())).collect(),
            ))];
            let mut expected_items = imm.len();
            for store in &st.stores {
                if input_filenames.contains(&store.filename) {
                    sources.push(store_scan_source(&store.reader, &unbounded)?);
                    expected_items += store.reader.trailer().key_count as usize;
                }
            }
            (sources, expected_items)
        };

        let merge_config = MergeConfig {
            counter_column_families: self.counter_column_families.clone(),
            return_deletes: !compaction_type.forgets_tombstones(),
            ..MergeConfig::default()
        };
        let mut scanner = MergeScanner::new(sources, merge_config)?;

        let filename = self.next_store_filename();
        let path = self.dir.join(&filename);
        let writer_opts = CellStoreWriterOptions {
            blocksize: self.properties.blocksize,
            codec: self.properties.codec,
            bloom_mode: self.properties.bloom_mode,
            expected_items: expected_items.max(1),
            index_64bit: false,
            is_split_output,
            is_major_compaction: compaction_type.is_major_flag(),
        };
        let mut writer = CellStoreWriter::create_with_fs(Arc::clone(&self.cell_store_fs), &path, writer_opts)?;

        let mut any = false;
        while let Some((key, value)) = scanner.next_cell()? {
            writer.observe_stats(key.timestamp, key.revision);
            writer.add(&key.serialize(), &value)?;
            any = true;
        }

        let added_filename = if any {
            match writer.finalize(self.table_id, self.schema_generation) {
                Ok(_trailer) => Some(filename.clone()),
                Err(CellStoreError::EmptyCellStore) => None,
                Err(e) => return Err(e.into()),
            }
        } else {
            drop(writer);
            let _ = self.ctx.fs.remove(&path.with_extension("cellstore.tmp"));
            None
        };

        {
            let mut st = self.state.lock();
            st.stores.retain(|s| !input_filenames.contains(&s.filename));
            if let Some(ref name) = added_filename {
                let reader = Arc::new(CellStoreReader::open_with_fs(
                    Arc::clone(&self.cell_store_fs),
                    self.dir.join(name),
                )?);
                st.stores.push(StoreEntry {
                    filename: name.clone(),
                    reader,
                });
            }
            if matches!(compaction_type, CompactionType::InMemory) {
                if let Some(mut imm) = st.immutable_cache.take() {
                    imm.unfreeze();
                    st.cell_cache = imm;
                }
            } else {
                st.immutable_cache = None;
            }
            st.disk_usage = st.stores.iter().map(|s| s.reader.trailer().total_length).sum();
        }

        let deletable = {
            let mut ft = self.file_tracker.lock();
            let deletable = ft.apply_compaction(&input_filenames, added_filename);
            ft.persist(&*self.ctx.metadata_table, self.ctx.config.io_retry_count, self.ctx.config.io_retry_backoff)
                .map_err(|e| Error::MetadataTable(e.to_string()))?;
            deletable
        };
        for name in deletable {
            let _ = self.ctx.fs.remove(&self.dir.join(&name));
        }

        info!(access_group = %self.name, compaction_type = ?compaction_type, inputs = input_filenames.len(), "compaction complete");
        Ok(())
    }

    /// Measures garbage in a pre-compaction pass over the immutable cache and
    /// every existing store; if the garbage tracker escalates, returns
    /// [`CompactionType::Gc`] to replace a requested minor compaction.
    fn maybe_escalate_to_gc(self: &Arc<Self>, unbounded: &ScanContext) -> Result<Option<CompactionType>> {
        let (mut sources, total_bytes) = {
            let st = self.state.lock();
            let Some(ref imm) = st.immutable_cache else {
                return Ok(None);
            };
            let mut sources: Vec<Box<dyn ScanSource>> = vec![Box::new(VecSource::new(
                imm.iter().map(|(k, v)| (k.clone(), v.to_vec())).collect(),
            ))];
            let mut total_bytes: u64 = imm.approx_size() as u64;
            for store in &st.stores {
                sources.push(store_scan_source(&store.reader, unbounded)?);
                total_bytes += store.reader.trailer().total_length;
            }
            (sources, total_bytes)
        };

        let measure_config = MergeConfig {
            counter_column_families: self.counter_column_families.clone(),
            return_deletes: false,
            ..MergeConfig::default()
        };
        let mut measuring = MergeScanner::new(std::mem::take(&mut sources), measure_config)?;
        let mut valid_bytes: u64 = 0;
        while let Some((key, value)) = measuring.next_cell()? {
            valid_bytes += key.serialize().as_bytes().len() as u64 + value.len() as u64;
        }

        let mut tracker = self.garbage_tracker.lock();
        tracker.set_garbage_stats(total_bytes, valid_bytes, Instant::now());
        if tracker.need_collection() {
            Ok(Some(CompactionType::Gc))
        } else {
            Ok(None)
        }
    }

    /// Rewrites this access group's logical boundary (post-split), dropping
    /// cache entries that fall outside it and reopening every underlying
    /// cell store so it keeps serving reads restricted to the new range —
    /// the file itself is left untouched and the sibling range keeps reading
    /// the same bytes. Must be called while holding both the owning range's
    /// update and scan barriers.
    pub fn shrink(&self, new_start: Option<Vec<u8>>, new_end: Option<Vec<u8>>) -> Result<()> {
        let mut st = self.state.lock();

        let retained: Vec<(keys::SerializedKey, Vec<u8>)> = st
            .cell_cache
            .iter()
            .filter(|(sk, _)| {
                let Ok(row) = sk.row() else { return false };
                in_bounds(row, new_start.as_deref(), new_end.as_deref())
            })
            .map(|(k, v)| (k.clone(), v.to_vec()))
            .collect();

        let mut fresh = CellCache::new();
        for (sk, value) in retained {
            if let Ok(decoded) = Key::decode(&sk) {
                let is_counter = self.is_counter(decoded.column_family_code);
                fresh.put(&decoded, &value, is_counter);
            }
        }
        st.cell_cache = fresh;
        st.start_row = new_start;
        st.end_row = new_end;

        for store in &mut st.stores {
            store.reader = Arc::new(CellStoreReader::open_with_fs(
                Arc::clone(&self.cell_store_fs),
                self.dir.join(&store.filename),
            )?);
        }

        Ok(())
    }

    /// Returns this access group's current logical boundary.
    #[must_use]
    pub fn boundary(&self) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
        let st = self.state.lock();
        (st.start_row.clone(), st.end_row.clone())
    }
}

fn in_bounds(row: &[u8], start: Option<&[u8]>, end: Option<&[u8]>) -> bool {
    if let Some(start) = start {
        if row < start {
            return false;
        }
    }
    if let Some(end) = end {
        if row >= end {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_context::StorageContext;
    use keys::Flag;
    use std::path::Path;
    use tempfile::tempdir;

    fn ag(dir: &Path) -> Arc<AccessGroup> {
        let ctx = Arc::new(StorageContext::standalone(64, crate::config::RangeStoreConfig::default()));
        Arc::new(AccessGroup::new(
            "default",
            dir.to_path_buf(),
            ctx,
            AccessGroupProperties::default(),
            vec![1],
            vec![],
            vec![],
            "1:zzz",
            None,
            None,
            1,
            1,
        ))
    }

    #[test]
    fn add_then_scan_returns_the_write() {
        let dir = tempdir().unwrap();
        let group = ag(dir.path());
        let key = Key::new(b"row1".to_vec(), 1, b"q".to_vec(), Flag::Insert, 100, 1);
        group.add(&key, b"hello", false).unwrap();

        let mut scanner = group.create_scanner(&ScanContext::unbounded(), i64::MAX).unwrap();
        let all = scanner.collect_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1, b"hello");
    }

    #[test]
    fn clock_skew_write_is_accepted_by_default() {
        let dir = tempdir().unwrap();
        let group = ag(dir.path());
        let k1 = Key::new(b"row1".to_vec(), 1, b"q".to_vec(), Flag::Insert, 100, 5);
        let k2 = Key::new(b"row1".to_vec(), 1, b"q2".to_vec(), Flag::Insert, 100, 1);
        group.add(&k1, b"a", false).unwrap();
        group.add(&k2, b"b", false).unwrap();

        let mut scanner = group.create_scanner(&ScanContext::unbounded(), i64::MAX).unwrap();
        assert_eq!(scanner.collect_all().unwrap().len(), 2);
    }

    #[test]
    fn minor_compaction_moves_cache_into_a_store() {
        let dir = tempdir().unwrap();
        let group = ag(dir.path());
        let key = Key::new(b"row1".to_vec(), 1, b"q".to_vec(), Flag::Insert, 100, 1);
        group.add(&key, b"hello", false).unwrap();

        assert!(group.stage_compaction());
        group.run_compaction(CompactionType::Minor, false).unwrap();

        assert_eq!(group.cache_size(), 0);
        let mut scanner = group.create_scanner(&ScanContext::unbounded(), i64::MAX).unwrap();
        let all = scanner.collect_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1, b"hello");
    }

    #[test]
    fn unstage_restores_cache_on_abandoned_compaction() {
        let dir = tempdir().unwrap();
        let group = ag(dir.path());
        let key = Key::new(b"row1".to_vec(), 1, b"q".to_vec(), Flag::Insert, 100, 1);
        group.add(&key, b"hello", false).unwrap();

        assert!(group.stage_compaction());
        group.unstage_compaction();

        assert_eq!(group.cache_size() > 0, true);
        let mut scanner = group.create_scanner(&ScanContext::unbounded(), i64::MAX).unwrap();
        assert_eq!(scanner.collect_all().unwrap().len(), 1);
    }
}
