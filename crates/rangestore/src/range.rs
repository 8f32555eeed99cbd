//! A range: the horizontal partition that owns a contiguous row interval of
//! one table, fans writes out across its [`AccessGroup`]s, and merges reads
//! back across them.
//!
//! Grounded on `engine::Engine`'s orchestrating-struct pattern — one
//! top-level struct owning sub-stores plus a `Drop` impl that best-effort
//! flushes (`impl Drop for Engine { fn drop(&mut self) { if
//! !self.mem.is_empty() { let _ = self.flush(); } } }`) — generalized from a
//! single memtable/SSTable pair to many access groups, and from a flat write
//! path to the lock/add/unlock session and split/relinquish state machines
//! spec.md §4.8 describes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use cellstore::reader::ScanContext;
use keys::{Flag, Key, SerializedKey, TIMESTAMP_AUTO};
use wal::{WalReader, WalRecord, WalWriter};

use crate::access_group::{AccessGroup, CompactionType};
use crate::barrier::{Barrier, BarrierGuard};
use crate::config::AccessGroupProperties;
use crate::scan::CellScanner;
use crate::schema::Schema;
use crate::storage_context::StorageContext;
use crate::{Error, Result};

/// Where a range sits in its split/relinquish state machine. Persisted (via
/// [`crate::storage_context::RangeMetaLog`]) before the corresponding
/// externally-visible side effect, so recovery can resume a half-finished
/// transition rather than guess at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeState {
    /// Normal operation: serving reads and writes, no maintenance in flight.
    Steady,
    /// A split has been durably decided on `split_row`; compaction of the
    /// staged input has not yet run.
    SplitLogInstalled { split_row: Vec<u8> },
    /// The split's compaction ran and every access group has been shrunk to
    /// its retained half; about to return to `Steady`.
    SplitShrunk { split_row: Vec<u8> },
    /// A relinquish has been durably decided; the range is flushing before
    /// handing off and will stop serving once this completes.
    RelinquishLogInstalled,
}

/// The outcome of a completed [`Range::split`]: the chosen split row and the
/// boundaries of both halves, so the caller can register the newly-created
/// sibling range with the metadata table.
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    /// The row the range was divided on.
    pub split_row: Vec<u8>,
    /// This range's boundary after the split.
    pub retained_start: Option<Vec<u8>>,
    /// This range's boundary after the split.
    pub retained_end: Option<Vec<u8>>,
    /// The newly-created sibling's boundary.
    pub sibling_start: Option<Vec<u8>>,
    /// The newly-created sibling's boundary.
    pub sibling_end: Option<Vec<u8>>,
}

fn metadata_row_name(table_id: u64, end_row: Option<&[u8]>) -> String {
    match end_row {
        Some(bytes) => format!("{table_id}:{}", String::from_utf8_lossy(bytes)),
        None => format!("{table_id}:END"),
    }
}

fn state_label(state: &RangeState) -> String {
    match state {
        RangeState::Steady => "STEADY".to_string(),
        RangeState::SplitLogInstalled { split_row } => {
            format!("SPLIT_LOG_INSTALLED:{}", String::from_utf8_lossy(split_row))
        }
        RangeState::SplitShrunk { split_row } => format!("SPLIT_SHRUNK:{}", String::from_utf8_lossy(split_row)),
        RangeState::RelinquishLogInstalled => "RELINQUISH_LOG_INSTALLED".to_string(),
    }
}

fn current_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn column_family_matches(ctx: &ScanContext, cfid: u8) -> bool {
    ctx.column_families.is_empty() || ctx.column_families.contains(&cfid)
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

fn median(rows: &[Vec<u8>]) -> Option<Vec<u8>> {
    if rows.is_empty() {
        None
    } else {
        Some(rows[rows.len() / 2].clone())
    }
}

/// Dispatches one decoded write to the access group(s) that own it: a row
/// delete fans out to every access group (spec.md §4.8), anything else goes
/// to the single access group owning its column family.
fn apply_entry(
    access_groups: &HashMap<String, Arc<AccessGroup>>,
    cfid_to_access_group: &HashMap<u8, Arc<AccessGroup>>,
    key: &Key,
    value: &[u8],
    recovering: bool,
) -> Result<()> {
    if key.flag == Flag::DeleteRow {
        for ag in access_groups.values() {
            ag.add(key, value, recovering)?;
        }
        Ok(())
    } else {
        let ag = cfid_to_access_group
            .get(&key.column_family_code)
            .ok_or(Error::InvalidColumnFamily(key.column_family_code))?;
        ag.add(key, value, recovering)
    }
}

/// Replays a range's commit log into its freshly-constructed access groups,
/// returning the highest revision it observed (`i64::MIN` if the log is
/// empty or absent). `WalReader::replay` hands entries to a closure with no
/// way to propagate a `Result`, so a mismatch or dispatch failure is
/// captured into `replay_err` and surfaced after `replay` returns.
fn replay_commit_log(
    table_id: u64,
    path: &Path,
    access_groups: &HashMap<String, Arc<AccessGroup>>,
    cfid_to_access_group: &HashMap<u8, Arc<AccessGroup>>,
) -> Result<i64> {
    if !path.exists() {
        return Ok(i64::MIN);
    }

    let mut reader = WalReader::open(path)?;
    let mut max_revision = i64::MIN;
    let mut replay_err: Option<Error> = None;

    reader.replay(|record| {
        if replay_err.is_some() {
            return;
        }
        if record.table != table_id {
            replay_err = Some(Error::CorruptCommitLog {
                expected: table_id,
                actual: record.table,
            });
            return;
        }
        for (key, value) in &record.entries {
            max_revision = max_revision.max(key.revision);
            if let Err(e) = apply_entry(access_groups, cfid_to_access_group, key, value, true) {
                replay_err = Some(e);
                return;
            }
        }
    })?;

    match replay_err {
        Some(e) => Err(e),
        None => Ok(max_revision),
    }
}

/// One horizontal partition of a table: a contiguous `[start_row, end_row)`
/// interval, its schema, and the access groups that hold its cells.
pub struct Range {
    name: String,
    table_id: u64,
    ctx: Arc<StorageContext>,
    schema: Mutex<Schema>,
    boundary: Mutex<(Option<Vec<u8>>, Option<Vec<u8>>)>,
    access_groups: HashMap<String, Arc<AccessGroup>>,
    cfid_to_access_group: HashMap<u8, Arc<AccessGroup>>,
    update_barrier: Barrier,
    scan_barrier: Barrier,
    maintenance_guard: Mutex<bool>,
    dropped: AtomicBool,
    next_revision: AtomicI64,
    latest_revision: AtomicI64,
    capacity_exceeded: AtomicBool,
    commit_log: Mutex<WalWriter>,
    state: Mutex<RangeState>,
}

impl Range {
    /// Opens (or creates) a range rooted at `dir`: one subdirectory per
    /// access group, plus a `commit.log` whose contents are replayed before
    /// this call returns, reproducing every write that landed after the last
    /// compaction exactly as it happened (clock skew included).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        table_id: u64,
        dir: PathBuf,
        ctx: Arc<StorageContext>,
        schema: Schema,
        access_group_properties: HashMap<String, AccessGroupProperties>,
        start_row: Option<Vec<u8>>,
        end_row: Option<Vec<u8>>,
    ) -> Result<Self> {
        let name = name.into();
        let metadata_row = metadata_row_name(table_id, end_row.as_deref());

        let mut access_groups = HashMap::new();
        let mut cfid_to_access_group = HashMap::new();
        for ag_name in schema.access_group_names() {
            let cfids = schema.column_families_for_access_group(&ag_name);
            let counters = schema.counter_column_families_for_access_group(&ag_name);
            let max_versions: Vec<(u8, Option<u32>)> = cfids
                .iter()
                .filter_map(|&id| schema.column_family(id).map(|cf| (id, cf.max_versions)))
                .collect();
            let props = access_group_properties.get(&ag_name).cloned().unwrap_or_default();

            let ag_dir = dir.join(&ag_name);
            std::fs::create_dir_all(&ag_dir)?;

            let ag = Arc::new(AccessGroup::new(
                ag_name.clone(),
                ag_dir,
                Arc::clone(&ctx),
                props,
                cfids.clone(),
                counters,
                max_versions,
                metadata_row.clone(),
                start_row.clone(),
                end_row.clone(),
                table_id,
                schema.generation,
            ));
            for &cfid in &cfids {
                cfid_to_access_group.insert(cfid, Arc::clone(&ag));
            }
            access_groups.insert(ag_name, ag);
        }

        let commit_log_path = dir.join("commit.log");
        let max_revision = replay_commit_log(table_id, &commit_log_path, &access_groups, &cfid_to_access_group)?;
        let commit_log = WalWriter::create(&commit_log_path, true)?;
        let next_start = if max_revision == i64::MIN { 0 } else { max_revision + 1 };

        Ok(Range {
            name,
            table_id,
            ctx,
            schema: Mutex::new(schema),
            boundary: Mutex::new((start_row, end_row)),
            access_groups,
            cfid_to_access_group,
            update_barrier: Barrier::new(),
            scan_barrier: Barrier::new(),
            maintenance_guard: Mutex::new(false),
            dropped: AtomicBool::new(false),
            next_revision: AtomicI64::new(next_start),
            latest_revision: AtomicI64::new(max_revision),
            capacity_exceeded: AtomicBool::new(false),
            commit_log: Mutex::new(commit_log),
            state: Mutex::new(RangeState::Steady),
        })
    }

    /// This range's administrative name (e.g. `"<table_id>:<end_row>"`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The schema generation this range currently enforces writes against.
    #[must_use]
    pub fn schema_generation(&self) -> u64 {
        self.schema.lock().generation
    }

    /// The highest revision published by a completed write session so far.
    #[must_use]
    pub fn latest_revision(&self) -> i64 {
        self.latest_revision.load(Ordering::SeqCst)
    }

    /// This range's current `(start_row, end_row)` boundary.
    #[must_use]
    pub fn boundary(&self) -> (Option<Vec<u8>>, Option<Vec<u8>>) {
        self.boundary.lock().clone()
    }

    /// Where this range currently sits in its split/relinquish state machine.
    #[must_use]
    pub fn state(&self) -> RangeState {
        self.state.lock().clone()
    }

    /// Sum of every access group's on-disk bytes plus its live cache bytes —
    /// what `needs_split`/`is_write_throttled` compare against the
    /// configured thresholds.
    #[must_use]
    pub fn disk_usage(&self) -> u64 {
        self.access_groups
            .values()
            .map(|ag| ag.disk_usage() + ag.cache_size() as u64)
            .sum()
    }

    /// `true` once accumulated size crosses the configured split threshold.
    #[must_use]
    pub fn needs_split(&self) -> bool {
        self.disk_usage() >= self.ctx.config.split_size
    }

    /// `true` while writes should be throttled by the caller: accumulated
    /// size has crossed `range_maximum_size` per spec.md §4.8's
    /// capacity-exceeded throttle.
    #[must_use]
    pub fn is_write_throttled(&self) -> bool {
        self.capacity_exceeded.load(Ordering::SeqCst)
    }

    fn update_capacity_flag(&self) {
        let exceeded = self.disk_usage() > self.ctx.config.range_maximum_size;
        self.capacity_exceeded.store(exceeded, Ordering::SeqCst);
    }

    fn persist_state(&self, state: &RangeState) -> Result<()> {
        self.ctx
            .range_meta_log
            .record_state(&self.name, &state_label(state))
            .map_err(|e| Error::MetadataTable(e.to_string()))
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.dropped.load(Ordering::SeqCst) {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn begin_maintenance(&self) -> Result<MaintenanceGuard<'_>> {
        let mut busy = self.maintenance_guard.lock();
        if *busy {
            return Err(Error::Cancelled);
        }
        *busy = true;
        Ok(MaintenanceGuard { flag: &self.maintenance_guard })
    }

    /// Opens a write session. Every cell `add`ed before `unlock` is applied
    /// atomically from a reader's point of view: one batched [`WalRecord`] is
    /// appended to the commit log, then every entry lands in its owning
    /// access group while the update barrier still blocks maintenance, then
    /// `latest_revision` is published.
    pub fn lock(&self) -> RangeWriteGuard<'_> {
        RangeWriteGuard {
            range: self,
            _update_guard: self.update_barrier.enter(),
            entries: Vec::new(),
            max_revision: i64::MIN,
            finished: false,
        }
    }

    fn dispatch(&self, key: &Key, value: &[u8], recovering: bool) -> Result<()> {
        apply_entry(&self.access_groups, &self.cfid_to_access_group, key, value, recovering)
    }

    /// Builds a scanner over every access group whose column families
    /// intersect `scan_ctx`, merged into row order. Captures `latest_revision`
    /// at construction; any cell with a newer revision is invisible to it,
    /// per spec.md §5.
    pub fn create_scanner(&self, scan_ctx: &ScanContext) -> Result<RangeScanner<'_>> {
        let scan_guard = self.scan_barrier.enter();
        let captured_revision = self.latest_revision.load(Ordering::SeqCst);

        let mut per_ag_scanners = Vec::new();
        for ag in self.access_groups.values() {
            let intersects = ag.column_families().iter().any(|&cfid| column_family_matches(scan_ctx, cfid));
            if intersects {
                per_ag_scanners.push(ag.create_scanner(scan_ctx, captured_revision)?);
            }
        }

        let inner = RangeMergeScanner::new(per_ag_scanners)?;
        Ok(RangeScanner {
            inner,
            _scan_guard: scan_guard,
        })
    }

    /// Runs a compaction against the named access group. A no-op if it has
    /// nothing staged to compact.
    pub fn compact(&self, access_group: &str, compaction_type: CompactionType) -> Result<()> {
        let ag = self
            .access_groups
            .get(access_group)
            .ok_or_else(|| Error::UnknownAccessGroup(access_group.to_string()))?;

        let staged = {
            let _update = self.update_barrier.activate();
            ag.stage_compaction()
        };
        if !staged {
            return Ok(());
        }

        ag.run_compaction(compaction_type, false)?;
        self.update_capacity_flag();
        Ok(())
    }

    /// Chooses a split row by gathering every access group's cached-row
    /// candidates, filtering to those within the current boundary, and
    /// taking the median. Falls back to the unfiltered median if every
    /// candidate lies outside the boundary; errors with [`Error::RowOverflow`]
    /// if there are no candidates at all.
    fn choose_split_row(&self) -> Result<Vec<u8>> {
        let (start, end) = self.boundary();

        let mut candidates: Vec<Vec<u8>> =
            self.access_groups.values().flat_map(|ag| ag.split_row_candidates()).collect();

        let mut in_bounds_candidates: Vec<Vec<u8>> = candidates
            .iter()
            .filter(|row| in_bounds(row, start.as_deref(), end.as_deref()))
            .cloned()
            .collect();
        in_bounds_candidates.sort();
        if let Some(row) = median(&in_bounds_candidates) {
            return Ok(row);
        }

        candidates.sort();
        median(&candidates).ok_or(Error::RowOverflow)
    }

    /// Splits this range in two at a chosen median row. Per spec.md §4.8:
    /// the decision is durably logged before any externally-visible side
    /// effect, every access group is minor-compacted (so the staged cache
    /// doesn't straddle the new boundary), then every access group is
    /// shrunk in place to its retained half — the sibling range opens
    /// reading the same on-disk files, never a physically split copy.
    /// Concurrent splits/relinquishes on the same range fail with
    /// [`Error::Cancelled`]; which half this range keeps is controlled by
    /// [`crate::config::RangeStoreConfig::drop_high_on_split`].
    pub fn split(&self) -> Result<SplitOutcome> {
        let _maintenance = self.begin_maintenance()?;
        self.check_cancelled()?;

        let split_row = self.choose_split_row()?;

        let pending_state = RangeState::SplitLogInstalled {
            split_row: split_row.clone(),
        };
        self.persist_state(&pending_state)?;
        *self.state.lock() = pending_state;

        let _update = self.update_barrier.activate();
        let _scan = self.scan_barrier.activate();

        for ag in self.access_groups.values() {
            self.check_cancelled()?;
            if ag.stage_compaction() {
                ag.run_compaction(CompactionType::Minor, true)?;
            }
        }

        let (old_start, old_end) = self.boundary();
        let (retained_start, retained_end, sibling_start, sibling_end) = if self.ctx.config.drop_high_on_split {
            (old_start, Some(split_row.clone()), Some(split_row.clone()), old_end)
        } else {
            (Some(split_row.clone()), old_end, old_start, Some(split_row.clone()))
        };

        for ag in self.access_groups.values() {
            ag.shrink(retained_start.clone(), retained_end.clone())?;
        }
        *self.boundary.lock() = (retained_start.clone(), retained_end.clone());

        let shrunk_state = RangeState::SplitShrunk {
            split_row: split_row.clone(),
        };
        self.persist_state(&shrunk_state)?;
        *self.state.lock() = shrunk_state;

        self.capacity_exceeded.store(false, Ordering::SeqCst);
        self.persist_state(&RangeState::Steady)?;
        *self.state.lock() = RangeState::Steady;

        info!(range = %self.name, split_row = %String::from_utf8_lossy(&split_row), "range split");

        Ok(SplitOutcome {
            split_row,
            retained_start,
            retained_end,
            sibling_start,
            sibling_end,
        })
    }

    /// Flushes every access group's cache and marks this range as no longer
    /// serving. Per spec.md §4.8: the decision is durably logged first; once
    /// this returns, every subsequent call on this range fails with
    /// [`Error::Cancelled`].
    pub fn relinquish(&self) -> Result<()> {
        let _maintenance = self.begin_maintenance()?;
        self.check_cancelled()?;

        if !self.ctx.hyperspace.still_holds_lease(&self.name) {
            return Err(Error::Cancelled);
        }

        self.persist_state(&RangeState::RelinquishLogInstalled)?;
        *self.state.lock() = RangeState::RelinquishLogInstalled;

        let _update = self.update_barrier.activate();
        let _scan = self.scan_barrier.activate();

        for ag in self.access_groups.values() {
            self.check_cancelled()?;
            if ag.stage_compaction() {
                ag.run_compaction(CompactionType::Minor, false)?;
            }
        }

        self.dropped.store(true, Ordering::SeqCst);
        info!(range = %self.name, "range relinquished");
        Ok(())
    }
}

impl Drop for Range {
    fn drop(&mut self) {
        for ag in self.access_groups.values() {
            if ag.cache_size() > 0 && ag.stage_compaction() {
                if let Err(e) = ag.run_compaction(CompactionType::Minor, false) {
                    warn!(range = %self.name, access_group = ag.name(), error = %e, "best-effort flush on drop failed");
                }
            }
        }
    }
}

struct MaintenanceGuard<'a> {
    flag: &'a Mutex<bool>,
}

impl Drop for MaintenanceGuard<'_> {
    fn drop(&mut self) {
        *self.flag.lock() = false;
    }
}

/// A held write session opened by [`Range::lock`]. Every cell passed to
/// [`add`](Self::add) is buffered until [`unlock`](Self::unlock) (or, for a
/// caller that drops the guard without calling it, best-effort on `Drop` —
/// mirroring `engine::Engine`'s own best-effort flush on drop).
pub struct RangeWriteGuard<'a> {
    range: &'a Range,
    _update_guard: BarrierGuard<'a>,
    entries: Vec<(Key, Vec<u8>)>,
    max_revision: i64,
    finished: bool,
}

impl RangeWriteGuard<'_> {
    /// Buffers one cell. `schema_generation` is the generation the caller
    /// last observed; a stale generation is rejected so the caller can
    /// refresh and retry rather than writing against an outdated schema.
    /// The range overwrites `key.revision` (and `key.timestamp` if it still
    /// carries [`TIMESTAMP_AUTO`]) unconditionally — the caller's own values
    /// for these fields are advisory only.
    pub fn add(&mut self, mut key: Key, value: Vec<u8>, schema_generation: u64) -> Result<()> {
        let current_generation = self.range.schema.lock().generation;
        if schema_generation < current_generation {
            return Err(Error::SchemaGenerationMismatch {
                write: schema_generation,
                current: current_generation,
            });
        }

        if key.flag != Flag::DeleteRow && !self.range.cfid_to_access_group.contains_key(&key.column_family_code) {
            return Err(Error::InvalidColumnFamily(key.column_family_code));
        }

        if key.timestamp == TIMESTAMP_AUTO {
            key.timestamp = current_millis();
        }
        key.revision = self.range.next_revision.fetch_add(1, Ordering::SeqCst);
        self.max_revision = self.max_revision.max(key.revision);
        self.entries.push((key, value));
        Ok(())
    }

    /// Commits the session: one batched [`WalRecord`] append, then dispatch
    /// to every owning access group, then publishes `latest_revision`.
    /// Returns the range's `latest_revision` after publishing (unchanged if
    /// nothing was added).
    pub fn unlock(mut self) -> Result<i64> {
        self.finish()
    }

    fn finish(&mut self) -> Result<i64> {
        if self.finished {
            return Ok(self.range.latest_revision());
        }
        self.finished = true;

        if self.entries.is_empty() {
            return Ok(self.range.latest_revision());
        }

        let record = WalRecord {
            table: self.range.table_id,
            entries: self.entries.clone(),
        };
        self.range.commit_log.lock().append(&record)?;

        for (key, value) in &self.entries {
            self.range.dispatch(key, value, false)?;
        }

        self.range.latest_revision.fetch_max(self.max_revision, Ordering::SeqCst);
        self.range.update_capacity_flag();
        Ok(self.range.latest_revision())
    }
}

impl Drop for RangeWriteGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.finish() {
                warn!(range = %self.range.name, error = %e, "best-effort commit of dropped write session failed");
            }
        }
    }
}

/// A live scan over a range: every intersecting access group's already
/// shadow-resolved stream, merged into row order.
pub struct RangeScanner<'a> {
    inner: RangeMergeScanner,
    _scan_guard: BarrierGuard<'a>,
}

impl RangeScanner<'_> {
    /// Returns the next surviving cell across every access group, or `None`
    /// once exhausted.
    pub fn next_cell(&mut self) -> Result<Option<(Key, Vec<u8>)>> {
        self.inner.next_cell()
    }

    /// Collects every surviving cell. Intended for tests and small scans.
    pub fn collect_all(&mut self) -> Result<Vec<(Key, Vec<u8>)>> {
        self.inner.collect_all()
    }
}

/// Merges several already-shadow-resolved [`CellScanner`]s in ascending
/// [`SerializedKey`] order.
///
/// A range's access groups never share column-family ids, so unlike
/// `cellstore::merge::MergeScanner` (which groups raw sources by `(row, cf,
/// qualifier)` to resolve tombstones/versions/counters), this only needs to
/// pick the smallest next key across streams that are already final —
/// re-running that resolution across access-group boundaries would be
/// wrong, since deletes and version limits never cross them.
struct RangeMergeScanner {
    sources: Vec<CellScanner>,
    buffered: Vec<Option<(SerializedKey, Key, Vec<u8>)>>,
}

impl RangeMergeScanner {
    fn new(mut sources: Vec<CellScanner>) -> Result<Self> {
        let mut buffered = Vec::with_capacity(sources.len());
        for source in &mut sources {
            buffered.push(Self::pull(source)?);
        }
        Ok(RangeMergeScanner { sources, buffered })
    }

    fn pull(source: &mut CellScanner) -> Result<Option<(SerializedKey, Key, Vec<u8>)>> {
        Ok(source.next_cell()?.map(|(key, value)| {
            let serialized = key.serialize();
            (serialized, key, value)
        }))
    }

    fn next_cell(&mut self) -> Result<Option<(Key, Vec<u8>)>> {
        let mut min_idx: Option<usize> = None;
        for (i, slot) in self.buffered.iter().enumerate() {
            let Some((candidate_key, _, _)) = slot else {
                continue;
            };
            let take = match min_idx {
                None => true,
                Some(m) => {
                    let (current_key, _, _) = self.buffered[m].as_ref().unwrap();
                    candidate_key < current_key
                }
            };
            if take {
                min_idx = Some(i);
            }
        }

        let Some(idx) = min_idx else {
            return Ok(None);
        };
        let (_, key, value) = self.buffered[idx].take().expect("min_idx only set for a populated slot");
        self.buffered[idx] = Self::pull(&mut self.sources[idx])?;
        Ok(Some((key, value)))
    }

    fn collect_all(&mut self) -> Result<Vec<(Key, Vec<u8>)>> {
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
    use crate::config::RangeStoreConfig;
    use crate::schema::ColumnFamily;
    use keys::Flag;
    use tempfile::tempdir;

    fn sample_schema() -> Schema {
        Schema::new(
            1,
            vec![
                ColumnFamily {
                    name: "default".into(),
                    id: 1,
                    access_group: "default".into(),
                    is_counter: false,
                    max_versions: None,
                },
                ColumnFamily {
                    name: "other".into(),
                    id: 2,
                    access_group: "other".into(),
                    is_counter: false,
                    max_versions: None,
                },
            ],
        )
    }

    fn build_range(dir: &std::path::Path) -> Range {
        let ctx = Arc::new(StorageContext::standalone(64, RangeStoreConfig::default()));
        Range::new(
            "1:zzz",
            1,
            dir.to_path_buf(),
            ctx,
            sample_schema(),
            HashMap::new(),
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn write_then_read_round_trip() {
        let dir = tempdir().unwrap();
        let range = build_range(dir.path());

        let mut session = range.lock();
        session
            .add(Key::new(b"row1".to_vec(), 1, b"q".to_vec(), Flag::Insert, 100, 0), b"hello".to_vec(), 1)
            .unwrap();
        session.unlock().unwrap();

        let mut scanner = range.create_scanner(&ScanContext::unbounded()).unwrap();
        let all = scanner.collect_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1, b"hello");
        assert_eq!(range.latest_revision(), 0);
    }

    #[test]
    fn row_delete_fans_out_to_every_access_group() {
        let dir = tempdir().unwrap();
        let range = build_range(dir.path());

        {
            let mut session = range.lock();
            session
                .add(Key::new(b"row1".to_vec(), 1, b"q".to_vec(), Flag::Insert, 100, 0), b"a".to_vec(), 1)
                .unwrap();
            session
                .add(Key::new(b"row1".to_vec(), 2, b"q".to_vec(), Flag::Insert, 100, 0), b"b".to_vec(), 1)
                .unwrap();
            session.unlock().unwrap();
        }
        {
            let mut session = range.lock();
            session
                .add(
                    Key::new(b"row1".to_vec(), keys::ROW_DELETE_COLUMN_FAMILY, b"".to_vec(), Flag::DeleteRow, 200, 0),
                    b"".to_vec(),
                    1,
                )
                .unwrap();
            session.unlock().unwrap();
        }

        let mut scanner = range.create_scanner(&ScanContext::unbounded()).unwrap();
        assert!(scanner.collect_all().unwrap().is_empty());
    }

    #[test]
    fn write_to_unknown_column_family_errors() {
        let dir = tempdir().unwrap();
        let range = build_range(dir.path());
        let mut session = range.lock();
        let err = session
            .add(Key::new(b"row1".to_vec(), 9, b"q".to_vec(), Flag::Insert, 100, 0), b"x".to_vec(), 1)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidColumnFamily(9)));
    }

    #[test]
    fn stale_schema_generation_is_rejected() {
        let dir = tempdir().unwrap();
        let range = build_range(dir.path());
        let mut session = range.lock();
        let err = session
            .add(Key::new(b"row1".to_vec(), 1, b"q".to_vec(), Flag::Insert, 100, 0), b"x".to_vec(), 0)
            .unwrap_err();
        assert!(matches!(err, Error::SchemaGenerationMismatch { write: 0, current: 1 }));
    }

    #[test]
    fn split_divides_the_range_on_a_median_row() {
        let dir = tempdir().unwrap();
        let range = build_range(dir.path());
        {
            let mut session = range.lock();
            session
                .add(Key::new(b"a".to_vec(), 1, b"q".to_vec(), Flag::Insert, 100, 0), b"1".to_vec(), 1)
                .unwrap();
            session
                .add(Key::new(b"m".to_vec(), 1, b"q".to_vec(), Flag::Insert, 100, 0), b"2".to_vec(), 1)
                .unwrap();
            session
                .add(Key::new(b"z".to_vec(), 1, b"q".to_vec(), Flag::Insert, 100, 0), b"3".to_vec(), 1)
                .unwrap();
            session.unlock().unwrap();
        }

        let outcome = range.split().unwrap();
        assert_eq!(outcome.split_row, b"m".to_vec());
        assert_eq!(range.boundary(), (outcome.retained_start, outcome.retained_end));
        assert_eq!(range.state(), RangeState::Steady);
    }

    #[test]
    fn concurrent_maintenance_is_cancelled() {
        let dir = tempdir().unwrap();
        let range = build_range(dir.path());
        let _guard = range.begin_maintenance().unwrap();
        assert!(matches!(range.split().unwrap_err(), Error::Cancelled));
    }

    #[test]
    fn commit_log_replay_recovers_writes_after_reopen() {
        let dir = tempdir().unwrap();
        {
            let range = build_range(dir.path());
            let mut session = range.lock();
            session
                .add(Key::new(b"row1".to_vec(), 1, b"q".to_vec(), Flag::Insert, 100, 0), b"hello".to_vec(), 1)
                .unwrap();
            session.unlock().unwrap();
        }

        let ctx = Arc::new(StorageContext::standalone(64, RangeStoreConfig::default()));
        let reopened = Range::new(
            "1:zzz",
            1,
            dir.path().to_path_buf(),
            ctx,
            sample_schema(),
            HashMap::new(),
            None,
            None,
        )
        .unwrap();

        let mut scanner = reopened.create_scanner(&ScanContext::unbounded()).unwrap();
        let all = scanner.collect_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1, b"hello");
        assert_eq!(reopened.latest_revision(), 0);
    }
}
