//! Abstract collaborators the range runtime depends on but does not
//! implement: the distributed filesystem, the metadata table, the range
//! metadata log, and the lock-service session that arbitrates range
//! ownership.
//!
//! None of these have a concrete production implementation here — they are
//! the trait boundaries the rest of the core is built against, the same way
//! `engine::Engine` is built directly against `std::fs` but could be ported
//! onto something else without touching `write.rs`/`read.rs`. Keeping them
//! as `dyn` trait objects threaded through [`StorageContext`] means no part
//! of `access_group`/`range` reaches for a free-standing global.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use cellstore::block_cache::BlockCache;
use cellstore::{CellStoreFs, SeekRead, SeekWrite};

use crate::config::RangeStoreConfig;

/// The distributed filesystem a range's files live on.
///
/// Abstracted so the core never assumes a local path is a real local path —
/// in production this would be backed by the broker spec.md places out of
/// scope; here it exists only as the seam `LocalFilesystem` below fills in
/// for tests and for the administrative CLI.
pub trait Filesystem: Send + Sync {
    /// Opens `path` for buffered sequential reading.
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn io::Read + Send>>;

    /// Creates (or truncates) `path` for writing.
    fn create(&self, path: &Path) -> io::Result<Box<dyn io::Write + Send>>;

    /// Opens `path` for random-access reading. Cell-store files are read by
    /// seeking straight to a trailer, index, or data block offset rather
    /// than streaming front to back, so this handle must support [`Seek`](io::Seek)
    /// as well as [`Read`](io::Read).
    fn open_read_seek(&self, path: &Path) -> io::Result<Box<dyn SeekRead>>;

    /// Creates (or truncates) `path` for random-access writing. A cell-store
    /// writer tracks each block's byte offset via `stream_position` as it
    /// streams output, so this handle must support [`Seek`](io::Seek) as well
    /// as [`Write`](io::Write).
    fn create_write_seek(&self, path: &Path) -> io::Result<Box<dyn SeekWrite>>;

    /// Atomically replaces `to` with `from`, as `std::fs::rename` does on a
    /// single volume.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Removes a file. Best-effort: callers treat a missing file as success.
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Returns the byte length of `path`, if it exists.
    fn len(&self, path: &Path) -> io::Result<u64>;

    /// Fsyncs a directory's own metadata (e.g. after an atomic rename into
    /// it) — something a file handle alone can't do, since it has no handle
    /// on its parent.
    fn sync_dir(&self, dir: &Path) -> io::Result<()>;
}

/// Adapts any [`Filesystem`] into the narrower [`CellStoreFs`] seam
/// `cellstore::CellStoreWriter`/`CellStoreReader` are built against, so the
/// cell-store crate never has to depend on this one. Constructed once per
/// [`StorageContext`] and shared by every access group's writer/reader calls.
pub struct FsForCellStore(pub Arc<dyn Filesystem>);

impl CellStoreFs for FsForCellStore {
    fn open_read_seek(&self, path: &Path) -> io::Result<Box<dyn SeekRead>> {
        self.0.open_read_seek(path)
    }

    fn create_write_seek(&self, path: &Path) -> io::Result<Box<dyn SeekWrite>> {
        self.0.create_write_seek(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.0.rename(from, to)
    }

    fn sync_dir(&self, dir: &Path) -> io::Result<()> {
        self.0.sync_dir(dir)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.0.remove(path)
    }
}

/// A filesystem backed directly by the local disk. The only [`Filesystem`]
/// implementation this crate ships; production deployments supply their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFilesystem;

impl Filesystem for LocalFilesystem {
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn io::Read + Send>> {
        Ok(Box::new(std::fs::File::open(path)?))
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn io::Write + Send>> {
        Ok(Box::new(std::fs::File::create(path)?))
    }

    fn open_read_seek(&self, path: &Path) -> io::Result<Box<dyn SeekRead>> {
        Ok(Box::new(std::fs::File::open(path)?))
    }

    fn create_write_seek(&self, path: &Path) -> io::Result<Box<dyn SeekWrite>> {
        Ok(Box::new(
            std::fs::OpenOptions::new().create(true).write(true).truncate(true).open(path)?,
        ))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn len(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn sync_dir(&self, dir: &Path) -> io::Result<()> {
        std::fs::File::open(dir)?.sync_all()
    }
}

/// The metadata table: an external, row-keyed store (e.g. a bootstrap range
/// of the table itself) holding each range's `Files` and `GarbageStats`
/// columns. Writes retry with backoff per [`RangeStoreConfig`]; the trait
/// itself is a plain synchronous get/set so `file_tracker`/`garbage_tracker`
/// don't need to know about the retry policy.
pub trait MetadataTable: Send + Sync {
    /// Reads a column value for `row`, or `None` if unset.
    fn get(&self, row: &str, column: &str) -> io::Result<Option<String>>;

    /// Writes a column value for `row`, replacing any existing value.
    fn set(&self, row: &str, column: &str, value: &str) -> io::Result<()>;
}

/// An in-memory [`MetadataTable`] used by tests and the administrative CLI's
/// standalone mode.
#[derive(Debug, Default)]
pub struct InMemoryMetadataTable {
    rows: parking_lot::Mutex<HashMap<(String, String), String>>,
}

impl InMemoryMetadataTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataTable for InMemoryMetadataTable {
    fn get(&self, row: &str, column: &str) -> io::Result<Option<String>> {
        Ok(self.rows.lock().get(&(row.to_string(), column.to_string())).cloned())
    }

    fn set(&self, row: &str, column: &str, value: &str) -> io::Result<()> {
        self.rows
            .lock()
            .insert((row.to_string(), column.to_string()), value.to_string());
        Ok(())
    }
}

/// The range metadata log: an external, append-only record of a range's
/// split/relinquish state transitions, written to before the corresponding
/// side effect becomes externally visible (boundary change, file rename),
/// so recovery can resume a half-finished transition. Distinct from the
/// per-write commit log ([`wal`]): this one only ever holds the current
/// state, not a replay stream.
pub trait RangeMetaLog: Send + Sync {
    /// Persists `state` as the range's current maintenance state. Must be
    /// durable before this call returns.
    fn record_state(&self, range_name: &str, state: &str) -> io::Result<()>;

    /// Reads back the last state recorded for `range_name`, if any.
    fn read_state(&self, range_name: &str) -> io::Result<Option<String>>;
}

/// An in-memory [`RangeMetaLog`] for tests.
#[derive(Debug, Default)]
pub struct InMemoryRangeMetaLog {
    states: parking_lot::Mutex<HashMap<String, String>>,
}

impl InMemoryRangeMetaLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RangeMetaLog for InMemoryRangeMetaLog {
    fn record_state(&self, range_name: &str, state: &str) -> io::Result<()> {
        self.states.lock().insert(range_name.to_string(), state.to_string());
        Ok(())
    }

    fn read_state(&self, range_name: &str) -> io::Result<Option<String>> {
        Ok(self.states.lock().get(range_name).cloned())
    }
}

/// The lock-service session ("Hyperspace" in the original) that arbitrates
/// which process currently owns a range. Out of scope to implement (spec.md
/// §1 non-goals list the master/lock service); this trait exists only so a
/// range can check it still holds its lease before a structural change.
pub trait HyperspaceSession: Send + Sync {
    /// Returns `true` if this process still holds the lease on `range_name`.
    fn still_holds_lease(&self, range_name: &str) -> bool;
}

/// A session that always reports the lease as held — used by tests and the
/// standalone CLI, where there is no real lock service to consult.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysLeased;

impl HyperspaceSession for AlwaysLeased {
    fn still_holds_lease(&self, _range_name: &str) -> bool {
        true
    }
}

/// Everything an [`crate::access_group::AccessGroup`] or [`crate::range::Range`] needs
/// that isn't itself: the filesystem, the shared block cache, the metadata
/// table, and process-level configuration. Constructed once per process and
/// shared via `Arc` — per spec.md §9's "no free globals" design note, nothing
/// in this crate reaches for a global instead of a field on this struct.
pub struct StorageContext {
    /// The filesystem ranges' cell-store and commit-log files live on.
    pub fs: Arc<dyn Filesystem>,
    /// Process-wide block cache shared by every cell-store reader.
    pub block_cache: Arc<BlockCache>,
    /// The metadata table backing `FileTracker`/`GarbageTracker` persistence.
    pub metadata_table: Arc<dyn MetadataTable>,
    /// The range metadata log backing split/relinquish state persistence.
    pub range_meta_log: Arc<dyn RangeMetaLog>,
    /// The lock-service session arbitrating range ownership.
    pub hyperspace: Arc<dyn HyperspaceSession>,
    /// Process-level knobs (split thresholds, retry policy, garbage threshold).
    pub config: RangeStoreConfig,
}

impl StorageContext {
    /// Builds a context for tests and the standalone CLI: local filesystem,
    /// in-memory metadata table and meta log, and a lease that is always held.
    #[must_use]
    pub fn standalone(block_cache_capacity: usize, config: RangeStoreConfig) -> Self {
        StorageContext {
            fs: Arc::new(LocalFilesystem),
            block_cache: Arc::new(BlockCache::new(block_cache_capacity)),
            metadata_table: Arc::new(InMemoryMetadataTable::new()),
            range_meta_log: Arc::new(InMemoryRangeMetaLog::new()),
            hyperspace: Arc::new(AlwaysLeased),
            config,
        }
    }
}
