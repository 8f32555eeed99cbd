//! The range server core: per-range write/read paths, compaction, and the
//! split/relinquish state machines, built on top of [`cellstore`] (the file
//! format) and [`memtable`]/[`wal`] (the in-memory cache and commit log).
//!
//! A table is split into [`range::Range`]s, each a contiguous row interval;
//! a range is itself vertically partitioned into [`access_group::AccessGroup`]s,
//! one per set of column families sharing a compaction lifecycle. Neither a
//! range server process, an RPC layer, nor the master that assigns ranges to
//! processes is implemented here — spec.md §1 places them out of scope, and
//! [`storage_context`] exists specifically to keep this crate's logic
//! testable against in-memory stand-ins for all of it.

mod access_group;
mod barrier;
mod config;
mod error;
mod file_tracker;
mod garbage_tracker;
mod range;
mod scan;
mod schema;
mod storage_context;

pub use access_group::{AccessGroup, CompactionType};
pub use config::{AccessGroupProperties, CellStoreProperties, ClockSkewPolicy, RangeStoreConfig};
pub use error::{Error, Result};
pub use range::{Range, RangeScanner, RangeState, RangeWriteGuard, SplitOutcome};
pub use schema::{ColumnFamily, Schema};
pub use scan::{client_scan_config, CellScanner};
pub use storage_context::{
    AlwaysLeased, Filesystem, HyperspaceSession, InMemoryMetadataTable, InMemoryRangeMetaLog, LocalFilesystem,
    MetadataTable, RangeMetaLog, StorageContext,
};
