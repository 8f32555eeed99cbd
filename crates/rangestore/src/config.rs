//! Plain configuration structs for access groups, cell stores, and the
//! process-level knobs the range runtime needs.
//!
//! No external config-file crate is introduced — there is no file-based
//! config surface in scope (per `spec.md` §1's non-goals). This mirrors the
//! teacher's approach of inline constants (`engine::MAX_KEY_SIZE`,
//! `engine::DEFAULT_L0_COMPACTION_TRIGGER`): plain structs with `Default`
//! impls, threaded explicitly through construction rather than read from a
//! file or environment at the crate boundary.

use bloom::BloomFilterMode;
use codec::CodecKind;

/// How an access group resolves a write whose revision is not newer than
/// the latest durably-stored revision.
///
/// Resolves spec.md §9's open question ("intent is unclear") with an
/// explicit, configurable decision point, defaulting to the behavior the
/// original implementation exhibits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSkewPolicy {
    /// Refuse the write outright.
    Reject,
    /// Log a warning and accept the write anyway (original's observed behavior).
    WarnAndAccept,
    /// Log a warning and silently drop the write.
    WarnAndDrop,
}

impl Default for ClockSkewPolicy {
    fn default() -> Self {
        ClockSkewPolicy::WarnAndAccept
    }
}

/// Per-access-group configuration.
#[derive(Debug, Clone)]
pub struct AccessGroupProperties {
    /// If set, the access group's data is expected to fit in memory and
    /// compactions retain the merged cache rather than dropping it
    /// (`CompactionType::InMemory`).
    pub in_memory: bool,
    /// Target uncompressed size of each cell-store data block.
    pub blocksize: u32,
    /// Compression algorithm applied to newly-written cell stores.
    pub codec: CodecKind,
    /// Which tokens newly-written cell stores' bloom filters are built from.
    pub bloom_mode: BloomFilterMode,
    /// Replication factor requested from the filesystem broker for new files.
    pub replication: u32,
    /// Byte size of the live cell cache that triggers a minor-compaction stage.
    pub minor_compaction_threshold: usize,
    /// How to resolve a write whose revision is not newer than the latest
    /// durably-stored one.
    pub clock_skew_policy: ClockSkewPolicy,
}

impl Default for AccessGroupProperties {
    fn default() -> Self {
        AccessGroupProperties {
            in_memory: false,
            blocksize: 64 * 1024,
            codec: CodecKind::Zlib,
            bloom_mode: BloomFilterMode::Rows,
            replication: 3,
            minor_compaction_threshold: 4 * 1024 * 1024,
            clock_skew_policy: ClockSkewPolicy::default(),
        }
    }
}

/// Per-cell-store-file configuration, derived from [`AccessGroupProperties`]
/// at compaction time plus the per-compaction flags
/// (`is_split_output`/`is_major_compaction`).
#[derive(Debug, Clone, Copy)]
pub struct CellStoreProperties {
    /// Target uncompressed size of each data block.
    pub blocksize: u32,
    /// Compression algorithm applied to every block.
    pub codec: CodecKind,
    /// Which tokens to insert into the bloom filter, if any.
    pub bloom_mode: BloomFilterMode,
    /// Expected number of entries, used to size the bloom filter up front.
    pub expected_items: usize,
}

/// Process-level knobs for the range server as a whole.
#[derive(Debug, Clone)]
pub struct RangeStoreConfig {
    /// Disk-usage threshold (bytes) that triggers a range split.
    pub split_size: u64,
    /// Disk-usage threshold (bytes) beyond which writes are throttled
    /// (`range_maximum_size` in spec.md §4.8).
    pub range_maximum_size: u64,
    /// Number of retries for a transient filesystem I/O error before giving up.
    pub io_retry_count: u32,
    /// Initial backoff before the first I/O retry.
    pub io_retry_backoff: std::time::Duration,
    /// Global garbage-percentage threshold above which a compaction escalates
    /// to a garbage-collecting major compaction.
    pub garbage_threshold_percent: f64,
    /// Whether this process keeps the lower half of a range on split
    /// ("drop high") or the upper half. Sticky per process, per spec.md §4.8.
    pub drop_high_on_split: bool,
}

impl Default for RangeStoreConfig {
    fn default() -> Self {
        RangeStoreConfig {
            split_size: 256 * 1024 * 1024,
            range_maximum_size: 512 * 1024 * 1024,
            io_retry_count: 3,
            io_retry_backoff: std::time::Duration::from_secs(5),
            garbage_threshold_percent: 20.0,
            drop_high_on_split: true,
        }
    }
}
