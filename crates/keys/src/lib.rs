//! # Keys
//!
//! The canonical cell coordinate (row, column family, qualifier, flag,
//! timestamp, revision) and its serialized on-disk form, plus the varint and
//! fixed-width primitives everything above this crate builds on.
//!
//! Serialized-key ordering — a byte comparison of the `(row, 0x00, cfid, cq,
//! 0x00, ~timestamp, ~revision)` tail — is the storage engine's *only*
//! ordering. Timestamps and revisions are stored bitwise-inverted so that
//! newer cells (larger timestamp/revision) sort earlier, giving newest-first
//! traversal of identical `(row, cfid, cq)` triples without extra bookkeeping.

mod key;
mod prefix;
pub mod serialization;

pub use key::{
    Flag, Key, KeyError, ROW_DELETE_COLUMN_FAMILY, SerializedKey, TIMESTAMP_AUTO, TIMESTAMP_MAX,
    TIMESTAMP_MIN, TIMESTAMP_NULL,
};
pub use prefix::{PrefixError, PrefixKeyCompressor, PrefixKeyDecompressor};
