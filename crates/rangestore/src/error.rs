//! The flat error taxonomy for the range runtime.
//!
//! Mirrors `wal::WalError`'s shape (`thiserror`, `#[from]` composition of
//! narrower per-crate errors) generalized to every failure mode the range
//! and access-group layers can raise.

use thiserror::Error;

/// Every error the range runtime can raise.
#[derive(Debug, Error)]
pub enum Error {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A cell-store file failed to open, read, or validate.
    #[error(transparent)]
    CellStore(#[from] cellstore::CellStoreError),

    /// A commit-log record failed to append or replay.
    #[error(transparent)]
    Wal(#[from] wal::WalError),

    /// A serialized key could not be decoded.
    #[error(transparent)]
    Key(#[from] keys::KeyError),

    /// A scan referenced a column-family id the schema does not define.
    #[error("invalid column family {0}")]
    InvalidColumnFamily(u8),

    /// A split could not find a valid split row within the range's boundary.
    #[error("no valid split row within range bounds")]
    RowOverflow,

    /// Maintenance (split/relinquish/shrink) was aborted because the range
    /// was dropped, or because another maintenance operation is already
    /// running on this range.
    #[error("operation cancelled")]
    Cancelled,

    /// A write carried a schema generation older than the one the range
    /// currently holds. Advisory: callers should refresh their schema and
    /// retry rather than treat this as fatal.
    #[error("schema generation mismatch: write carried {write}, range holds {current}")]
    SchemaGenerationMismatch {
        /// Generation number carried by the write.
        write: u64,
        /// Generation number the range currently holds.
        current: u64,
    },

    /// A replayed commit-log record's table identifier did not match the
    /// range it was being replayed into.
    #[error("commit log table identifier mismatch: expected {expected}, got {actual}")]
    CorruptCommitLog {
        /// The table identifier the range expected.
        expected: u64,
        /// The table identifier the record actually carried.
        actual: u64,
    },

    /// The metadata table rejected a write after exhausting its retry budget.
    #[error("metadata table write failed: {0}")]
    MetadataTable(String),

    /// An administrative command named an access group the schema doesn't define.
    #[error("unknown access group {0:?}")]
    UnknownAccessGroup(String),

    /// A write's revision was not newer than the access group's latest
    /// stored revision, and [`crate::config::ClockSkewPolicy::Reject`] is
    /// configured for it.
    #[error("clock skew: write revision {write} is not newer than latest stored revision {latest}")]
    ClockSkewRejected {
        /// Revision carried by the rejected write.
        write: i64,
        /// Latest revision already durably stored in the access group.
        latest: i64,
    },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
