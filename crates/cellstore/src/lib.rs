//! # Cell store
//!
//! The immutable, on-disk unit an access group flushes to and compacts from.
//! Where the teacher's SSTable was one flat data section plus a tail-of-file
//! index, a cell store is laid out as **N compressed data blocks, a variable
//! index block, a fixed index block, an optional bloom-filter block, and a
//! fixed 192-byte trailer** — enough structure to support range scans,
//! restricted-row scans, and lazy index loading/purging.
//!
//! ## File layout
//!
//! ```text
//! [data block 0][data block 1]...[data block N-1]
//! [bloom filter block]            (present unless BloomFilterMode::Disabled)
//! [variable index block]          (first serialized key of each data block, prefix-compressed)
//! [fixed index block]             (matching array of data-block byte offsets, u32 or u64)
//! [trailer: 192 bytes]
//! ```
//!
//! Every block (data/var-index/fix-index) is wrapped in a [`codec::BlockHeader`]
//! framed block: magic, lengths, compression type, Fletcher-32 checksum.

pub mod block_cache;
pub mod block_index;
pub mod fs;
pub mod merge;
mod record;
pub mod reader;
pub mod trailer;
pub mod writer;

pub use block_cache::BlockCache;
pub use block_index::CellStoreBlockIndex;
pub use fs::{CellStoreFs, LocalCellStoreFs, SeekRead, SeekWrite};
pub use merge::{MergeScanner, ScanSource};
pub use reader::{CellStoreReader, ScanContext};
pub use trailer::CellStoreTrailer;
pub use writer::CellStoreWriter;

use thiserror::Error;

/// Errors raised anywhere in the cell-store file format: writer, reader,
/// block index, or trailer.
#[derive(Debug, Error)]
pub enum CellStoreError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A block failed to decompress or its checksum did not match.
    #[error(transparent)]
    Codec(#[from] codec::CodecError),
    /// A serialized key could not be decoded.
    #[error(transparent)]
    Key(#[from] keys::KeyError),
    /// The trailer's `version` field was not the one this reader understands.
    #[error("unsupported cell-store trailer version {0} (expected {1})")]
    UnsupportedVersion(u8, u8),
    /// The file is smaller than a bare trailer; it cannot be a valid cell store.
    #[error("file too small to contain a cell-store trailer ({0} bytes)")]
    FileTooSmall(u64),
    /// The trailer's magic bytes did not match.
    #[error("bad cell-store trailer magic")]
    BadTrailerMagic,
    /// The trailer's checksum did not match its contents.
    #[error("cell-store trailer checksum mismatch")]
    BadTrailerChecksum,
    /// `add` was called with a key that sorts before the previously added key.
    #[error("cell-store writer received an out-of-order key")]
    OutOfOrderKey,
    /// `finalize` was called on a writer that received zero entries.
    #[error("refusing to finalize an empty cell store")]
    EmptyCellStore,
}

#[cfg(test)]
mod tests;
