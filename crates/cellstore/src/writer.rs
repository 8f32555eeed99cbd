//! Builds a cell store file from a stream of sorted `(key, value)` pairs.
//!
//! Mirrors the teacher's `SSTableWriter`: write to a temp file next to the
//! final path, fsync, atomically rename, then fsync the parent directory.
//! What changed is the body: data is split into dynamically-sized compressed
//! blocks (not one flat section), each indexed by its first key, and the
//! bloom filter is built from row (and optionally row+column-family) tokens
//! rather than whole keys.
//!
//! Block sizing targets a constant *compressed* size rather than a constant
//! uncompressed one: after each flush the writer rescales its uncompressed
//! trigger to `blocksize / R`, where `R` is the running
//! `compressed_total / uncompressed_total` ratio across every block flushed
//! so far. Highly compressible data gets bigger uncompressed blocks (since
//! each compresses down proportionally more); incompressible data gets
//! smaller ones — either way, on-disk block size and index entry density
//! stay roughly constant.

use codec::{BlockHeader, BlockType, CodecKind, HEADER_LEN};
use keys::SerializedKey;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bloom::{row_column_family_token, BloomFilter, BloomFilterMode};

use crate::block_index::CellStoreBlockIndex;
use crate::fs::{CellStoreFs, LocalCellStoreFs, SeekWrite};
use crate::record::encode_record;
use crate::trailer::{
    CellStoreTrailer, FLAG_INDEX_64BIT, FLAG_MAJOR_COMPACTION, FLAG_SPLIT, KEY_COMPRESSION_IDENTITY, TRAILER_VERSION,
};
use crate::CellStoreError;

const DEFAULT_BLOCKSIZE: u32 = 64 * 1024;
const DEFAULT_BLOOM_FPR: f64 = 0.01;

/// Configuration for a new cell store.
#[derive(Debug, Clone, Copy)]
pub struct CellStoreWriterOptions {
    /// Target *compressed* size of each data block. The writer starts by
    /// triggering a flush every `blocksize` uncompressed bytes, then
    /// rescales that trigger by the running compression ratio after each
    /// flush so actual on-disk block sizes converge on this value.
    pub blocksize: u32,
    /// Compression algorithm applied to every block.
    pub codec: CodecKind,
    /// Which tokens to insert into the bloom filter, if any.
    pub bloom_mode: BloomFilterMode,
    /// Expected number of entries, used to size the bloom filter up front.
    pub expected_items: usize,
    /// Use 64-bit block offsets in the fixed index (set for files that may exceed 4 GiB).
    pub index_64bit: bool,
    /// Set [`crate::trailer::FLAG_SPLIT`] in the written trailer.
    pub is_split_output: bool,
    /// Set [`crate::trailer::FLAG_MAJOR_COMPACTION`] in the written trailer.
    pub is_major_compaction: bool,
}

impl Default for CellStoreWriterOptions {
    fn default() -> Self {
        CellStoreWriterOptions {
            blocksize: DEFAULT_BLOCKSIZE,
            codec: CodecKind::Zlib,
            bloom_mode: BloomFilterMode::Rows,
            expected_items: 1,
            index_64bit: false,
            is_split_output: false,
            is_major_compaction: false,
        }
    }
}

/// Incrementally builds a cell store file, one sorted `(key, value)` pair at a time.
pub struct CellStoreWriter {
    fs: Arc<dyn CellStoreFs>,
    path: PathBuf,
    tmp_path: PathBuf,
    file: BufWriter<Box<dyn SeekWrite>>,

    opts: CellStoreWriterOptions,
    block_index: CellStoreBlockIndex,
    bloom: Option<BloomFilter>,

    current_block: Vec<u8>,
    current_block_first_key: Option<SerializedKey>,
    last_key: Option<SerializedKey>,

    /// Current uncompressed-bytes-per-block trigger, rescaled after each
    /// flush to track the running compression ratio. Starts at `opts.blocksize`.
    target_blocksize: u32,
    compressed_total: u64,
    uncompressed_total: u64,

    key_count: u64,
    revision_max: i64,
    timestamp_min: i64,
    timestamp_max: i64,
}

impl CellStoreWriter {
    /// Creates a new cell store writer for `path` on the local disk,
    /// truncating any existing temp file. A convenience wrapper around
    /// [`Self::create_with_fs`] for tests and callers with no
    /// `rangestore::StorageContext` to hand.
    pub fn create<P: AsRef<Path>>(path: P, opts: CellStoreWriterOptions) -> Result<Self, CellStoreError> {
        Self::create_with_fs(Arc::new(LocalCellStoreFs), path, opts)
    }

    /// Creates a new cell store writer for `path`, truncating any existing
    /// temp file, via `fs` rather than reaching for `std::fs` directly — the
    /// same seam `rangestore::AccessGroup` threads its `StorageContext`
    /// through for every other piece of storage I/O.
    pub fn create_with_fs<P: AsRef<Path>>(
        fs: Arc<dyn CellStoreFs>,
        path: P,
        opts: CellStoreWriterOptions,
    ) -> Result<Self, CellStoreError> {
        let path = path.as_ref().to_path_buf();
        let tmp_path = path.with_extension("cellstore.tmp");
        let raw_file = fs.create_write_seek(&tmp_path)?;

        let bloom = match opts.bloom_mode {
            BloomFilterMode::Disabled => None,
            _ => Some(BloomFilter::new(opts.expected_items.max(1), DEFAULT_BLOOM_FPR)),
        };

        let block_index = if opts.index_64bit {
            CellStoreBlockIndex::new64()
        } else {
            CellStoreBlockIndex::new32()
        };

        Ok(CellStoreWriter {
            fs,
            path,
            tmp_path,
            file: BufWriter::new(raw_file),
            opts,
            block_index,
            bloom,
            current_block: Vec::new(),
            current_block_first_key: None,
            last_key: None,
            target_blocksize: opts.blocksize,
            compressed_total: 0,
            uncompressed_total: 0,
            key_count: 0,
            revision_max: i64::MIN,
            timestamp_min: i64::MAX,
            timestamp_max: i64::MIN,
        })
    }

    /// Appends one cell. `key` must sort strictly after every previously
    /// added key.
    pub fn add(&mut self, key: &SerializedKey, value: &[u8]) -> Result<(), CellStoreError> {
        if let Some(ref last) = self.last_key {
            if key <= last {
                return Err(CellStoreError::OutOfOrderKey);
            }
        }

        if let Some(ref mut bloom) = self.bloom {
            match self.opts.bloom_mode {
                BloomFilterMode::Disabled => {}
                BloomFilterMode::Rows => {
                    bloom.insert(key.row()?);
                }
                BloomFilterMode::RowsCols => {
                    let row = key.row()?;
                    bloom.insert(row);
                    let cfid = key.column_family_code()?;
                    bloom.insert(&row_column_family_token(row, cfid));
                }
            }
        }

        if self.current_block_first_key.is_none() {
            self.current_block_first_key = Some(key.clone());
        }
        encode_record(key, value, &mut self.current_block);

        self.key_count += 1;
        self.last_key = Some(key.clone());

        if self.current_block.len() as u32 >= self.target_blocksize {
            self.flush_block()?;
        }

        Ok(())
    }

    /// Records a cell's timestamp/revision into the running trailer statistics.
    /// Call once per `add`, after decoding the corresponding [`keys::Key`].
    pub fn observe_stats(&mut self, timestamp: i64, revision: i64) {
        self.revision_max = self.revision_max.max(revision);
        self.timestamp_min = self.timestamp_min.min(timestamp);
        self.timestamp_max = self.timestamp_max.max(timestamp);
    }

    fn flush_block(&mut self) -> Result<(), CellStoreError> {
        if self.current_block.is_empty() {
            return Ok(());
        }
        let offset = self.file.stream_position()?;
        let mut framed = Vec::new();
        BlockHeader::write_block(BlockType::Data, self.opts.codec, &self.current_block, &mut framed)?;
        self.file.write_all(&framed)?;

        self.uncompressed_total += self.current_block.len() as u64;
        self.compressed_total += (framed.len() - HEADER_LEN as usize) as u64;
        self.rescale_target_blocksize();

        let first_key = self
            .current_block_first_key
            .take()
            .expect("current_block is non-empty, so a first key was recorded");
        self.block_index.insert(first_key, offset);
        self.current_block.clear();
        Ok(())
    }

    /// Rescales `target_blocksize` to `blocksize / R`, where `R` is the
    /// running `compressed_total / uncompressed_total` ratio, so compressed
    /// block sizes stay near `opts.blocksize` regardless of how compressible
    /// the data turns out to be.
    fn rescale_target_blocksize(&mut self) {
        if self.uncompressed_total == 0 || self.compressed_total == 0 {
            return;
        }
        let ratio = self.compressed_total as f64 / self.uncompressed_total as f64;
        let target = (self.opts.blocksize as f64 / ratio).round();
        self.target_blocksize = target.clamp(1.0, u32::MAX as f64) as u32;
    }

    /// The running `compressed_total / uncompressed_total` ratio, for
    /// stamping into the trailer at [`Self::finalize`]. `0.0` if nothing has
    /// been flushed yet.
    fn compression_ratio(&self) -> f32 {
        if self.uncompressed_total == 0 {
            0.0
        } else {
            (self.compressed_total as f64 / self.uncompressed_total as f64) as f32
        }
    }

    /// Finalizes the cell store: flushes the last data block, writes the
    /// bloom filter, index blocks, and trailer, then atomically renames the
    /// temp file into place. `table_id`/`generation` identify the logical
    /// table and schema generation this file belongs to, stamped into the
    /// trailer so a reopened file can be validated against its owning range.
    pub fn finalize(mut self, table_id: u64, generation: u64) -> Result<CellStoreTrailer, CellStoreError> {
        self.flush_block()?;

        if self.block_index.is_empty() {
            drop(self.file);
            let _ = self.fs.remove(&self.tmp_path);
            return Err(CellStoreError::EmptyCellStore);
        }

        let data_end = self.file.stream_position()?;

        let filter_offset;
        let filter_length;
        let filter_items_estimate;
        let filter_items_actual;
        let bloom_filter_hash_count;
        if let Some(ref bloom) = self.bloom {
            filter_offset = self.file.stream_position()?;
            bloom.write_to(&mut self.file)?;
            filter_length = bloom.serialized_size() as u32;
            filter_items_estimate = self.opts.expected_items as u64;
            filter_items_actual = self.key_count;
            bloom_filter_hash_count = bloom.num_hashes();
        } else {
            filter_offset = 0;
            filter_length = 0;
            filter_items_estimate = 0;
            filter_items_actual = 0;
            bloom_filter_hash_count = 0;
        }

        let var_block = self.block_index.encode_var_block();
        let var_index_offset = self.file.stream_position()?;
        let mut framed_var = Vec::new();
        BlockHeader::write_block(BlockType::IdxVar, self.opts.codec, &var_block, &mut framed_var)?;
        self.file.write_all(&framed_var)?;

        let fixed_block = self.block_index.encode_fixed_block();
        let fix_index_offset = self.file.stream_position()?;
        let mut framed_fixed = Vec::new();
        BlockHeader::write_block(BlockType::IdxFix, self.opts.codec, &fixed_block, &mut framed_fixed)?;
        self.file.write_all(&framed_fixed)?;

        let total_length = self.file.stream_position()?;

        let mut flags = 0u32;
        if self.block_index.is_64bit() {
            flags |= FLAG_INDEX_64BIT;
        }
        if self.opts.is_split_output {
            flags |= FLAG_SPLIT;
        }
        if self.opts.is_major_compaction {
            flags |= FLAG_MAJOR_COMPACTION;
        }

        let create_time = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);

        let trailer = CellStoreTrailer {
            version: TRAILER_VERSION,
            flags,
            compression_type: self.opts.codec.type_code(),
            bloom_mode: self.opts.bloom_mode.type_code(),
            blocksize: self.opts.blocksize,
            fix_index_offset,
            var_index_offset,
            filter_offset,
            filter_length,
            key_count: self.key_count,
            total_length,
            revision: if self.key_count == 0 { 0 } else { self.revision_max },
            timestamp_min: if self.key_count == 0 { 0 } else { self.timestamp_min },
            timestamp_max: if self.key_count == 0 { 0 } else { self.timestamp_max },
            filter_items_estimate,
            filter_items_actual,
            bloom_filter_hash_count,
            compression_ratio: self.compression_ratio().to_bits(),
            key_compression_scheme: KEY_COMPRESSION_IDENTITY,
            expiration_time: 0,
            expirable_data: 0,
            table_id,
            table_generation: generation,
            create_time,
        };
        let _ = data_end;

        self.file.write_all(&trailer.write())?;
        self.file.flush()?;
        self.file.into_inner().map_err(|e| e.into_error())?.sync_all()?;

        self.fs.rename(&self.tmp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            let _ = self.fs.sync_dir(parent);
        }

        Ok(trailer)
    }
}
