//! Point lookups and range scans over a single cell store file.
//!
//! Grounded on the teacher's `SSTableReader`: index and bloom filter are
//! loaded into memory once at `open`, and a persistent file handle is kept
//! open (behind a `Mutex`) so repeated lookups cost one seek + read each,
//! not an open/close cycle. What's new is the two-level lookup — bloom,
//! then block index, then an in-block linear scan after decompressing the
//! one candidate block — since data now lives in compressed blocks instead
//! of one flat section.

use codec::{BlockHeader, BlockType};
use keys::SerializedKey;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bloom::{row_column_family_token, BloomFilter, BloomFilterMode};

use crate::block_index::CellStoreBlockIndex;
use crate::fs::{CellStoreFs, LocalCellStoreFs, SeekRead};
use crate::record::decode_record;
use crate::trailer::{CellStoreTrailer, TRAILER_LEN};
use crate::CellStoreError;

/// Reads a single cell store file.
pub struct CellStoreReader {
    #[allow(dead_code)]
    path: PathBuf,
    trailer: CellStoreTrailer,
    index: CellStoreBlockIndex,
    bloom: Option<BloomFilter>,
    file: Mutex<BufReader<Box<dyn SeekRead>>>,
}

/// Restricts a scan to a sub-range of rows and/or specific column families.
///
/// An empty `column_families` means "all column families".
#[derive(Debug, Clone, Default)]
pub struct ScanContext {
    /// Inclusive lower bound on the row, or `None` for unbounded.
    pub start_row: Option<Vec<u8>>,
    /// Exclusive upper bound on the row, or `None` for unbounded.
    pub end_row: Option<Vec<u8>>,
    /// Column families to include; empty means all.
    pub column_families: Vec<u8>,
}

impl ScanContext {
    /// A scan context matching every row and column family.
    #[must_use]
    pub fn unbounded() -> Self {
        ScanContext::default()
    }

    fn row_in_range(&self, row: &[u8]) -> bool {
        if let Some(ref start) = self.start_row {
            if row < start.as_slice() {
                return false;
            }
        }
        if let Some(ref end) = self.end_row {
            if row >= end.as_slice() {
                return false;
            }
        }
        true
    }

    fn column_family_matches(&self, cfid: u8) -> bool {
        self.column_families.is_empty() || self.column_families.contains(&cfid)
    }

    /// Returns `true` when the bloom filter, if present, would let this
    /// context's rows through.
    fn may_contain(&self, bloom: &BloomFilter, mode: BloomFilterMode) -> bool {
        let Some(ref start) = self.start_row else {
            return true; // unbounded scan: no useful row to test against
        };
        match mode {
            BloomFilterMode::Disabled => true,
            BloomFilterMode::Rows => bloom.may_contain(start),
            BloomFilterMode::RowsCols => {
                if self.column_families.is_empty() {
                    bloom.may_contain(start)
                } else {
                    self.column_families
                        .iter()
                        .any(|&cfid| bloom.may_contain(&row_column_family_token(start, cfid)))
                }
            }
        }
    }
}

impl CellStoreReader {
    /// Opens a cell store file on the local disk, loading its trailer,
    /// index, and bloom filter. A convenience wrapper around
    /// [`Self::open_with_fs`] for tests and callers with no
    /// `rangestore::StorageContext` to hand.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CellStoreError> {
        Self::open_with_fs(Arc::new(LocalCellStoreFs), path)
    }

    /// Opens a cell store file via `fs` rather than reaching for `std::fs`
    /// directly, loading its trailer, index, and bloom filter.
    pub fn open_with_fs<P: AsRef<Path>>(fs: Arc<dyn CellStoreFs>, path: P) -> Result<Self, CellStoreError> {
        let path_buf = path.as_ref().to_path_buf();
        let mut f = fs.open_read_seek(&path_buf)?;
        let filesize = f.seek(SeekFrom::End(0))?;

        if filesize < TRAILER_LEN as u64 {
            return Err(CellStoreError::FileTooSmall(filesize));
        }

        let mut trailer_buf = [0u8; TRAILER_LEN];
        f.seek(SeekFrom::Start(filesize - TRAILER_LEN as u64))?;
        f.read_exact(&mut trailer_buf)?;
        let trailer = CellStoreTrailer::read(&trailer_buf)?;

        let bloom_mode = BloomFilterMode::from_type_code(trailer.bloom_mode).ok_or_else(|| {
            CellStoreError::Key(keys::KeyError::BadKey("unknown bloom filter mode".into()))
        })?;

        let bloom = if trailer.filter_length > 0 {
            f.seek(SeekFrom::Start(trailer.filter_offset))?;
            Some(BloomFilter::read_from(&mut f)?)
        } else {
            None
        };

        f.seek(SeekFrom::Start(trailer.var_index_offset))?;
        let mut var_buf = vec![0u8; (trailer.fix_index_offset - trailer.var_index_offset) as usize];
        f.read_exact(&mut var_buf)?;
        let (var_block, _) = BlockHeader::read_block(&var_buf)?;

        f.seek(SeekFrom::Start(trailer.fix_index_offset))?;
        let mut fix_buf = vec![0u8; (trailer.total_length - trailer.fix_index_offset) as usize];
        f.read_exact(&mut fix_buf)?;
        let (fixed_block, _) = BlockHeader::read_block(&fix_buf)?;

        let index = CellStoreBlockIndex::decode(&var_block, &fixed_block, trailer.index_is_64bit())?;

        f.seek(SeekFrom::Start(0))?;

        Ok(CellStoreReader {
            path: path_buf,
            trailer,
            index,
            bloom,
            file: Mutex::new(BufReader::new(f)),
        })
    }

    /// Returns the trailer read at open time.
    #[must_use]
    pub fn trailer(&self) -> &CellStoreTrailer {
        &self.trailer
    }

    /// Number of data blocks in this file.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    fn load_block(&self, offset: u64) -> Result<Vec<u8>, CellStoreError> {
        let mut f = self.file.lock().unwrap_or_else(|e| e.into_inner());
        f.seek(SeekFrom::Start(offset))?;

        let mut header_buf = vec![0u8; codec::HEADER_LEN as usize];
        f.read_exact(&mut header_buf)?;
        let header = BlockHeader::read(&header_buf)?;

        let mut rest = vec![0u8; header.compressed_len as usize];
        f.read_exact(&mut rest)?;

        let mut framed = header_buf;
        framed.extend_from_slice(&rest);
        let (decoded, _) = BlockHeader::read_block(&framed)?;
        Ok(decoded)
    }

    /// Point lookup for the exact serialized key. Returns the value if present.
    pub fn get(&self, key: &SerializedKey) -> Result<Option<Vec<u8>>, CellStoreError> {
        if let Some(ref bloom) = self.bloom {
            let mode = BloomFilterMode::from_type_code(self.trailer.bloom_mode).unwrap_or(BloomFilterMode::Disabled);
            let row = key.row()?;
            let hit = match mode {
                BloomFilterMode::Disabled => true,
                BloomFilterMode::Rows => bloom.may_contain(row),
                BloomFilterMode::RowsCols => {
                    let cfid = key.column_family_code()?;
                    bloom.may_contain(row) && bloom.may_contain(&row_column_family_token(row, cfid))
                }
            };
            if !hit {
                return Ok(None);
            }
        }

        let offset = match self.index.locate(key) {
            Some(o) => o,
            None => return Ok(None),
        };

        let block = self.load_block(offset)?;
        let mut pos = 0usize;
        while pos < block.len() {
            let (k, v, consumed) = decode_record(&block[pos..]).map_err(CellStoreError::Key)?;
            if &k == key {
                return Ok(Some(v));
            }
            pos += consumed;
        }
        Ok(None)
    }

    /// Scans every cell matching `ctx`, calling `visit(key, value)` in ascending order.
    ///
    /// The bloom filter (if present) is consulted once against `ctx.start_row`
    /// before any block is touched; a negative result skips the whole file.
    pub fn scan<F>(&self, ctx: &ScanContext, mut visit: F) -> Result<(), CellStoreError>
    where
        F: FnMut(&SerializedKey, &[u8]),
    {
        if let Some(ref bloom) = self.bloom {
            let mode = BloomFilterMode::from_type_code(self.trailer.bloom_mode).unwrap_or(BloomFilterMode::Disabled);
            if !ctx.may_contain(bloom, mode) {
                return Ok(());
            }
        }

        let start_offset: u64 = match &ctx.start_row {
            Some(row) => {
                let probe = SerializedKey::from_raw({
                    // A minimal key with this row and a control byte of 0 sorts at or
                    // before any real key with the same row, making it a safe lower probe.
                    let mut v = Vec::new();
                    keys::serialization::write_vint(&mut v, (row.len() + 2) as u64);
                    v.push(0);
                    v.extend_from_slice(row);
                    v.push(0);
                    v
                });
                self.index.locate(&probe).unwrap_or(0)
            }
            None => 0,
        };

        let offsets: Vec<u64> = {
            let mut offs: Vec<u64> = self
                .index
                .first_keys()
                .iter()
                .filter_map(|k| self.index.locate(k))
                .collect();
            offs.sort_unstable();
            offs.dedup();
            offs.into_iter().filter(|&o| o >= start_offset).collect()
        };

        'blocks: for offset in offsets {
            let block = self.load_block(offset)?;
            let mut pos = 0usize;
            while pos < block.len() {
                let (k, v, consumed) = decode_record(&block[pos..]).map_err(CellStoreError::Key)?;
                pos += consumed;

                let row = k.row()?;
                if let Some(ref end) = ctx.end_row {
                    if row >= end.as_slice() {
                        break 'blocks;
                    }
                }
                if !ctx.row_in_range(row) {
                    continue;
                }
                let cfid = k.column_family_code()?;
                if !ctx.column_family_matches(cfid) {
                    continue;
                }
                visit(&k, &v);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{CellStoreWriter, CellStoreWriterOptions};
    use keys::{Flag, Key};
    use tempfile::tempdir;

    fn make_store(path: &Path, rows: &[&str]) -> CellStoreTrailer {
        let mut w = CellStoreWriter::create(
            path,
            CellStoreWriterOptions {
                blocksize: 64,
                expected_items: rows.len(),
                ..Default::default()
            },
        )
        .unwrap();
        for (i, row) in rows.iter().enumerate() {
            let k = Key::new(row.as_bytes(), 1, b"q".as_slice(), Flag::Insert, 100, i as i64);
            w.add(&k.serialize(), b"v").unwrap();
        }
        w.finalize(1, 1).unwrap()
    }

    #[test]
    fn missing_key_returns_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.cellstore");
        make_store(&path, &["a", "b", "c"]);

        let reader = CellStoreReader::open(&path).unwrap();
        let missing = Key::new(b"zzz".as_slice(), 1, b"q".as_slice(), Flag::Insert, 100, 0).serialize();
        assert_eq!(reader.get(&missing).unwrap(), None);
    }

    #[test]
    fn scan_respects_row_bounds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.cellstore");
        let rows: Vec<String> = (0..30).map(|i| format!("row{:05}", i)).collect();
        let row_refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        make_store(&path, &row_refs);

        let reader = CellStoreReader::open(&path).unwrap();
        let ctx = ScanContext {
            start_row: Some(b"row00010".to_vec()),
            end_row: Some(b"row00015".to_vec()),
            column_families: vec![],
        };
        let mut seen = Vec::new();
        reader.scan(&ctx, |k, _v| seen.push(k.row().unwrap().to_vec())).unwrap();
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[0], b"row00010");
    }

    #[test]
    fn scan_filters_by_column_family() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.cellstore");

        let mut w = CellStoreWriter::create(&path, CellStoreWriterOptions {
            expected_items: 4,
            ..Default::default()
        })
        .unwrap();
        for (i, cfid) in [1u8, 2, 1, 2].iter().enumerate() {
            let k = Key::new(b"row".as_slice(), *cfid, format!("q{i}").as_bytes(), Flag::Insert, 100, i as i64);
            w.add(&k.serialize(), b"v").unwrap();
        }
        w.finalize(1, 1).unwrap();

        let reader = CellStoreReader::open(&path).unwrap();
        let ctx = ScanContext {
            start_row: None,
            end_row: None,
            column_families: vec![2],
        };
        let mut count = 0;
        reader.scan(&ctx, |_k, _v| count += 1).unwrap();
        assert_eq!(count, 2);
    }
}
