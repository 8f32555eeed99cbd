//! The fixed 192-byte trailer at the end of every cell-store file.
//!
//! Unlike the teacher's version-tagged `Footer` enum (v1/v2/v3, three
//! different sizes auto-detected by magic), a cell store has exactly one
//! trailer layout. `version` is still recorded and still checked on read —
//! a reader rejects any trailer whose version isn't [`TRAILER_VERSION`] —
//! but there is only one version to detect, so the auto-detection dance
//! collapses to a single equality check.

use crate::CellStoreError;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use codec::fletcher32;

/// Total on-disk size of a trailer, in bytes. Grew from the original 128
/// bytes once every trailer field the format calls for (table identity,
/// bloom-filter sizing history, expiration bookkeeping) was packed in at
/// natural Rust widths rather than the original's 8-byte-aligned ones.
pub const TRAILER_LEN: usize = 192;
/// The only trailer version this implementation writes or accepts.
pub const TRAILER_VERSION: u8 = 4;
/// 10-byte magic identifying a cell-store trailer.
pub const TRAILER_MAGIC: &[u8; 10] = b"CellStore-";

/// Set when the fixed index block uses 64-bit offsets (large files).
pub const FLAG_INDEX_64BIT: u32 = 1 << 0;
/// Set when this cell store was produced by a range split.
pub const FLAG_SPLIT: u32 = 1 << 1;
/// Set when this cell store is the output of a major compaction (all
/// sources considered, tombstones dropped where safe).
pub const FLAG_MAJOR_COMPACTION: u32 = 1 << 2;

/// Data records carry full, uncompressed keys (see `record.rs`). The only
/// scheme this implementation ever writes.
pub const KEY_COMPRESSION_IDENTITY: u8 = 0;
/// Reserved for a future prefix-compressed record format; no writer emits
/// this yet, but a reader must recognize the code rather than reject it.
pub const KEY_COMPRESSION_PREFIX: u8 = 1;

/// The fixed-layout trailer recorded at the end of every cell-store file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellStoreTrailer {
    /// Always [`TRAILER_VERSION`] for a trailer this implementation writes.
    pub version: u8,
    /// Bitwise OR of the `FLAG_*` constants.
    pub flags: u32,
    /// The [`codec::CodecKind`] type code used for every data block in this file.
    pub compression_type: u16,
    /// The [`bloom::BloomFilterMode`] type code used to build the bloom filter.
    pub bloom_mode: u8,
    /// Target uncompressed size, in bytes, of each data block.
    pub blocksize: u32,
    /// Byte offset of the fixed index block.
    pub fix_index_offset: u64,
    /// Byte offset of the variable index block.
    pub var_index_offset: u64,
    /// Byte offset of the bloom filter block. `0` if there is no bloom filter.
    pub filter_offset: u64,
    /// Length in bytes of the (framed) bloom filter block. `0` if absent.
    pub filter_length: u32,
    /// Total number of cells (including tombstones) stored in this file.
    pub key_count: u64,
    /// Total size of the file, trailer excluded.
    pub total_length: u64,
    /// The highest revision number of any cell in this file.
    pub revision: i64,
    /// The lowest timestamp of any cell in this file.
    pub timestamp_min: i64,
    /// The highest timestamp of any cell in this file.
    pub timestamp_max: i64,
    /// The cardinality the bloom filter was sized for at construction time
    /// (the approximator's estimate, or the exact count if never estimated).
    pub filter_items_estimate: u64,
    /// The number of items actually inserted into the bloom filter.
    pub filter_items_actual: u64,
    /// Number of hash functions the bloom filter uses per inserted item.
    pub bloom_filter_hash_count: u32,
    /// Achieved `compressed_total / uncompressed_total` ratio, as `f32` bits.
    pub compression_ratio: u32,
    /// One of `KEY_COMPRESSION_*`; always [`KEY_COMPRESSION_IDENTITY`] here.
    pub key_compression_scheme: u8,
    /// Latest `timestamp + ttl` across every TTL-bearing cell in this file.
    /// `0` if no cell carries a TTL.
    pub expiration_time: i64,
    /// Total byte count of cells eligible to expire (carry a TTL).
    pub expirable_data: u64,
    /// Logical table id this cell store belongs to.
    pub table_id: u64,
    /// Schema generation in effect when this file was written.
    pub table_generation: u64,
    /// Wall-clock time (nanoseconds since epoch) this file was finalized.
    pub create_time: i64,
}

impl CellStoreTrailer {
    /// Returns `true` if [`FLAG_INDEX_64BIT`] is set.
    #[must_use]
    pub fn index_is_64bit(&self) -> bool {
        self.flags & FLAG_INDEX_64BIT != 0
    }

    /// Serializes the trailer to exactly [`TRAILER_LEN`] bytes.
    pub fn write(&self) -> [u8; TRAILER_LEN] {
        let mut buf = [0u8; TRAILER_LEN];
        let mut w = &mut buf[..];

        LittleEndian::write_u64(&mut w[0..8], self.fix_index_offset);
        LittleEndian::write_u64(&mut w[8..16], self.var_index_offset);
        LittleEndian::write_u64(&mut w[16..24], self.filter_offset);
        LittleEndian::write_u32(&mut w[24..28], self.filter_length);
        LittleEndian::write_u64(&mut w[28..36], self.key_count);
        LittleEndian::write_u64(&mut w[36..44], self.total_length);
        BigEndian::write_i64(&mut w[44..52], self.revision);
        BigEndian::write_i64(&mut w[52..60], self.timestamp_min);
        BigEndian::write_i64(&mut w[60..68], self.timestamp_max);
        LittleEndian::write_u32(&mut w[68..72], self.flags);
        LittleEndian::write_u16(&mut w[72..74], self.compression_type);
        w[74] = self.bloom_mode;
        w[75] = self.version;
        LittleEndian::write_u32(&mut w[76..80], self.blocksize);

        LittleEndian::write_u64(&mut w[94..102], self.filter_items_estimate);
        LittleEndian::write_u64(&mut w[102..110], self.filter_items_actual);
        LittleEndian::write_u32(&mut w[110..114], self.bloom_filter_hash_count);
        LittleEndian::write_u32(&mut w[114..118], self.compression_ratio);
        w[118] = self.key_compression_scheme;
        BigEndian::write_i64(&mut w[119..127], self.expiration_time);
        LittleEndian::write_u64(&mut w[127..135], self.expirable_data);
        LittleEndian::write_u64(&mut w[135..143], self.table_id);
        LittleEndian::write_u64(&mut w[143..151], self.table_generation);
        BigEndian::write_i64(&mut w[151..159], self.create_time);

        w[80..90].copy_from_slice(TRAILER_MAGIC);

        let checksum = fletcher32(&w[0..90]);
        LittleEndian::write_u32(&mut w[90..94], checksum);
        // w[159..192] remains reserved, zeroed.

        buf
    }

    /// Parses a trailer from its exact [`TRAILER_LEN`]-byte on-disk form.
    pub fn read(buf: &[u8; TRAILER_LEN]) -> Result<Self, CellStoreError> {
        if &buf[80..90] != TRAILER_MAGIC {
            return Err(CellStoreError::BadTrailerMagic);
        }
        let checksum = LittleEndian::read_u32(&buf[90..94]);
        if fletcher32(&buf[0..90]) != checksum {
            return Err(CellStoreError::BadTrailerChecksum);
        }

        let version = buf[75];
        if version != TRAILER_VERSION {
            return Err(CellStoreError::UnsupportedVersion(version, TRAILER_VERSION));
        }

        Ok(CellStoreTrailer {
            version,
            flags: LittleEndian::read_u32(&buf[68..72]),
            compression_type: LittleEndian::read_u16(&buf[72..74]),
            bloom_mode: buf[74],
            blocksize: LittleEndian::read_u32(&buf[76..80]),
            fix_index_offset: LittleEndian::read_u64(&buf[0..8]),
            var_index_offset: LittleEndian::read_u64(&buf[8..16]),
            filter_offset: LittleEndian::read_u64(&buf[16..24]),
            filter_length: LittleEndian::read_u32(&buf[24..28]),
            key_count: LittleEndian::read_u64(&buf[28..36]),
            total_length: LittleEndian::read_u64(&buf[36..44]),
            revision: BigEndian::read_i64(&buf[44..52]),
            timestamp_min: BigEndian::read_i64(&buf[52..60]),
            timestamp_max: BigEndian::read_i64(&buf[60..68]),
            filter_items_estimate: LittleEndian::read_u64(&buf[94..102]),
            filter_items_actual: LittleEndian::read_u64(&buf[102..110]),
            bloom_filter_hash_count: LittleEndian::read_u32(&buf[110..114]),
            compression_ratio: LittleEndian::read_u32(&buf[114..118]),
            key_compression_scheme: buf[118],
            expiration_time: BigEndian::read_i64(&buf[119..127]),
            expirable_data: LittleEndian::read_u64(&buf[127..135]),
            table_id: LittleEndian::read_u64(&buf[135..143]),
            table_generation: LittleEndian::read_u64(&buf[143..151]),
            create_time: BigEndian::read_i64(&buf[151..159]),
        })
    }
}
