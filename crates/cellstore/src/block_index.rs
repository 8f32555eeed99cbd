//! The fixed and variable index blocks that locate a data block by key.
//!
//! The variable index block holds the first [`SerializedKey`] of every data
//! block, prefix-compressed in ascending order. The fixed index block holds
//! the matching array of byte offsets, either as `u32` (small files) or `u64`
//! (files over 4 GiB, [`crate::trailer::FLAG_INDEX_64BIT`] set). Loaded once
//! at open time into an in-memory [`std::collections::BTreeMap`], mirroring
//! the teacher's reader keeping its whole index resident rather than paging
//! it block-by-block.

use keys::{PrefixKeyCompressor, PrefixKeyDecompressor, SerializedKey};
use std::collections::BTreeMap;

use crate::CellStoreError;

/// In-memory index mapping a data block's first key to its byte offset.
///
/// Lookup is `upper_bound(key) - 1`: the last entry whose first key is `<=
/// key`, i.e. the one data block that could contain `key`.
#[derive(Debug, Clone)]
pub enum CellStoreBlockIndex {
    /// Offsets fit in 32 bits.
    Fixed32(BTreeMap<SerializedKey, u32>),
    /// Offsets need the full 64 bits.
    Fixed64(BTreeMap<SerializedKey, u64>),
}

impl CellStoreBlockIndex {
    /// Builds an empty 32-bit index.
    #[must_use]
    pub fn new32() -> Self {
        CellStoreBlockIndex::Fixed32(BTreeMap::new())
    }

    /// Builds an empty 64-bit index.
    #[must_use]
    pub fn new64() -> Self {
        CellStoreBlockIndex::Fixed64(BTreeMap::new())
    }

    /// `true` if offsets are stored as 64-bit values.
    #[must_use]
    pub fn is_64bit(&self) -> bool {
        matches!(self, CellStoreBlockIndex::Fixed64(_))
    }

    /// Number of data blocks indexed.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            CellStoreBlockIndex::Fixed32(m) => m.len(),
            CellStoreBlockIndex::Fixed64(m) => m.len(),
        }
    }

    /// `true` if no blocks have been indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records a data block's first key and byte offset.
    ///
    /// `first_key` must sort after every key already inserted; the writer is
    /// the only caller and always inserts in ascending order.
    pub fn insert(&mut self, first_key: SerializedKey, offset: u64) {
        match self {
            CellStoreBlockIndex::Fixed32(m) => {
                m.insert(first_key, offset as u32);
            }
            CellStoreBlockIndex::Fixed64(m) => {
                m.insert(first_key, offset);
            }
        }
    }

    /// Returns the byte offset of the data block that could contain `key`,
    /// or `None` if `key` sorts before every indexed block's first key.
    #[must_use]
    pub fn locate(&self, key: &SerializedKey) -> Option<u64> {
        match self {
            CellStoreBlockIndex::Fixed32(m) => {
                m.range(..=key.clone()).next_back().map(|(_, &off)| off as u64)
            }
            CellStoreBlockIndex::Fixed64(m) => {
                m.range(..=key.clone()).next_back().map(|(_, &off)| off)
            }
        }
    }

    /// Returns the first key of every indexed data block, in ascending order.
    pub fn first_keys(&self) -> Vec<&SerializedKey> {
        match self {
            CellStoreBlockIndex::Fixed32(m) => m.keys().collect(),
            CellStoreBlockIndex::Fixed64(m) => m.keys().collect(),
        }
    }

    /// Encodes the variable index block: prefix-compressed first keys in
    /// ascending order, one after another with no separate length table.
    #[must_use]
    pub fn encode_var_block(&self) -> Vec<u8> {
        let mut comp = PrefixKeyCompressor::new();
        let mut out = Vec::new();
        for key in self.first_keys() {
            comp.encode(key, &mut out);
        }
        out
    }

    /// Encodes the fixed index block: the offset array in the same order as
    /// the variable block's keys, `u32` or `u64` little-endian per entry.
    #[must_use]
    pub fn encode_fixed_block(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            CellStoreBlockIndex::Fixed32(m) => {
                for &off in m.values() {
                    out.extend_from_slice(&off.to_le_bytes());
                }
            }
            CellStoreBlockIndex::Fixed64(m) => {
                for &off in m.values() {
                    out.extend_from_slice(&off.to_le_bytes());
                }
            }
        }
        out
    }

    /// Decodes a `(variable block, fixed block)` pair back into an index.
    pub fn decode(var_block: &[u8], fixed_block: &[u8], is_64bit: bool) -> Result<Self, CellStoreError> {
        let mut decomp = PrefixKeyDecompressor::new();
        let mut keys = Vec::new();
        let mut pos = 0usize;
        while pos < var_block.len() {
            let (key, consumed) = decomp
                .decode(&var_block[pos..])
                .map_err(|e| CellStoreError::Key(keys::KeyError::BadKey(e.to_string())))?;
            keys.push(key);
            pos += consumed;
        }

        let entry_size = if is_64bit { 8 } else { 4 };
        if fixed_block.len() != keys.len() * entry_size {
            return Err(CellStoreError::Key(keys::KeyError::BadKey(
                "fixed index block length does not match variable index key count".into(),
            )));
        }

        if is_64bit {
            let mut map = BTreeMap::new();
            for (i, key) in keys.into_iter().enumerate() {
                let off = u64::from_le_bytes(fixed_block[i * 8..i * 8 + 8].try_into().unwrap());
                map.insert(key, off);
            }
            Ok(CellStoreBlockIndex::Fixed64(map))
        } else {
            let mut map = BTreeMap::new();
            for (i, key) in keys.into_iter().enumerate() {
                let off = u32::from_le_bytes(fixed_block[i * 4..i * 4 + 4].try_into().unwrap());
                map.insert(key, off);
            }
            Ok(CellStoreBlockIndex::Fixed32(map))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keys::{Flag, Key};

    fn sk(row: &str, rev: i64) -> SerializedKey {
        Key::new(row.as_bytes(), 1, b"q".as_slice(), Flag::Insert, 100, rev).serialize()
    }

    #[test]
    fn locate_returns_last_block_at_or_before_key() {
        let mut idx = CellStoreBlockIndex::new32();
        idx.insert(sk("a", 1), 0);
        idx.insert(sk("m", 1), 1000);
        idx.insert(sk("z", 1), 2000);

        assert_eq!(idx.locate(&sk("a", 1)), Some(0));
        assert_eq!(idx.locate(&sk("b", 1)), Some(0));
        assert_eq!(idx.locate(&sk("n", 1)), Some(1000));
        assert_eq!(idx.locate(&sk("zz", 1)), Some(2000));
    }

    #[test]
    fn locate_before_first_key_returns_none() {
        let mut idx = CellStoreBlockIndex::new32();
        idx.insert(sk("m", 1), 500);
        assert_eq!(idx.locate(&sk("a", 1)), None);
    }

    #[test]
    fn encode_then_decode_roundtrips_32bit() {
        let mut idx = CellStoreBlockIndex::new32();
        for i in 0..50u64 {
            idx.insert(sk(&format!("row{:05}", i), 1), i * 4096);
        }
        let var = idx.encode_var_block();
        let fixed = idx.encode_fixed_block();
        let decoded = CellStoreBlockIndex::decode(&var, &fixed, false).unwrap();
        assert_eq!(decoded.len(), 50);
        assert_eq!(decoded.locate(&sk("row00010", 1)), Some(10 * 4096));
    }

    #[test]
    fn encode_then_decode_roundtrips_64bit() {
        let mut idx = CellStoreBlockIndex::new64();
        idx.insert(sk("a", 1), 1 << 40);
        idx.insert(sk("b", 1), (1 << 40) + 4096);
        let var = idx.encode_var_block();
        let fixed = idx.encode_fixed_block();
        let decoded = CellStoreBlockIndex::decode(&var, &fixed, true).unwrap();
        assert!(decoded.is_64bit());
        assert_eq!(decoded.locate(&sk("b", 1)), Some((1u64 << 40) + 4096));
    }

    #[test]
    fn empty_index_is_empty() {
        let idx = CellStoreBlockIndex::new32();
        assert!(idx.is_empty());
        assert_eq!(idx.locate(&sk("x", 1)), None);
    }

    #[test]
    fn mismatched_fixed_block_length_is_rejected() {
        let result = CellStoreBlockIndex::decode(&[], &[0u8; 3], false);
        assert!(result.is_err());
    }
}
