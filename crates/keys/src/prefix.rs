//! Prefix-compressed serialized-key encoding.
//!
//! Each key is stored as `varint(shared_prefix_len) || unshared_suffix`, where
//! `shared_prefix_len` is measured against the immediately preceding key. A
//! decompressor therefore only needs a one-key lookback, not the whole block.

use crate::key::SerializedKey;
use crate::serialization::{read_vint, read_vstr, write_vint, write_vstr};
use thiserror::Error;

/// Errors produced while decoding a prefix-compressed key stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrefixError {
    /// The declared shared-prefix length exceeds the previous key's length.
    #[error("prefix-compressed key: shared_prefix_len {0} exceeds previous key length {1}")]
    SharedPrefixTooLong(usize, usize),
    /// Underlying buffer was malformed.
    #[error("prefix-compressed key: {0}")]
    Serialization(#[from] crate::serialization::SerializationError),
}

/// Encodes a run of ascending [`SerializedKey`]s into the prefix-compressed wire form.
#[derive(Default)]
pub struct PrefixKeyCompressor {
    previous: Vec<u8>,
}

impl PrefixKeyCompressor {
    /// Creates a compressor with no prior key (the first `encode` call emits
    /// the full key as `unshared_suffix`).
    #[must_use]
    pub fn new() -> Self {
        Self { previous: Vec::new() }
    }

    /// Appends the prefix-compressed encoding of `key` to `out`.
    pub fn encode(&mut self, key: &SerializedKey, out: &mut Vec<u8>) {
        let bytes = key.as_bytes();
        let shared = bytes
            .iter()
            .zip(self.previous.iter())
            .take_while(|(a, b)| a == b)
            .count();
        write_vint(out, shared as u64);
        write_vstr(out, &bytes[shared..]);
        self.previous.clear();
        self.previous.extend_from_slice(bytes);
    }
}

/// Decodes a prefix-compressed key stream, maintaining a one-key lookback.
#[derive(Default)]
pub struct PrefixKeyDecompressor {
    previous: Vec<u8>,
}

impl PrefixKeyDecompressor {
    /// Creates a decompressor with no prior key.
    #[must_use]
    pub fn new() -> Self {
        Self { previous: Vec::new() }
    }

    /// Decodes the next key from the front of `buf`, returning the
    /// reconstructed [`SerializedKey`] and the number of bytes consumed.
    pub fn decode(&mut self, buf: &[u8]) -> Result<(SerializedKey, usize), PrefixError> {
        let (shared, n1) = read_vint(buf)?;
        let shared = shared as usize;
        if shared > self.previous.len() {
            return Err(PrefixError::SharedPrefixTooLong(shared, self.previous.len()));
        }
        let (suffix, n2) = read_vstr(&buf[n1..])?;

        let mut full = Vec::with_capacity(shared + suffix.len());
        full.extend_from_slice(&self.previous[..shared]);
        full.extend_from_slice(suffix);

        self.previous = full.clone();
        Ok((SerializedKey::from_raw(full), n1 + n2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{Flag, Key};

    #[test]
    fn roundtrip_ascending_keys() {
        let keys: Vec<SerializedKey> = (0..20)
            .map(|i| Key::new(format!("row{:04}", i), 1, "q", Flag::Insert, 100, i).serialize())
            .collect();

        let mut comp = PrefixKeyCompressor::new();
        let mut buf = Vec::new();
        for k in &keys {
            comp.encode(k, &mut buf);
        }

        let mut decomp = PrefixKeyDecompressor::new();
        let mut offset = 0;
        for expected in &keys {
            let (decoded, consumed) = decomp.decode(&buf[offset..]).unwrap();
            assert_eq!(&decoded, expected);
            offset += consumed;
        }
        assert_eq!(offset, buf.len());
    }

    #[test]
    fn shared_prefix_shrinks_payload_for_similar_keys() {
        let a = Key::new("row0000", 1, "q", Flag::Insert, 100, 1).serialize();
        let b = Key::new("row0001", 1, "q", Flag::Insert, 100, 2).serialize();

        let mut comp = PrefixKeyCompressor::new();
        let mut buf_a = Vec::new();
        comp.encode(&a, &mut buf_a);
        let mut buf_b = Vec::new();
        comp.encode(&b, &mut buf_b);

        assert!(buf_b.len() < a.as_bytes().len());
    }
}
