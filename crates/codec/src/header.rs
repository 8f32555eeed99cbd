//! Fixed block header prefixing every compressed block in a cell-store file.

use crate::{fletcher32, CodecError, CodecKind};

/// Size in bytes of a serialized [`BlockHeader`]: 10 (magic) + 2 (header_len) +
/// 4 (uncompressed_len) + 4 (compressed_len) + 2 (compression_type) + 4 (checksum).
pub const HEADER_LEN: u16 = 10 + 2 + 4 + 4 + 2 + 4;

/// Which section of the cell-store file a block belongs to; determines the
/// 10-byte magic prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// A data block (sorted key/value records).
    Data,
    /// The fixed index block (offsets).
    IdxFix,
    /// The variable index block (first keys).
    IdxVar,
}

impl BlockType {
    const fn magic(self) -> &'static [u8; 10] {
        match self {
            BlockType::Data => b"Data------",
            BlockType::IdxFix => b"IdxFix----",
            BlockType::IdxVar => b"IdxVar----",
        }
    }

    fn from_magic(magic: &[u8; 10]) -> Result<Self, CodecError> {
        if magic == BlockType::Data.magic() {
            Ok(BlockType::Data)
        } else if magic == BlockType::IdxFix.magic() {
            Ok(BlockType::IdxFix)
        } else if magic == BlockType::IdxVar.magic() {
            Ok(BlockType::IdxVar)
        } else {
            Err(CodecError::BadMagic(*magic))
        }
    }
}

/// The header prefixing every compressed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Which section of the file this block belongs to.
    pub block_type: BlockType,
    /// Size in bytes of this header (always [`HEADER_LEN`] for blocks written
    /// by this implementation; kept explicit for forward compatibility).
    pub header_len: u16,
    /// Size of the payload before compression.
    pub uncompressed_len: u32,
    /// Size of the payload as written to disk (after compression).
    pub compressed_len: u32,
    /// Which [`CodecKind`] compressed this block's payload.
    pub compression_type: u16,
    /// Fletcher-32 checksum of the compressed payload.
    pub checksum: u32,
}

impl BlockHeader {
    /// Serializes the header to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.block_type.magic());
        out.extend_from_slice(&self.header_len.to_le_bytes());
        out.extend_from_slice(&self.uncompressed_len.to_le_bytes());
        out.extend_from_slice(&self.compressed_len.to_le_bytes());
        out.extend_from_slice(&self.compression_type.to_le_bytes());
        out.extend_from_slice(&self.checksum.to_le_bytes());
    }

    /// Parses a header from the front of `buf`.
    pub fn read(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < HEADER_LEN as usize {
            return Err(CodecError::Truncated {
                declared: HEADER_LEN as usize,
                had: buf.len(),
            });
        }
        let mut magic = [0u8; 10];
        magic.copy_from_slice(&buf[0..10]);
        let block_type = BlockType::from_magic(&magic)?;
        let header_len = u16::from_le_bytes([buf[10], buf[11]]);
        let uncompressed_len = u32::from_le_bytes(buf[12..16].try_into().unwrap());
        let compressed_len = u32::from_le_bytes(buf[16..20].try_into().unwrap());
        let compression_type = u16::from_le_bytes([buf[20], buf[21]]);
        let checksum = u32::from_le_bytes(buf[22..26].try_into().unwrap());

        Ok(BlockHeader {
            block_type,
            header_len,
            uncompressed_len,
            compressed_len,
            compression_type,
            checksum,
        })
    }

    /// Builds and writes a full block (header + compressed payload) for
    /// `uncompressed` using `codec`, appending it to `out`.
    pub fn write_block(
        block_type: BlockType,
        codec_kind: CodecKind,
        uncompressed: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        let codec = codec_kind.codec();
        let mut compressed = Vec::new();
        codec.deflate(uncompressed, &mut compressed)?;
        let checksum = fletcher32(&compressed);

        let header = BlockHeader {
            block_type,
            header_len: HEADER_LEN,
            uncompressed_len: uncompressed.len() as u32,
            compressed_len: compressed.len() as u32,
            compression_type: codec_kind.type_code(),
            checksum,
        };
        header.write(out);
        out.extend_from_slice(&compressed);
        Ok(())
    }

    /// Reads and decompresses a full block starting at `buf[0]`, validating
    /// its checksum. Returns `(decompressed_payload, total_bytes_consumed)`.
    pub fn read_block(buf: &[u8]) -> Result<(Vec<u8>, usize), CodecError> {
        let header = BlockHeader::read(buf)?;
        let payload_start = header.header_len as usize;
        let payload_end = payload_start + header.compressed_len as usize;
        if buf.len() < payload_end {
            return Err(CodecError::Truncated {
                declared: payload_end,
                had: buf.len(),
            });
        }
        let compressed = &buf[payload_start..payload_end];

        let actual = fletcher32(compressed);
        if actual != header.checksum {
            return Err(CodecError::ChecksumMismatch {
                expected: header.checksum,
                actual,
            });
        }

        let codec = CodecKind::from_type_code(header.compression_type)?.codec();
        let mut decompressed = Vec::with_capacity(header.uncompressed_len as usize);
        codec.inflate(compressed, &mut decompressed, header.uncompressed_len as usize)?;

        Ok((decompressed, payload_end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_block_roundtrips() {
        let payload = b"sorted key/value data goes here".repeat(4);
        let mut buf = Vec::new();
        BlockHeader::write_block(BlockType::Data, CodecKind::Zlib, &payload, &mut buf).unwrap();
        let (decoded, consumed) = BlockHeader::read_block(&buf).unwrap();
        assert_eq!(decoded, payload);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let payload = b"data".to_vec();
        let mut buf = Vec::new();
        BlockHeader::write_block(BlockType::Data, CodecKind::None, &payload, &mut buf).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xff;
        assert!(matches!(
            BlockHeader::read_block(&buf),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let mut buf = vec![0u8; HEADER_LEN as usize];
        buf[0..10].copy_from_slice(b"Bogus-----");
        assert!(matches!(BlockHeader::read(&buf), Err(CodecError::BadMagic(_))));
    }
}
