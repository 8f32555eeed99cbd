//! Fletcher-32 checksum, used to validate compressed block payloads.
//!
//! This is the block-level checksum (distinct from the per-record CRC32 used
//! inside the commit log); it covers the compressed bytes of a single block.

/// Computes the Fletcher-32 checksum of `data`.
///
/// `data` is processed as a stream of little-endian 16-bit words; an odd
/// trailing byte is treated as if padded with a zero high byte.
#[must_use]
pub fn fletcher32(data: &[u8]) -> u32 {
    let mut sum1: u32 = 0xffff;
    let mut sum2: u32 = 0xffff;

    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        let word = u16::from_le_bytes([chunk[0], chunk[1]]) as u32;
        sum1 += word;
        sum2 += sum1;
        if sum1 >= 65535 {
            sum1 -= 65535;
        }
        if sum2 >= 65535 {
            sum2 -= 65535;
        }
    }
    if let [last] = chunks.remainder() {
        let word = *last as u32;
        sum1 += word;
        sum2 += sum1;
        if sum1 >= 65535 {
            sum1 -= 65535;
        }
        if sum2 >= 65535 {
            sum2 -= 65535;
        }
    }

    (sum2 << 16) | sum1
}
