//! The per-cell record format inside a data block.
//!
//! A data block is a flat sequence of these records in ascending key order;
//! there is no per-record length prefix beyond what the key and value encode
//! themselves with, since [`SerializedKey`] bytes are self-delimiting (they
//! start with a varint of their own tail length).

use keys::serialization::{read_vint, read_vstr, write_vstr};
use keys::{KeyError, SerializedKey};

/// Appends one `(key, value)` record to `out`.
pub fn encode_record(key: &SerializedKey, value: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(key.as_bytes());
    write_vstr(out, value);
}

/// Decodes one record from the front of `buf`, returning the key, the value,
/// and the number of bytes consumed.
pub fn decode_record(buf: &[u8]) -> Result<(SerializedKey, Vec<u8>, usize), KeyError> {
    let (tail_len, vint_len) = read_vint(buf)?;
    let key_total = vint_len + tail_len as usize;
    if key_total > buf.len() {
        return Err(KeyError::BadKey("truncated record key".into()));
    }
    let key = SerializedKey::from_raw(buf[..key_total].to_vec());

    let (value, value_len) = read_vstr(&buf[key_total..])?;
    let consumed = key_total + value_len;
    Ok((key, value.to_vec(), consumed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keys::{Flag, Key};

    #[test]
    fn encode_then_decode_roundtrips() {
        let key = Key::new(b"row".as_slice(), 1, b"q".as_slice(), Flag::Insert, 100, 1).serialize();
        let value = b"hello".to_vec();

        let mut buf = Vec::new();
        encode_record(&key, &value, &mut buf);

        let (decoded_key, decoded_value, consumed) = decode_record(&buf).unwrap();
        assert_eq!(decoded_key, key);
        assert_eq!(decoded_value, value);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn multiple_records_back_to_back() {
        let k1 = Key::new(b"a".as_slice(), 1, b"q".as_slice(), Flag::Insert, 100, 1).serialize();
        let k2 = Key::new(b"b".as_slice(), 1, b"q".as_slice(), Flag::Insert, 100, 2).serialize();

        let mut buf = Vec::new();
        encode_record(&k1, b"v1", &mut buf);
        encode_record(&k2, b"v2", &mut buf);

        let (dk1, dv1, c1) = decode_record(&buf).unwrap();
        assert_eq!(dk1, k1);
        assert_eq!(dv1, b"v1");
        let (dk2, dv2, c2) = decode_record(&buf[c1..]).unwrap();
        assert_eq!(dk2, k2);
        assert_eq!(dv2, b"v2");
        assert_eq!(c1 + c2, buf.len());
    }
}
