//! The logical cell coordinate and its on-disk serialized form.

use crate::serialization::{
    read_cstr, read_i64_be, read_u64_be, read_vint, write_cstr, write_i64_be, write_u64_be,
    write_vint,
};
use std::cmp::Ordering;
use thiserror::Error;

/// Sentinel marking "the earliest possible timestamp" (start of time).
pub const TIMESTAMP_MIN: i64 = i64::MIN;
/// Sentinel marking "the latest possible timestamp" (end of time).
pub const TIMESTAMP_MAX: i64 = i64::MAX;
/// Sentinel meaning "no timestamp was supplied" — distinct from any real instant.
pub const TIMESTAMP_NULL: i64 = i64::MIN + 1;
/// Sentinel meaning "assign the current time at ingest" — never persisted as-is;
/// the range replaces it with a real timestamp before the cell reaches a cache.
pub const TIMESTAMP_AUTO: i64 = i64::MIN + 2;

/// Reserved column-family id for row-level tombstones (`Flag::DeleteRow`).
pub const ROW_DELETE_COLUMN_FAMILY: u8 = 0;

/// The scope of a cell-level marker: a live insert, or one of three tombstone scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flag {
    /// A live value.
    Insert = 0,
    /// Deletes every column in the row as of this timestamp/revision.
    DeleteRow = 1,
    /// Deletes every qualifier in one column family as of this timestamp/revision.
    DeleteColumnFamily = 2,
    /// Deletes one specific `(row, cf, qualifier)` cell as of this timestamp/revision.
    DeleteCell = 3,
}

impl Flag {
    fn from_u8(v: u8) -> Result<Self, KeyError> {
        match v {
            0 => Ok(Flag::Insert),
            1 => Ok(Flag::DeleteRow),
            2 => Ok(Flag::DeleteColumnFamily),
            3 => Ok(Flag::DeleteCell),
            other => Err(KeyError::BadKey(format!("unknown flag code {other}"))),
        }
    }

    /// Returns `true` if this flag marks a tombstone of any scope.
    #[must_use]
    pub fn is_delete(self) -> bool {
        !matches!(self, Flag::Insert)
    }
}

/// Errors produced while parsing a serialized key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The byte string failed to parse as a serialized key.
    #[error("bad key: {0}")]
    BadKey(String),
}

impl From<crate::serialization::SerializationError> for KeyError {
    fn from(e: crate::serialization::SerializationError) -> Self {
        KeyError::BadKey(e.to_string())
    }
}

/// Control-byte bits recorded ahead of the row bytes in a serialized key.
///
/// Every serialized key carries the full 16-byte inverted timestamp+revision
/// tail unconditionally; the control byte records only the [`Flag`] plus the
/// `was_auto` bit needed to recover ingest intent. Fixing the tail layout
/// keeps [`SerializedKey`] ordering a plain byte-for-byte comparison, with no
/// variable-length fast path to special-case.
mod control {
    pub const FLAG_MASK: u8 = 0x03;
    pub const TS_AUTO: u8 = 0x04;
}

/// The canonical cell coordinate: row, column family, qualifier, flag,
/// timestamp, and revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    /// Arbitrary non-empty bytes, excluding NUL. Defines primary ordering.
    pub row: Vec<u8>,
    /// 8-bit id into the schema's column families. `0` is reserved for row tombstones.
    pub column_family_code: u8,
    /// Arbitrary bytes (may be empty), excluding NUL.
    pub column_qualifier: Vec<u8>,
    /// Which scope this cell marker applies to.
    pub flag: Flag,
    /// Signed 64-bit timestamp, or one of the `TIMESTAMP_*` sentinels.
    pub timestamp: i64,
    /// Monotonically-assigned (within a range) sequence number.
    pub revision: i64,
    /// `true` if `timestamp` was `TIMESTAMP_AUTO` at the moment this key was built,
    /// before the range filled in a real timestamp at ingest.
    pub was_auto_timestamp: bool,
}

impl Key {
    /// Builds a key with `was_auto_timestamp` false and the given fields.
    pub fn new(
        row: impl Into<Vec<u8>>,
        column_family_code: u8,
        column_qualifier: impl Into<Vec<u8>>,
        flag: Flag,
        timestamp: i64,
        revision: i64,
    ) -> Self {
        Key {
            row: row.into(),
            column_family_code,
            column_qualifier: column_qualifier.into(),
            flag,
            timestamp,
            revision,
            was_auto_timestamp: timestamp == TIMESTAMP_AUTO,
        }
    }

    /// Serializes this key into its on-disk form.
    ///
    /// Layout: `vlen | control | row | 0x00 | cfid | column_qualifier | 0x00 |
    /// ~timestamp(be i64) | ~revision(be i64)`. Timestamps and revisions are
    /// bitwise-inverted so that larger (newer) values sort earlier.
    #[must_use]
    pub fn serialize(&self) -> SerializedKey {
        let mut tail = Vec::with_capacity(self.row.len() + self.column_qualifier.len() + 19);

        let mut control = self.flag as u8 & control::FLAG_MASK;
        if self.was_auto_timestamp {
            control |= control::TS_AUTO;
        }
        tail.push(control);
        write_cstr(&mut tail, &self.row);
        tail.push(self.column_family_code);
        write_cstr(&mut tail, &self.column_qualifier);

        let inv_ts = !(self.timestamp as u64);
        let inv_rev = !(self.revision as u64);
        write_u64_be(&mut tail, inv_ts);
        write_u64_be(&mut tail, inv_rev);

        let mut out = Vec::with_capacity(tail.len() + 5);
        write_vint(&mut out, tail.len() as u64);
        out.extend_from_slice(&tail);
        SerializedKey(out)
    }

    /// Parses a key back out of its serialized form.
    pub fn decode(sk: &SerializedKey) -> Result<Key, KeyError> {
        let buf = sk.0.as_slice();
        let (vlen, consumed) = read_vint(buf)?;
        let tail = &buf[consumed..];
        if (tail.len() as u64) < vlen {
            return Err(KeyError::BadKey("truncated serialized key".into()));
        }
        let tail = &tail[..vlen as usize];

        if tail.is_empty() {
            return Err(KeyError::BadKey("empty serialized key body".into()));
        }
        let control = tail[0];
        let flag = Flag::from_u8(control & control::FLAG_MASK)?;
        let was_auto = control & control::TS_AUTO != 0;

        let rest = &tail[1..];
        let (row, n) = read_cstr(rest)?;
        let rest = &rest[n..];

        if rest.is_empty() {
            return Err(KeyError::BadKey("missing column family byte".into()));
        }
        let cfid = rest[0];
        let rest = &rest[1..];

        let (cq, n) = read_cstr(rest)?;
        let rest = &rest[n..];

        let inv_ts = read_u64_be(rest)?;
        let rest = &rest[8..];
        let inv_rev = read_u64_be(rest)?;

        let timestamp = !inv_ts as i64;
        let revision = !inv_rev as i64;

        Ok(Key {
            row: row.to_vec(),
            column_family_code: cfid,
            column_qualifier: cq.to_vec(),
            flag,
            timestamp,
            revision,
            was_auto_timestamp: was_auto,
        })
    }
}

/// The on-disk byte form of a [`Key`].
///
/// Ordering (`Ord`/`PartialOrd`) is the storage engine's *only* ordering:
/// a byte-for-byte comparison of the tail with its leading control byte
/// stripped off, i.e. exactly the `(row, 0x00, cfid, cq, 0x00, ~ts, ~rev)`
/// sequence described in the format. The control byte (flag + `was_auto`)
/// is carried in the tail but never participates in comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SerializedKey(pub Vec<u8>);

impl SerializedKey {
    /// Wraps an already-serialized byte string without validating it.
    #[must_use]
    pub fn from_raw(bytes: Vec<u8>) -> Self {
        SerializedKey(bytes)
    }

    /// Borrows the raw serialized bytes (vlen prefix included).
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the row bytes without decoding the rest of the key.
    pub fn row(&self) -> Result<&[u8], KeyError> {
        let (vlen, consumed) = read_vint(&self.0)?;
        let tail = &self.0[consumed..];
        if (tail.len() as u64) < vlen {
            return Err(KeyError::BadKey("truncated serialized key".into()));
        }
        // tail[0] is the control byte; row starts right after it.
        let (row, _) = read_cstr(&tail[1..])?;
        Ok(row)
    }

    /// Returns the column-family code without decoding the rest of the key.
    pub fn column_family_code(&self) -> Result<u8, KeyError> {
        let (vlen, consumed) = read_vint(&self.0)?;
        let tail = &self.0[consumed..];
        if (tail.len() as u64) < vlen {
            return Err(KeyError::BadKey("truncated serialized key".into()));
        }
        let (row, n) = read_cstr(&tail[1..])?;
        let _ = row;
        let rest = &tail[1 + n..];
        rest.first()
            .copied()
            .ok_or_else(|| KeyError::BadKey("missing column family byte".into()))
    }

    fn tail(&self) -> &[u8] {
        let (vlen, consumed) = match read_vint(&self.0) {
            Ok(v) => v,
            Err(_) => return &[],
        };
        let tail = &self.0[consumed..];
        let vlen = vlen as usize;
        if tail.len() < vlen {
            return &[];
        }
        &tail[..vlen]
    }

    /// The comparable portion of the tail: everything after the leading
    /// control byte. The control byte carries the flag and the `was_auto`
    /// bit, neither of which participates in ordering — row is the primary
    /// sort dimension, so comparison starts at the row bytes.
    fn sort_key(&self) -> &[u8] {
        match self.tail() {
            [] => &[],
            tail => &tail[1..],
        }
    }
}

impl PartialOrd for SerializedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SerializedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(other.sort_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(row: &str, cfid: u8, cq: &str, flag: Flag, ts: i64, rev: i64) -> Key {
        Key::new(row.as_bytes(), cfid, cq.as_bytes(), flag, ts, rev)
    }

    #[test]
    fn roundtrip_preserves_all_fields() {
        let k = key("foo", 3, "qual", Flag::Insert, 100, 1);
        let sk = k.serialize();
        let decoded = Key::decode(&sk).unwrap();
        assert_eq!(decoded, k);
    }

    #[test]
    fn roundtrip_preserves_delete_flags() {
        for flag in [
            Flag::Insert,
            Flag::DeleteRow,
            Flag::DeleteColumnFamily,
            Flag::DeleteCell,
        ] {
            let k = key("r", 1, "q", flag, 5, 2);
            assert_eq!(Key::decode(&k.serialize()).unwrap().flag, flag);
        }
    }

    #[test]
    fn newer_timestamp_sorts_earlier_for_same_triple() {
        let older = key("row", 1, "q", Flag::Insert, 100, 1).serialize();
        let newer = key("row", 1, "q", Flag::Insert, 200, 2).serialize();
        assert!(newer < older, "higher timestamp must sort first");
    }

    #[test]
    fn row_ordering_is_primary() {
        let a = key("aaa", 9, "z", Flag::Insert, 1, 1).serialize();
        let b = key("bbb", 0, "a", Flag::Insert, 1000, 1000).serialize();
        assert!(a < b);
    }

    #[test]
    fn row_accessor_matches_decoded_row() {
        let k = key("my-row", 2, "cq", Flag::Insert, 10, 10);
        let sk = k.serialize();
        assert_eq!(sk.row().unwrap(), b"my-row");
    }

    #[test]
    fn column_family_code_accessor_matches_decoded_value() {
        let k = key("row", 7, "cq", Flag::Insert, 10, 10);
        let sk = k.serialize();
        assert_eq!(sk.column_family_code().unwrap(), 7);
    }

    #[test]
    fn flag_never_outranks_row_in_ordering() {
        // A DeleteRow tombstone for "a" must sort before every key for row "b",
        // even though DeleteRow's flag byte (1) is numerically greater than
        // Insert's (0). The control byte must never leak into the comparison.
        let tombstone = key("a", 0, "", Flag::DeleteRow, 1, 1).serialize();
        let insert = key("b", 5, "q", Flag::Insert, 1, 1).serialize();
        assert!(tombstone < insert, "row must stay the primary sort dimension regardless of flag");
    }

    #[test]
    fn equal_row_cf_cq_orders_by_revision_when_timestamps_tie() {
        let a = key("row", 1, "q", Flag::Insert, 100, 5).serialize();
        let b = key("row", 1, "q", Flag::Insert, 100, 9).serialize();
        assert!(b < a, "higher revision must sort first on a timestamp tie");
    }
}
