//! Binary key encoding
//!
//! Keys handed to the page store are plain byte strings with a fixed
//! encoding:
//!
//! - 32-bit and 64-bit integers: big-endian, fixed width
//! - strings: raw UTF-8 bytes
//! - timestamps: 64-bit milliseconds since the Unix epoch, big-endian;
//!   a negative decoded value denotes a null timestamp
//!
//! Equality and hashing are over the full byte sequence. Ordering is
//! unsigned lexicographic, with a shorter prefix ordering before any
//! longer extension of it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};

/// An encoded key: an owned byte string with byte-wise equality,
/// hashing, and unsigned lexicographic ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RawKey(Vec<u8>);

impl RawKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        RawKey(bytes)
    }

    /// Key for a single 64-bit integer column
    pub fn from_i64(v: i64) -> Self {
        RawKey(v.to_be_bytes().to_vec())
    }

    /// Key for a single string column
    pub fn from_string(s: &str) -> Self {
        RawKey(s.as_bytes().to_vec())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for RawKey {
    fn from(bytes: Vec<u8>) -> Self {
        RawKey(bytes)
    }
}

/// Append a big-endian 32-bit integer
pub fn put_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// Append a big-endian 64-bit integer
pub fn put_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// Append a big-endian unsigned 64-bit integer
pub fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// Append the raw UTF-8 bytes of a string
pub fn put_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
}

/// Append a timestamp. `None` is encoded as -1.
pub fn put_timestamp(buf: &mut Vec<u8>, ts: Option<i64>) {
    put_i64(buf, ts.unwrap_or(-1));
}

fn truncated(what: &str, expected: usize, got: usize) -> NodeError {
    NodeError::Execution(format!(
        "truncated {} encoding: expected {} bytes, got {}",
        what, expected, got
    ))
}

/// Decode a big-endian 32-bit integer from exactly 4 bytes
pub fn decode_i32(buf: &[u8]) -> Result<i32> {
    let arr: [u8; 4] = buf
        .try_into()
        .map_err(|_| truncated("i32", 4, buf.len()))?;
    Ok(i32::from_be_bytes(arr))
}

/// Decode a big-endian 64-bit integer from exactly 8 bytes
pub fn decode_i64(buf: &[u8]) -> Result<i64> {
    let arr: [u8; 8] = buf
        .try_into()
        .map_err(|_| truncated("i64", 8, buf.len()))?;
    Ok(i64::from_be_bytes(arr))
}

/// Decode a big-endian unsigned 64-bit integer from exactly 8 bytes
pub fn decode_u64(buf: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = buf
        .try_into()
        .map_err(|_| truncated("u64", 8, buf.len()))?;
    Ok(u64::from_be_bytes(arr))
}

/// Decode a UTF-8 string from the full buffer
pub fn decode_string(buf: &[u8]) -> Result<String> {
    String::from_utf8(buf.to_vec())
        .map_err(|e| NodeError::Execution(format!("invalid UTF-8 in key: {}", e)))
}

/// Decode a timestamp. A negative value decodes to `None`.
pub fn decode_timestamp(buf: &[u8]) -> Result<Option<i64>> {
    let v = decode_i64(buf)?;
    if v < 0 {
        Ok(None)
    } else {
        Ok(Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i32_round_trip() {
        for v in [0, 1, -1, 42, i32::MIN, i32::MAX] {
            let mut buf = Vec::new();
            put_i32(&mut buf, v);
            assert_eq!(buf.len(), 4);
            assert_eq!(decode_i32(&buf).unwrap(), v);
        }
    }

    #[test]
    fn test_i64_round_trip() {
        for v in [0, 1, -1, 1234567890123, i64::MIN, i64::MAX] {
            let mut buf = Vec::new();
            put_i64(&mut buf, v);
            assert_eq!(buf.len(), 8);
            assert_eq!(decode_i64(&buf).unwrap(), v);
        }
    }

    #[test]
    fn test_u64_round_trip() {
        for v in [0, 1, u64::MAX] {
            let mut buf = Vec::new();
            put_u64(&mut buf, v);
            assert_eq!(decode_u64(&buf).unwrap(), v);
        }
    }

    #[test]
    fn test_string_round_trip() {
        for s in ["", "users", "naïve-ütf8"] {
            let mut buf = Vec::new();
            put_string(&mut buf, s);
            assert_eq!(decode_string(&buf).unwrap(), s);
        }
    }

    #[test]
    fn test_timestamp_round_trip() {
        let mut buf = Vec::new();
        put_timestamp(&mut buf, Some(1_700_000_000_000));
        assert_eq!(decode_timestamp(&buf).unwrap(), Some(1_700_000_000_000));
    }

    #[test]
    fn test_null_timestamp_decodes_to_none() {
        let mut buf = Vec::new();
        put_timestamp(&mut buf, None);
        assert_eq!(decode_timestamp(&buf).unwrap(), None);

        // Any negative value means null, not just the canonical -1
        let mut buf = Vec::new();
        put_i64(&mut buf, -42);
        assert_eq!(decode_timestamp(&buf).unwrap(), None);
    }

    #[test]
    fn test_decode_truncated_fails() {
        assert!(decode_i32(&[0, 1]).is_err());
        assert!(decode_i64(&[0; 4]).is_err());
        assert!(decode_timestamp(&[]).is_err());
    }

    #[test]
    fn test_key_ordering_is_unsigned() {
        // 0x80 must compare greater than 0x7f (unsigned bytes)
        let low = RawKey::new(vec![0x7f]);
        let high = RawKey::new(vec![0x80]);
        assert!(low < high);
    }

    #[test]
    fn test_key_prefix_orders_before_extension() {
        let prefix = RawKey::new(vec![1, 2]);
        let extended = RawKey::new(vec![1, 2, 0]);
        assert!(prefix < extended);
    }

    #[test]
    fn test_big_endian_integers_sort_like_values() {
        // Big-endian keeps numeric order for non-negative values
        let mut keys: Vec<RawKey> = [3u64, 1, 2, 10].iter().map(|v| {
            let mut buf = Vec::new();
            put_u64(&mut buf, *v);
            RawKey::new(buf)
        }).collect();
        keys.sort();
        let decoded: Vec<u64> = keys.iter().map(|k| decode_u64(k.as_slice()).unwrap()).collect();
        assert_eq!(decoded, vec![1, 2, 3, 10]);
    }

    #[test]
    fn test_composite_key() {
        let mut buf = Vec::new();
        put_string(&mut buf, "orders");
        put_u64(&mut buf, 7);
        let key = RawKey::new(buf);
        assert_eq!(key.len(), "orders".len() + 8);
        assert_eq!(decode_u64(&key.as_slice()[6..]).unwrap(), 7);
    }
}
