//! Tuple wire codec: the table's default tuple serialization.
//!
//! A serialized tuple is a 4-byte big-endian payload length followed by the
//! columns, each a 1-byte type tag plus a fixed or length-prefixed body:
//!
//! ```text
//! tuple   := u32 payload_len, payload
//! payload := column*
//! column  := 0x00                          (null)
//!          | 0x01 i64_be                   (integer)
//!          | 0x02 u64_be                   (float, IEEE-754 bits)
//!          | 0x03 u32_be len, utf8 bytes   (text)
//!          | 0x04 u32_be len, bytes        (blob)
//! ```
//!
//! The length prefix makes a tuple self-delimiting, so a reader can step over
//! one without decoding it. Tuple-merge uneviction depends on that.

use crate::value::Value;

const TAG_NULL: u8 = 0;
const TAG_INTEGER: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_TEXT: u8 = 3;
const TAG_BLOB: u8 = 4;

/// Size of the length prefix.
pub const TUPLE_LEN_PREFIX: usize = 4;

/// Serialized size of a row without encoding it.
#[must_use]
pub fn encoded_len(values: &[Value]) -> usize {
    let payload: usize = values.iter().map(column_len).sum();
    TUPLE_LEN_PREFIX + payload
}

fn column_len(value: &Value) -> usize {
    1 + match value {
        Value::Null => 0,
        Value::Integer(_) | Value::Float(_) => 8,
        Value::Text(s) => 4 + s.len(),
        Value::Blob(b) => 4 + b.len(),
    }
}

/// Serialize a row.
#[must_use]
pub fn encode_tuple(values: &[Value]) -> Vec<u8> {
    let total = encoded_len(values);
    let mut buf = Vec::with_capacity(total);
    let payload_len = total - TUPLE_LEN_PREFIX;
    buf.extend_from_slice(&u32_be(payload_len));
    for value in values {
        match value {
            Value::Null => buf.push(TAG_NULL),
            Value::Integer(v) => {
                buf.push(TAG_INTEGER);
                buf.extend_from_slice(&v.to_be_bytes());
            }
            Value::Float(v) => {
                buf.push(TAG_FLOAT);
                buf.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            Value::Text(s) => {
                buf.push(TAG_TEXT);
                buf.extend_from_slice(&u32_be(s.len()));
                buf.extend_from_slice(s.as_bytes());
            }
            Value::Blob(b) => {
                buf.push(TAG_BLOB);
                buf.extend_from_slice(&u32_be(b.len()));
                buf.extend_from_slice(b);
            }
        }
    }
    debug_assert_eq!(buf.len(), total);
    buf
}

/// Total on-wire size of the tuple at the head of `data`, without decoding
/// its columns.
///
/// Returns `None` when `data` is too short to hold the declared payload.
#[must_use]
pub fn tuple_wire_len(data: &[u8]) -> Option<usize> {
    let prefix: [u8; 4] = data.get(..TUPLE_LEN_PREFIX)?.try_into().ok()?;
    let payload = u32::from_be_bytes(prefix) as usize;
    let total = TUPLE_LEN_PREFIX.checked_add(payload)?;
    (data.len() >= total).then_some(total)
}

/// Deserialize the tuple at the head of `data`.
///
/// Returns the row and the number of bytes consumed, or `None` if the bytes
/// are malformed.
#[must_use]
pub fn decode_tuple(data: &[u8]) -> Option<(Vec<Value>, usize)> {
    let total = tuple_wire_len(data)?;
    let payload = &data[TUPLE_LEN_PREFIX..total];
    let mut values = Vec::new();
    let mut at = 0usize;
    while at < payload.len() {
        let tag = payload[at];
        at += 1;
        let value = match tag {
            TAG_NULL => Value::Null,
            TAG_INTEGER => {
                let bytes: [u8; 8] = payload.get(at..at + 8)?.try_into().ok()?;
                at += 8;
                Value::Integer(i64::from_be_bytes(bytes))
            }
            TAG_FLOAT => {
                let bytes: [u8; 8] = payload.get(at..at + 8)?.try_into().ok()?;
                at += 8;
                Value::Float(f64::from_bits(u64::from_be_bytes(bytes)))
            }
            TAG_TEXT => {
                let (bytes, next) = read_len_prefixed(payload, at)?;
                at = next;
                Value::Text(std::str::from_utf8(bytes).ok()?.to_owned())
            }
            TAG_BLOB => {
                let (bytes, next) = read_len_prefixed(payload, at)?;
                at = next;
                Value::Blob(bytes.to_vec())
            }
            _ => return None,
        };
        values.push(value);
    }
    Some((values, total))
}

fn read_len_prefixed(payload: &[u8], at: usize) -> Option<(&[u8], usize)> {
    let prefix: [u8; 4] = payload.get(at..at + 4)?.try_into().ok()?;
    let len = u32::from_be_bytes(prefix) as usize;
    let start = at + 4;
    let end = start.checked_add(len)?;
    Some((payload.get(start..end)?, end))
}

#[allow(clippy::cast_possible_truncation)]
fn u32_be(len: usize) -> [u8; 4] {
    (len as u32).to_be_bytes()
}
