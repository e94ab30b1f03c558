//! Size of a record in the Kafka v2 record batch format.
//!
//! A record is encoded as
//! `length | attributes | timestampDelta | offsetDelta | key | value | headers`, where every
//! integer but `attributes` is a zigzag varint and null keys, values and header values are
//! encoded as length -1. Batch overhead is not attributed to records.

use super::{Record, RecordHeader};

/// Bytes a zigzag encoded varint takes on the wire.
pub fn varint_len(value: i64) -> usize {
    let mut zigzag = ((value << 1) ^ (value >> 63)) as u64;
    let mut len = 1;
    while zigzag >= 0x80 {
        zigzag >>= 7;
        len += 1;
    }
    len
}

fn bytes_len(bytes: Option<&[u8]>) -> usize {
    match bytes {
        Some(bytes) => varint_len(len_i64(bytes.len())) + bytes.len(),
        None => varint_len(-1),
    }
}

fn len_i64(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

/// Encoded size of one record, length prefix included. Deltas are relative to the first
/// record of the batch; [`record_len`] assumes the record is first.
pub fn encoded_len(
    key: Option<&[u8]>,
    value: Option<&[u8]>,
    headers: &[RecordHeader],
    timestamp_delta: i64,
    offset_delta: i64,
) -> usize {
    let mut body = 1; // attributes
    body += varint_len(timestamp_delta);
    body += varint_len(offset_delta);
    body += bytes_len(key);
    body += bytes_len(value);
    body += varint_len(len_i64(headers.len()));
    for header in headers {
        body += bytes_len(Some(header.key.as_bytes()));
        body += bytes_len(header.value.as_deref());
    }
    varint_len(len_i64(body)) + body
}

pub fn record_len(record: &Record) -> usize {
    encoded_len(
        record.key.as_deref(),
        record.value.as_deref(),
        &record.headers,
        0,
        0,
    )
}
