//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! The canonical encoding is critical: the same entry must produce
//! identical bytes (and thus identical hashes and signatures) across all
//! platforms, or two replicas of a feed would disagree about its content.

use ciborium::value::Value;

use crate::crypto::{Blake3Hash, PublicKey, Signature};
use crate::entry::{EntryHeader, EntryKind, FeedEntry};
use crate::error::CoreError;
use crate::types::SpaceId;

/// Header field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const VERSION: u64 = 0;
    pub const AUTHOR: u64 = 1;
    pub const SPACE_ID: u64 = 2;
    pub const SEQ: u64 = 3;
    pub const TIMESTAMP: u64 = 4;
    pub const KIND: u64 = 5;
    pub const PAYLOAD_HASH: u64 = 6;
}

/// Encode an entry header to canonical CBOR bytes.
pub fn canonical_header_bytes(header: &EntryHeader) -> Vec<u8> {
    let value = header_to_cbor_value(header);
    encode_cbor_value_canonical(&value)
}

/// Encode an entire entry to canonical bytes.
///
/// Format: canonical_header || payload || signature
pub fn canonical_entry_bytes(entry: &FeedEntry) -> Vec<u8> {
    let mut buf = canonical_header_bytes(&entry.header);
    buf.extend_from_slice(&entry.payload);
    buf.extend_from_slice(&entry.signature.0);
    buf
}

/// Construct the signed message (header || payload).
pub fn signed_message(entry: &FeedEntry) -> Vec<u8> {
    let mut buf = canonical_header_bytes(&entry.header);
    buf.extend_from_slice(&entry.payload);
    buf
}

/// Construct the signed message from header and payload.
pub fn signed_message_from_parts(header: &EntryHeader, payload: &[u8]) -> Vec<u8> {
    let mut buf = canonical_header_bytes(header);
    buf.extend_from_slice(payload);
    buf
}

/// Convert a header to a CBOR Value (map with integer keys).
fn header_to_cbor_value(header: &EntryHeader) -> Value {
    // Build map entries in key order (already sorted 0-6)
    let mut entries = Vec::with_capacity(7);

    // 0: version
    entries.push((
        Value::Integer(keys::VERSION.into()),
        Value::Integer(header.version.into()),
    ));

    // 1: author
    entries.push((
        Value::Integer(keys::AUTHOR.into()),
        Value::Bytes(header.author.0.to_vec()),
    ));

    // 2: space_id
    entries.push((
        Value::Integer(keys::SPACE_ID.into()),
        Value::Bytes(header.space_id.0.to_vec()),
    ));

    // 3: seq
    entries.push((
        Value::Integer(keys::SEQ.into()),
        Value::Integer(header.seq.into()),
    ));

    // 4: timestamp
    entries.push((
        Value::Integer(keys::TIMESTAMP.into()),
        Value::Integer(header.timestamp.into()),
    ));

    // 5: kind
    entries.push((
        Value::Integer(keys::KIND.into()),
        Value::Integer(header.kind.to_u16().into()),
    ));

    // 6: payload_hash
    entries.push((
        Value::Integer(keys::PAYLOAD_HASH.into()),
        Value::Bytes(header.payload_hash.0.to_vec()),
    ));

    Value::Map(entries)
}

/// Encode a CBOR Value to canonical bytes.
///
/// This function ensures:
/// - Map keys are sorted by encoded byte comparison
/// - Integers use smallest encoding
/// - Definite lengths only
pub(crate) fn encode_cbor_value_canonical(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => {
            encode_integer(buf, *i);
        }
        Value::Bytes(b) => {
            encode_bytes(buf, b);
        }
        Value::Text(s) => {
            encode_text(buf, s);
        }
        Value::Array(arr) => {
            encode_array(buf, arr);
        }
        Value::Map(entries) => {
            encode_map_canonical(buf, entries);
        }
        Value::Bool(b) => {
            buf.push(if *b { 0xf5 } else { 0xf4 });
        }
        Value::Null => {
            buf.push(0xf6);
        }
        Value::Float(_) => {
            panic!("floats not supported in canonical encoding");
        }
        _ => {
            panic!("unsupported CBOR value type");
        }
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        // Major type 0: unsigned integer
        encode_uint(buf, 0, n as u64);
    } else {
        // Major type 1: negative integer
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    // Encode all keys first to sort by encoded bytes
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    // Sort by encoded key bytes (lexicographic)
    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    // Write map header
    encode_uint(buf, 5, key_value_pairs.len() as u64);

    // Write sorted key-value pairs
    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

/// Decode an entry from canonical bytes.
pub fn decode_entry(bytes: &[u8]) -> Result<FeedEntry, CoreError> {
    // Minimum size: header (variable) + 64 byte signature
    if bytes.len() < 64 {
        return Err(CoreError::MalformedEntry("too short".into()));
    }

    // Parse CBOR header
    let cursor = std::io::Cursor::new(bytes);
    let value: Value =
        ciborium::from_reader(cursor).map_err(|e| CoreError::DecodingError(e.to_string()))?;

    let header = cbor_value_to_header(&value)?;

    // Calculate header length by re-encoding
    let header_bytes = canonical_header_bytes(&header);
    let header_len = header_bytes.len();

    // Extract payload and signature
    let remaining = &bytes[header_len..];
    if remaining.len() < 64 {
        return Err(CoreError::MalformedEntry(
            "insufficient bytes for signature".into(),
        ));
    }

    // Payload is everything except the last 64 bytes
    let payload_len = remaining.len() - 64;
    let payload = remaining[..payload_len].to_vec();
    let sig_bytes: [u8; 64] = remaining[payload_len..]
        .try_into()
        .map_err(|_| CoreError::MalformedEntry("invalid signature length".into()))?;

    Ok(FeedEntry {
        header,
        payload: payload.into(),
        signature: Signature(sig_bytes),
    })
}

/// Convert a CBOR Value (map) back to an EntryHeader.
fn cbor_value_to_header(value: &Value) -> Result<EntryHeader, CoreError> {
    let map = match value {
        Value::Map(m) => m,
        _ => return Err(CoreError::MalformedEntry("expected map".into())),
    };

    // Helper to get a value by integer key
    let get = |key: u64| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == key as i128))
            .map(|(_, v)| v)
    };

    // Parse version
    let version = match get(keys::VERSION) {
        Some(Value::Integer(i)) => i128::from(*i) as u8,
        _ => return Err(CoreError::MalformedEntry("missing version".into())),
    };

    // Parse author
    let author = match get(keys::AUTHOR) {
        Some(Value::Bytes(b)) if b.len() == 32 => {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(b);
            PublicKey(arr)
        }
        _ => return Err(CoreError::MalformedEntry("invalid author".into())),
    };

    // Parse space_id
    let space_id = match get(keys::SPACE_ID) {
        Some(Value::Bytes(b)) if b.len() == 32 => {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(b);
            SpaceId(arr)
        }
        _ => return Err(CoreError::MalformedEntry("invalid space_id".into())),
    };

    // Parse seq
    let seq = match get(keys::SEQ) {
        Some(Value::Integer(i)) => i128::from(*i) as u64,
        _ => return Err(CoreError::MalformedEntry("missing seq".into())),
    };

    // Parse timestamp
    let timestamp = match get(keys::TIMESTAMP) {
        Some(Value::Integer(i)) => i128::from(*i) as i64,
        _ => return Err(CoreError::MalformedEntry("missing timestamp".into())),
    };

    // Parse kind (total: unknown values are carried, not rejected)
    let kind = match get(keys::KIND) {
        Some(Value::Integer(i)) => EntryKind::from_u16(i128::from(*i) as u16),
        _ => return Err(CoreError::MalformedEntry("missing kind".into())),
    };

    // Parse payload_hash
    let payload_hash = match get(keys::PAYLOAD_HASH) {
        Some(Value::Bytes(b)) if b.len() == 32 => {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(b);
            Blake3Hash(arr)
        }
        _ => return Err(CoreError::MalformedEntry("invalid payload_hash".into())),
    };

    Ok(EntryHeader {
        version,
        author,
        space_id,
        seq,
        timestamp,
        kind,
        payload_hash,
    })
}
