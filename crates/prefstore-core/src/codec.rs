//! Serialization strategies for whole documents
//!
//! A container always serializes the complete tree in one pass; the format
//! is fixed per container at construction and never auto-detected. Two
//! strategies ship with the crate:
//!
//! - [`JsonCodec`] — human-readable, but restricted to JSON-representable
//!   trees (no blobs, no timestamps, finite floats only)
//! - [`BinaryCodec`] — compact tagged binary with full `Value` fidelity and
//!   a CRC32C integrity check
//!
//! Binary layout:
//! header (16 bytes: magic + version + payload_len(u32 LE) + crc32c(u32 LE))
//! followed by the tagged payload.

use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::value::{Map, Value};

/// Encodes a whole document tree into bytes.
pub trait DocumentEncoder: Send + Sync {
    fn encode(&self, value: &Value) -> StoreResult<Vec<u8>>;
}

/// Decodes bytes back into a document tree.
pub trait DocumentDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> StoreResult<Value>;
}

/// Shared encoder handle as held by configurations.
pub type SharedEncoder = Arc<dyn DocumentEncoder>;
/// Shared decoder handle as held by configurations.
pub type SharedDecoder = Arc<dyn DocumentDecoder>;

/// JSON strategy backed by `serde_json`.
///
/// Encoding fails for trees that JSON cannot carry; the restriction is
/// checked value-by-value so the error names the offending kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl DocumentEncoder for JsonCodec {
    fn encode(&self, value: &Value) -> StoreResult<Vec<u8>> {
        let json = value.to_json()?;
        serde_json::to_vec_pretty(&json).map_err(|e| StoreError::Encode {
            message: format!("json serialization: {}", e),
        })
    }
}

impl DocumentDecoder for JsonCodec {
    fn decode(&self, bytes: &[u8]) -> StoreResult<Value> {
        let json: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| StoreError::Decode {
                message: format!("json parse: {}", e),
                offset: None,
            })?;
        Value::from_json(&json)
    }
}

/// Magic bytes identifying a binary document: "PDOC" in ASCII
pub const MAGIC: [u8; 4] = [0x50, 0x44, 0x4F, 0x43];

/// Current binary format version
pub const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: magic(4) + version(1) + reserved(3) + length(4) + checksum(4)
pub const HEADER_SIZE: usize = 16;

// Value tags in the binary payload
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_BOOL: u8 = 3;
const TAG_TEXT: u8 = 4;
const TAG_BYTES: u8 = 5;
const TAG_TIMESTAMP: u8 = 6;
const TAG_LIST: u8 = 7;
const TAG_MAP: u8 = 8;

/// Binary strategy; carries all eight value kinds losslessly.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryCodec;

impl DocumentEncoder for BinaryCodec {
    fn encode(&self, value: &Value) -> StoreResult<Vec<u8>> {
        let mut payload = Vec::with_capacity(256);
        encode_value(value, &mut payload)?;

        let checksum = crc32c::crc32c(&payload);

        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
        out.extend_from_slice(&MAGIC);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&[0u8; 3]); // reserved
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&checksum.to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }
}

impl DocumentDecoder for BinaryCodec {
    fn decode(&self, bytes: &[u8]) -> StoreResult<Value> {
        if bytes.len() < HEADER_SIZE {
            return Err(StoreError::Decode {
                message: format!(
                    "document too short: {} bytes, need at least {}",
                    bytes.len(),
                    HEADER_SIZE
                ),
                offset: Some(0),
            });
        }

        if bytes[0..4] != MAGIC {
            return Err(StoreError::Decode {
                message: format!(
                    "bad magic: {:02x}{:02x}{:02x}{:02x}",
                    bytes[0], bytes[1], bytes[2], bytes[3]
                ),
                offset: Some(0),
            });
        }

        if bytes[4] != FORMAT_VERSION {
            return Err(StoreError::Decode {
                message: format!("unsupported format version {}", bytes[4]),
                offset: Some(4),
            });
        }

        let length = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let checksum = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

        let payload_end = HEADER_SIZE + length;
        if bytes.len() < payload_end {
            return Err(StoreError::Decode {
                message: format!(
                    "truncated payload: header declares {} bytes, {} available",
                    length,
                    bytes.len() - HEADER_SIZE
                ),
                offset: Some(HEADER_SIZE as u64),
            });
        }

        let payload = &bytes[HEADER_SIZE..payload_end];
        let computed = crc32c::crc32c(payload);
        if computed != checksum {
            return Err(StoreError::Decode {
                message: format!(
                    "checksum mismatch: expected 0x{:08x}, got 0x{:08x}",
                    checksum, computed
                ),
                offset: Some(HEADER_SIZE as u64),
            });
        }

        let mut cursor = Cursor { payload, pos: 0 };
        let value = decode_value(&mut cursor)?;
        if cursor.pos != payload.len() {
            return Err(StoreError::Decode {
                message: format!("{} trailing payload bytes", payload.len() - cursor.pos),
                offset: Some((HEADER_SIZE + cursor.pos) as u64),
            });
        }
        Ok(value)
    }
}

fn encode_value(value: &Value, out: &mut Vec<u8>) -> StoreResult<()> {
    match value {
        Value::Int(i) => {
            out.push(TAG_INT);
            out.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float(f) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&f.to_bits().to_le_bytes());
        }
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(*b as u8);
        }
        Value::Text(s) => {
            out.push(TAG_TEXT);
            encode_len(s.len(), out)?;
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            out.push(TAG_BYTES);
            encode_len(b.len(), out)?;
            out.extend_from_slice(b);
        }
        Value::Timestamp(t) => {
            out.push(TAG_TIMESTAMP);
            out.extend_from_slice(&Value::epoch_millis(*t).to_le_bytes());
        }
        Value::List(items) => {
            out.push(TAG_LIST);
            encode_len(items.len(), out)?;
            for item in items {
                encode_value(item, out)?;
            }
        }
        Value::Map(map) => {
            out.push(TAG_MAP);
            encode_len(map.len(), out)?;
            for (key, item) in map {
                encode_len(key.len(), out)?;
                out.extend_from_slice(key.as_bytes());
                encode_value(item, out)?;
            }
        }
    }
    Ok(())
}

fn encode_len(len: usize, out: &mut Vec<u8>) -> StoreResult<()> {
    let len = u32::try_from(len).map_err(|_| StoreError::Encode {
        message: format!("collection of {} elements exceeds u32 length field", len),
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

struct Cursor<'a> {
    payload: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn fail(&self, message: String) -> StoreError {
        StoreError::Decode {
            message,
            offset: Some((HEADER_SIZE + self.pos) as u64),
        }
    }

    fn take(&mut self, n: usize) -> StoreResult<&'a [u8]> {
        if self.payload.len() - self.pos < n {
            return Err(self.fail(format!(
                "need {} bytes, {} remain",
                n,
                self.payload.len() - self.pos
            )));
        }
        let slice = &self.payload[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u8(&mut self) -> StoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn take_u32(&mut self) -> StoreResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn take_i64(&mut self) -> StoreResult<i64> {
        let b = self.take(8)?;
        Ok(i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    fn take_str(&mut self) -> StoreResult<String> {
        let len = self.take_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| self.fail(format!("invalid utf-8 in string: {}", e)))
    }
}

fn decode_value(cursor: &mut Cursor<'_>) -> StoreResult<Value> {
    let tag = cursor.take_u8()?;
    match tag {
        TAG_INT => Ok(Value::Int(cursor.take_i64()?)),
        TAG_FLOAT => Ok(Value::Float(f64::from_bits(cursor.take_i64()? as u64))),
        TAG_BOOL => match cursor.take_u8()? {
            0 => Ok(Value::Bool(false)),
            1 => Ok(Value::Bool(true)),
            other => Err(cursor.fail(format!("invalid bool byte {}", other))),
        },
        TAG_TEXT => Ok(Value::Text(cursor.take_str()?)),
        TAG_BYTES => {
            let len = cursor.take_u32()? as usize;
            Ok(Value::Bytes(cursor.take(len)?.to_vec()))
        }
        TAG_TIMESTAMP => Ok(Value::Timestamp(Value::from_epoch_millis(cursor.take_i64()?))),
        TAG_LIST => {
            let count = cursor.take_u32()? as usize;
            let mut items = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                items.push(decode_value(cursor)?);
            }
            Ok(Value::List(items))
        }
        TAG_MAP => {
            let count = cursor.take_u32()? as usize;
            let mut map = Map::with_capacity(count.min(4096));
            for _ in 0..count {
                let key = cursor.take_str()?;
                let value = decode_value(cursor)?;
                map.insert(key, value);
            }
            Ok(Value::Map(map))
        }
        other => Err(cursor.fail(format!("unknown value tag {}", other))),
    }
}
