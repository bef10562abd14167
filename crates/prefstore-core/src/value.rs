//! Document value tree.
//!
//! [`Value`] is the dynamically-typed tree a document holds: six leaf kinds
//! (integer, float, boolean, text, binary blob, timestamp) and two composite
//! kinds (list, string-keyed map). Every composite is itself a `Value`, so
//! the whole document is one tree that the codecs serialize in a single
//! pass.
//!
//! Values that arrive as arbitrary `serde` types are bridged through
//! [`Value::encode_from`] / [`Value::decode_as`], the explicit
//! encode-then-decode conversion used for structured leaves.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{StoreError, StoreResult};

/// String-keyed mapping node. Insertion order is not significant.
pub type Map = hashbrown::HashMap<String, Value>;

/// A value stored in a document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// Boolean
    Bool(bool),
    /// UTF-8 text
    Text(String),
    /// Opaque binary blob
    Bytes(Vec<u8>),
    /// Point in time, millisecond precision on disk
    Timestamp(SystemTime),
    /// Ordered list of values
    List(Vec<Value>),
    /// String-keyed mapping
    Map(Map),
}

impl Value {
    /// Returns the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// True for the leaf kinds (everything except list and map).
    pub fn is_leaf(&self) -> bool {
        !matches!(self, Value::List(_) | Value::Map(_))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<SystemTime> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// True when the tree can be carried by plain JSON: no blobs, no
    /// timestamps, no non-finite floats anywhere.
    pub fn is_json_safe(&self) -> bool {
        match self {
            Value::Int(_) | Value::Bool(_) | Value::Text(_) => true,
            Value::Float(f) => f.is_finite(),
            Value::Bytes(_) | Value::Timestamp(_) => false,
            Value::List(items) => items.iter().all(Value::is_json_safe),
            Value::Map(map) => map.values().all(Value::is_json_safe),
        }
    }

    /// Milliseconds since the Unix epoch for a timestamp value, negative
    /// for pre-epoch times.
    pub(crate) fn epoch_millis(t: SystemTime) -> i64 {
        match t.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_millis() as i64,
            Err(e) => -(e.duration().as_millis() as i64),
        }
    }

    /// Inverse of [`Value::epoch_millis`].
    pub(crate) fn from_epoch_millis(millis: i64) -> SystemTime {
        if millis >= 0 {
            UNIX_EPOCH + Duration::from_millis(millis as u64)
        } else {
            UNIX_EPOCH - Duration::from_millis(millis.unsigned_abs())
        }
    }

    /// Convert the tree into a `serde_json::Value`.
    ///
    /// Fails with an encode error for values JSON cannot carry; this is the
    /// representability check the JSON codec and the struct bridge share.
    pub fn to_json(&self) -> StoreResult<serde_json::Value> {
        match self {
            Value::Int(i) => Ok(serde_json::Value::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| StoreError::Encode {
                    message: format!("float {} is not representable in JSON", f),
                }),
            Value::Bool(b) => Ok(serde_json::Value::from(*b)),
            Value::Text(s) => Ok(serde_json::Value::from(s.clone())),
            Value::Bytes(_) | Value::Timestamp(_) => Err(StoreError::Encode {
                message: format!("{} values are not representable in JSON", self.type_name()),
            }),
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.to_json()?);
                }
                Ok(serde_json::Value::Array(out))
            }
            Value::Map(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), v.to_json()?);
                }
                Ok(serde_json::Value::Object(out))
            }
        }
    }

    /// Build a tree from a `serde_json::Value`.
    ///
    /// Integral numbers become `Int`, everything else numeric becomes
    /// `Float`. JSON `null` has no counterpart in the tree and is rejected
    /// as a decode error (the store expresses absence by removing the key).
    pub fn from_json(json: &serde_json::Value) -> StoreResult<Value> {
        match json {
            serde_json::Value::Null => Err(StoreError::Decode {
                message: "null has no document value representation".to_string(),
                offset: None,
            }),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Float(f))
                } else {
                    Err(StoreError::Decode {
                        message: format!("number {} does not fit i64 or f64", n),
                        offset: None,
                    })
                }
            }
            serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
            serde_json::Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Value::from_json(item)?);
                }
                Ok(Value::List(out))
            }
            serde_json::Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), Value::from_json(v)?);
                }
                Ok(Value::Map(out))
            }
        }
    }

    /// Bridge an arbitrary `Serialize` type into a tree.
    pub fn encode_from<T: Serialize>(value: &T) -> StoreResult<Value> {
        let json = serde_json::to_value(value).map_err(|e| StoreError::Encode {
            message: format!("struct bridge: {}", e),
        })?;
        Value::from_json(&json)
    }

    /// Bridge a tree (or sub-tree) back into a typed struct.
    pub fn decode_as<T: DeserializeOwned>(&self) -> StoreResult<T> {
        let json = self.to_json()?;
        serde_json::from_value(json).map_err(|e| StoreError::Decode {
            message: format!("struct bridge: {}", e),
            offset: None,
        })
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<SystemTime> for Value {
    fn from(v: SystemTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Map> for Value {
    fn from(v: Map) -> Self {
        Value::Map(v)
    }
}

/// Direct leaf type extraction, the fast path of typed reads.
///
/// A `FromValue` impl must not perform structural decoding; the structured
/// fallback lives in [`Value::decode_as`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_int()
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_float()
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_text().map(str::to_string)
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bytes().map(<[u8]>::to_vec)
    }
}

impl FromValue for SystemTime {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_timestamp()
    }
}

impl FromValue for Vec<Value> {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_list().map(<[Value]>::to_vec)
    }
}

impl FromValue for Map {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_map().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Int(1).type_name(), "int");
        assert_eq!(Value::Map(Map::new()).type_name(), "map");
        assert_eq!(Value::Bytes(vec![1]).type_name(), "bytes");
    }

    #[test]
    fn test_json_roundtrip_for_safe_values() {
        let mut map = Map::new();
        map.insert("n".into(), Value::Int(42));
        map.insert("f".into(), Value::Float(1.5));
        map.insert(
            "l".into(),
            Value::List(vec![Value::Bool(true), Value::Text("x".into())]),
        );
        let value = Value::Map(map);

        assert!(value.is_json_safe());
        let json = value.to_json().unwrap();
        assert_eq!(Value::from_json(&json).unwrap(), value);
    }

    #[test]
    fn test_json_rejects_bytes_and_timestamps() {
        assert!(!Value::Bytes(vec![0]).is_json_safe());
        assert!(!Value::Timestamp(SystemTime::now()).is_json_safe());
        assert!(Value::Bytes(vec![0]).to_json().is_err());

        let nested = Value::List(vec![Value::Int(1), Value::Bytes(vec![2])]);
        assert!(!nested.is_json_safe());
        assert!(nested.to_json().is_err());
    }

    #[test]
    fn test_json_rejects_non_finite_floats() {
        assert!(Value::Float(f64::NAN).to_json().is_err());
        assert!(Value::Float(f64::INFINITY).to_json().is_err());
        assert!(Value::Float(0.0).to_json().is_ok());
    }

    #[test]
    fn test_epoch_millis_roundtrip() {
        let t = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(Value::from_epoch_millis(Value::epoch_millis(t)), t);

        let before = UNIX_EPOCH - Duration::from_millis(5_000);
        assert_eq!(Value::from_epoch_millis(Value::epoch_millis(before)), before);
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Login {
        user: String,
        attempts: i64,
    }

    #[test]
    fn test_struct_bridge_roundtrip() {
        let login = Login { user: "ada".into(), attempts: 3 };
        let value = Value::encode_from(&login).unwrap();

        let map = value.as_map().unwrap();
        assert_eq!(map.get("user").unwrap().as_text(), Some("ada"));
        assert_eq!(map.get("attempts").unwrap().as_int(), Some(3));

        let back: Login = value.decode_as().unwrap();
        assert_eq!(back, login);
    }

    #[test]
    fn test_struct_bridge_type_error() {
        let value = Value::Text("not a login".into());
        assert!(value.decode_as::<Login>().is_err());
    }

    #[test]
    fn test_from_value_direct_matches() {
        assert_eq!(i64::from_value(&Value::Int(7)), Some(7));
        assert_eq!(i64::from_value(&Value::Text("7".into())), None);
        assert_eq!(f64::from_value(&Value::Int(2)), Some(2.0));
        assert_eq!(String::from_value(&Value::Text("hi".into())), Some("hi".into()));
        assert_eq!(bool::from_value(&Value::Int(1)), None);
    }
}
