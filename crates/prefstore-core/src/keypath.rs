//! Key-path parsing and tree traversal
//!
//! A key path is a dot-delimited address into nested maps, e.g. `"a.b.c"`.
//! Empty segments are dropped while splitting, so `"a..b."` addresses the
//! same node as `"a.b"`; a path with no usable segments at all is a caller
//! error.
//!
//! Writes create empty intermediate maps on the way down. Both reads and
//! writes fail with `TypeMismatch` when an existing non-map value sits
//! where the path needs to descend — the tree is left untouched in that
//! case because callers mutate a cloned snapshot and only publish it on
//! success.

use hashbrown::hash_map::Entry;

use crate::error::{StoreError, StoreResult};
use crate::value::{Map, Value};

/// Split a raw key path into segments.
pub fn split_key_path(raw: &str) -> StoreResult<Vec<&str>> {
    let segments: Vec<&str> = raw.split('.').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(StoreError::InvalidKeyPath { raw: raw.to_string() });
    }
    Ok(segments)
}

/// Resolve a key path against a tree without modifying it.
///
/// `Ok(None)` means the path is simply absent; `Err(TypeMismatch)` means a
/// non-map value blocked the descent.
pub fn lookup<'a>(
    root: &'a Map,
    key_path: &str,
    segments: &[&str],
) -> StoreResult<Option<&'a Value>> {
    let (leaf, intermediates) = segments.split_last().expect("segments are never empty");

    let mut node = root;
    for segment in intermediates {
        match node.get(*segment) {
            None => return Ok(None),
            Some(Value::Map(inner)) => node = inner,
            Some(other) => {
                return Err(StoreError::TypeMismatch {
                    key_path: key_path.to_string(),
                    segment: (*segment).to_string(),
                    found: other.type_name(),
                })
            }
        }
    }
    Ok(node.get(*leaf))
}

/// Store `Some(value)` at, or remove (`None`) the value under, a key path.
///
/// Missing intermediate maps are created on the way down for a store;
/// removal through a missing intermediate is a no-op and creates nothing.
pub fn store(
    root: &mut Map,
    key_path: &str,
    segments: &[&str],
    value: Option<Value>,
) -> StoreResult<()> {
    let (first, rest) = segments.split_first().expect("segments are never empty");

    if rest.is_empty() {
        match value {
            Some(value) => {
                root.insert((*first).to_string(), value);
            }
            None => {
                root.remove(*first);
            }
        }
        return Ok(());
    }

    match root.entry((*first).to_string()) {
        Entry::Occupied(mut occupied) => match occupied.get_mut() {
            Value::Map(inner) => store(inner, key_path, rest, value),
            other => Err(StoreError::TypeMismatch {
                key_path: key_path.to_string(),
                segment: (*first).to_string(),
                found: other.type_name(),
            }),
        },
        Entry::Vacant(vacant) => {
            if value.is_none() {
                // Removing under a path that does not exist: nothing to do.
                return Ok(());
            }
            let mut inner = Map::new();
            store(&mut inner, key_path, rest, value)?;
            vacant.insert(Value::Map(inner));
            Ok(())
        }
    }
}
