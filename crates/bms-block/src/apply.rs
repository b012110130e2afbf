//! Patch application.
//!
//! Each patch walks its path into the base value one segment at a time,
//! synthesizing missing objects and arrays on the way, and performs a local
//! replace or delete at the end of the path. A list of patches is applied as a
//! unit: the first failing patch aborts the call and the caller's value is left
//! untouched.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{BlockError, BlockResult};
use crate::patch::Patch;
use crate::path::{Path, PathSegment};
use crate::value::{Map, Scalar, Value};

/// Apply `patches` to a serializable value and convert the result back.
pub fn apply_patches<T>(data: &T, patches: &[Patch]) -> BlockResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let base = Value::from_serialize(data)?;
    apply_patches_to_value(&base, patches)?.into_deserialize()
}

/// Apply `patches` in order to a copy of `base`.
pub fn apply_patches_to_value(base: &Value, patches: &[Patch]) -> BlockResult<Value> {
    let mut current = Some(base.clone());
    for (index, patch) in patches.iter().enumerate() {
        current = apply_at(current, patch.path.segments(), patch, &Path::root()).map_err(
            |source| BlockError::PatchFailed {
                index,
                path: patch.path.clone(),
                source: Box::new(source),
            },
        )?;
    }
    debug!(patches = patches.len(), "patches applied");
    Ok(current.unwrap_or_else(Value::null))
}

/// `node` is `None` when the location does not exist yet. Returns the new
/// value of the location, `None` if it still does not exist.
fn apply_at(
    node: Option<Value>,
    segments: &[PathSegment],
    patch: &Patch,
    at: &Path,
) -> BlockResult<Option<Value>> {
    let Some((segment, rest)) = segments.split_first() else {
        if patch.deleted {
            return Err(BlockError::DeleteRoot);
        }
        return Ok(patch_value(node, &patch.value));
    };

    // Nothing to delete below a location that does not exist.
    if patch.deleted && node.is_none() {
        return Ok(None);
    }

    match segment {
        PathSegment::Field(name) => {
            let mut map = match node {
                None => Map::new(),
                Some(Value::Object(map)) => map,
                Some(other) => {
                    return Err(BlockError::NotAnObject {
                        path: at.clone(),
                        found: other.kind(),
                    })
                }
            };
            if rest.is_empty() && patch.deleted {
                map.remove(name);
                return Ok(Some(Value::Object(map)));
            }
            let child = map.remove(name);
            if let Some(updated) = apply_at(child, rest, patch, &at.child(segment.clone()))? {
                map.insert(name.clone(), updated);
            }
            Ok(Some(Value::Object(map)))
        }
        PathSegment::ArrayElem { key, elem } => {
            let mut items = match node {
                None => Vec::new(),
                Some(Value::Array(items)) => items,
                Some(other) => {
                    return Err(BlockError::NotAnArray {
                        path: at.clone(),
                        found: other.kind(),
                    })
                }
            };
            // First match wins, even when the array repeats a key.
            let found = items.iter().position(|item| element_matches(item, key, elem));
            if rest.is_empty() && patch.deleted {
                if let Some(i) = found {
                    items.remove(i);
                }
                return Ok(Some(Value::Array(items)));
            }

            let elem_path = at.child(segment.clone());
            match found {
                Some(i) => {
                    let current = std::mem::replace(&mut items[i], Value::null());
                    match apply_at(Some(current), rest, patch, &elem_path)? {
                        Some(updated) => items[i] = updated,
                        None => {
                            items.remove(i);
                        }
                    }
                }
                None => {
                    if let Some(mut created) = apply_at(None, rest, patch, &elem_path)? {
                        // A new element must carry its key to be found again.
                        if let Value::Object(map) = &mut created {
                            if !matches!(elem, Scalar::Null) {
                                map.entry(key.clone())
                                    .or_insert_with(|| Value::Scalar(elem.clone()));
                            }
                        }
                        items.push(created);
                    }
                }
            }
            Ok(Some(Value::Array(items)))
        }
    }
}

/// A missing key field matches a `null` selector.
fn element_matches(item: &Value, key: &str, elem: &Scalar) -> bool {
    match item.get(key) {
        Some(Value::Scalar(s)) => s == elem,
        Some(_) => false,
        None => matches!(item, Value::Object(_)) && matches!(elem, Scalar::Null),
    }
}

fn patch_value(dst: Option<Value>, value: &Value) -> Option<Value> {
    match (dst, value) {
        (dst, Value::Ignore) => dst,
        (Some(Value::Object(dst)), Value::Object(patch)) => {
            Some(Value::Object(patch_map(dst, patch)))
        }
        (_, Value::Object(patch)) => Some(Value::Object(patch_map(Map::new(), patch))),
        (_, value) => strip_ignore(value),
    }
}

/// Replace `dst` with `patch`, keeping `dst`'s member wherever `patch` holds
/// `Ignore`. Members are replaced whole; there is no deep merge.
fn patch_map(mut dst: Map, patch: &Map) -> Map {
    let mut out = Map::new();
    for (key, value) in patch {
        if value.is_ignore() {
            if let Some(existing) = dst.remove(key) {
                out.insert(key.clone(), existing);
            }
        } else if let Some(value) = strip_ignore(value) {
            out.insert(key.clone(), value);
        }
    }
    out
}

/// A copy of `value` with every nested `Ignore` dropped.
fn strip_ignore(value: &Value) -> Option<Value> {
    match value {
        Value::Ignore => None,
        Value::Object(map) => Some(Value::Object(
            map.iter()
                .filter_map(|(k, v)| strip_ignore(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
        Value::Array(items) => Some(Value::Array(items.iter().filter_map(strip_ignore).collect())),
        Value::Scalar(_) => Some(value.clone()),
    }
}
