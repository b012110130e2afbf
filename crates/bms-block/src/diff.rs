//! Structural diff under a block schema.
//!
//! Compares two values and emits the patches that turn the first into the
//! second. Regions named by the schema get their own patches instead of being
//! folded into a replacement of their parent, so that two authors editing
//! different blocks of the same configuration never overwrite each other.
//!
//! The output is not sorted; use [`sort_patches`](crate::sort_patches) when a
//! deterministic order is needed.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::block::Block;
use crate::error::BlockResult;
use crate::patch::Patch;
use crate::path::{Path, PathSegment};
use crate::tree::{BlockNode, BlockTree};
use crate::value::{Map, Scalar, Value};

/// Diff two serializable values under `blocks`.
///
/// Both inputs are normalized through serde first, so any two types with the
/// same serialized shape compare structurally. Fails only if an input cannot
/// be serialized or the schema is invalid.
pub fn diff<A, B>(a: &A, b: &B, blocks: &[Block]) -> BlockResult<Vec<Patch>>
where
    A: Serialize + ?Sized,
    B: Serialize + ?Sized,
{
    let a = Value::from_serialize(a)?;
    let b = Value::from_serialize(b)?;
    diff_values(&a, &b, blocks)
}

/// Diff two already-normalized values under `blocks`.
pub fn diff_values(a: &Value, b: &Value, blocks: &[Block]) -> BlockResult<Vec<Patch>> {
    let tree = BlockTree::build(blocks)?;
    let mut patches = Vec::new();
    diff_value(a, b, None, &tree, &Path::root(), &mut patches)?;
    debug!(patches = patches.len(), "diff complete");
    Ok(patches)
}

/// `block` governs the value itself (array identity); `fields` governs the
/// members of the value when it is an object.
fn diff_value<'a>(
    a: &Value,
    b: &Value,
    block: Option<&'a Block>,
    fields: &BlockTree<'a>,
    path: &Path,
    out: &mut Vec<Patch>,
) -> BlockResult<()> {
    if a == b {
        return Ok(());
    }
    match (a, b) {
        (Value::Object(a_map), Value::Object(b_map)) => {
            diff_objects(a_map, b_map, fields, path, out)
        }
        (Value::Array(a_items), Value::Array(b_items)) => {
            match block.and_then(|blk| blk.key.as_deref().map(|key| (blk, key))) {
                Some((blk, key)) => diff_keyed_arrays(a_items, b_items, blk, key, path, out),
                None => {
                    out.push(Patch::replace(path.clone(), b.clone()));
                    Ok(())
                }
            }
        }
        _ => {
            out.push(Patch::replace(path.clone(), b.clone()));
            Ok(())
        }
    }
}

fn diff_objects<'a>(
    a: &Map,
    b: &Map,
    fields: &BlockTree<'a>,
    path: &Path,
    out: &mut Vec<Patch>,
) -> BlockResult<()> {
    let a_shell = a.iter().filter(|(k, _)| !fields.contains(k));
    let b_shell = b.iter().filter(|(k, _)| !fields.contains(k));
    if !a_shell.eq(b_shell) {
        let shell: Map = b
            .iter()
            .map(|(k, v)| {
                let v = if fields.contains(k) { Value::Ignore } else { v.clone() };
                (k.clone(), v)
            })
            .collect();
        out.push(Patch::replace(path.clone(), Value::Object(shell)));
    }

    let governed: BTreeSet<&String> = a
        .keys()
        .chain(b.keys())
        .filter(|k| fields.contains(k))
        .collect();

    for field in governed {
        let Some(node) = fields.get(field) else {
            continue;
        };
        let field_path = path.child(PathSegment::Field(field.clone()));
        match (a.get(field), b.get(field)) {
            (Some(av), Some(bv)) => diff_node(av, bv, node, &field_path, out)?,
            (None, Some(bv)) => {
                let before = out.len();
                diff_node(&bv.zero(), bv, node, &field_path, out)?;
                if out.len() == before {
                    out.push(Patch::replace(field_path, bv.clone()));
                }
            }
            (Some(_), None) => out.push(Patch::delete(field_path)),
            (None, None) => {}
        }
    }
    Ok(())
}

fn diff_node<'a>(
    a: &Value,
    b: &Value,
    node: &BlockNode<'a>,
    path: &Path,
    out: &mut Vec<Patch>,
) -> BlockResult<()> {
    match node {
        BlockNode::Leaf(block) => {
            let nested = BlockTree::build(&block.blocks)?;
            diff_value(a, b, Some(*block), &nested, path, out)
        }
        BlockNode::Branch(subtree) => diff_value(a, b, None, subtree, path, out),
    }
}

fn diff_keyed_arrays(
    a: &[Value],
    b: &[Value],
    block: &Block,
    key: &str,
    path: &Path,
    out: &mut Vec<Patch>,
) -> BlockResult<()> {
    let (Some(a_index), Some(b_index)) = (KeyedIndex::build(a, key), KeyedIndex::build(b, key))
    else {
        debug!(%path, key, "keyed array holds elements without a scalar key; replacing it whole");
        out.push(Patch::replace(path.clone(), Value::Array(b.to_vec())));
        return Ok(());
    };

    for (id, (elem, _)) in a_index.iter() {
        if !b_index.contains(id) {
            out.push(Patch::delete(path.child(PathSegment::elem(key, elem.clone()))));
        }
    }

    for (id, (elem, b_item)) in b_index.iter() {
        let elem_path = path.child(PathSegment::elem(key, elem.clone()));
        let Some((_, a_item)) = a_index.get(id) else {
            out.push(Patch::replace(elem_path, (*b_item).clone()));
            continue;
        };
        if a_item == b_item {
            continue;
        }

        let a_type = block.type_key.as_deref().and_then(|t| a_item.get(t));
        let b_type = block.type_key.as_deref().and_then(|t| b_item.get(t));
        if a_type != b_type {
            out.push(Patch::replace(elem_path, (*b_item).clone()));
            continue;
        }

        let type_name = match b_type {
            Some(Value::Scalar(Scalar::String(name))) => Some(name.as_str()),
            _ => None,
        };
        let nested = BlockTree::build(block.blocks_for_type(type_name))?;
        diff_value(a_item, b_item, None, &nested, &elem_path, out)?;
    }
    Ok(())
}

/// Array elements looked up by their key value, in first-seen order.
///
/// A repeated key keeps the last element carrying it.
struct KeyedIndex<'v> {
    order: Vec<String>,
    entries: HashMap<String, (Scalar, &'v Value)>,
}

impl<'v> KeyedIndex<'v> {
    /// `None` if an element is not an object or its key is not a scalar. A
    /// missing key field reads as `null`.
    fn build(items: &'v [Value], key: &str) -> Option<Self> {
        let mut index = KeyedIndex {
            order: Vec::new(),
            entries: HashMap::with_capacity(items.len()),
        };
        for item in items {
            let Value::Object(map) = item else {
                return None;
            };
            let elem = match map.get(key) {
                None => Scalar::Null,
                Some(Value::Scalar(s)) => s.clone(),
                Some(_) => return None,
            };
            let id = elem.identity();
            if index.entries.insert(id.clone(), (elem, item)).is_none() {
                index.order.push(id);
            }
        }
        Some(index)
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &(Scalar, &'v Value))> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).map(|entry| (id, entry)))
    }

    fn get(&self, id: &str) -> Option<&(Scalar, &'v Value)> {
        self.entries.get(id)
    }

    fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }
}
