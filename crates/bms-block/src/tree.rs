//! Block tree: a trie over block field-name chains.
//!
//! Built once per diff scope so that, while walking an object, the engine can
//! decide in one lookup per field whether the field is block-governed and by
//! what. A leaf corresponds to exactly one [`Block`]; a branch is an
//! intermediate field on the way to deeper blocks and carries no block itself.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::block::Block;
use crate::error::{BlockError, BlockResult};

#[derive(Debug, Default)]
pub struct BlockTree<'a> {
    children: BTreeMap<&'a str, BlockNode<'a>>,
}

#[derive(Debug)]
pub enum BlockNode<'a> {
    Leaf(&'a Block),
    Branch(BlockTree<'a>),
}

impl<'a> BlockTree<'a> {
    /// Fold a flat block list into a trie.
    ///
    /// Fails if a block has an empty path or if two block paths are equal or
    /// one is a prefix of the other.
    pub fn build(blocks: &'a [Block]) -> BlockResult<Self> {
        let mut tree = BlockTree::default();
        for block in blocks {
            tree.insert(block, &block.path)?;
        }
        Ok(tree)
    }

    fn insert(&mut self, block: &'a Block, rest: &'a [String]) -> BlockResult<()> {
        let Some((head, tail)) = rest.split_first() else {
            return Err(BlockError::InvalidSchema(
                "block path must not be empty".to_string(),
            ));
        };

        if tail.is_empty() {
            return match self.children.entry(head.as_str()) {
                Entry::Vacant(slot) => {
                    slot.insert(BlockNode::Leaf(block));
                    Ok(())
                }
                Entry::Occupied(_) => Err(overlap(block)),
            };
        }

        let node = self
            .children
            .entry(head.as_str())
            .or_insert_with(|| BlockNode::Branch(BlockTree::default()));
        match node {
            BlockNode::Branch(subtree) => subtree.insert(block, tail),
            BlockNode::Leaf(_) => Err(overlap(block)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&BlockNode<'a>> {
        self.children.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.children.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Check that every block tree reachable from `blocks` can be built.
///
/// Diffing builds nested trees lazily, so a bad nested schema would otherwise
/// only surface once a diff reaches it.
pub fn validate_schema(blocks: &[Block]) -> BlockResult<()> {
    BlockTree::build(blocks)?;
    for block in blocks {
        validate_schema(&block.blocks)?;
        for nested in block.blocks_by_type.values() {
            validate_schema(nested)?;
        }
    }
    Ok(())
}

fn overlap(block: &Block) -> BlockError {
    BlockError::InvalidSchema(format!(
        "block path {:?} overlaps another block",
        block.path
    ))
}
