//! Block schema: the caller's declaration of independently diffable regions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A region of a configuration tree that is diffed and patched on its own.
///
/// `path` is the chain of field names leading from the enclosing object to the
/// region and is never empty. When the region is an array, `key` names the
/// element field that identifies an element across versions. `type_key`
/// names the element field that selects a per-type sub-schema from
/// `blocks_by_type`; elements whose type has no entry use `blocks`.
///
/// Schemas are usually loaded from JSON:
///
/// ```
/// use bms_block::Block;
///
/// let schema: Vec<Block> = serde_json::from_str(r#"[
///     {"path": ["drivers"], "key": "name", "typeKey": "type",
///      "blocksByType": {"modbus": [{"path": ["devices"], "key": "id"}]}}
/// ]"#).unwrap();
/// assert_eq!(schema[0].key.as_deref(), Some("name"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_key: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub blocks_by_type: BTreeMap<String, Vec<Block>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
}

impl Block {
    /// A block at the given field-name chain.
    pub fn new<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_type_key(mut self, type_key: impl Into<String>) -> Self {
        self.type_key = Some(type_key.into());
        self
    }

    /// Sub-schema for array elements whose `type_key` field equals `type_name`.
    pub fn with_type_blocks(mut self, type_name: impl Into<String>, blocks: Vec<Block>) -> Self {
        self.blocks_by_type.insert(type_name.into(), blocks);
        self
    }

    pub fn with_blocks(mut self, blocks: Vec<Block>) -> Self {
        self.blocks = blocks;
        self
    }

    /// The nested schema for an element of the given type.
    pub(crate) fn blocks_for_type(&self, type_name: Option<&str>) -> &[Block] {
        type_name
            .and_then(|t| self.blocks_by_type.get(t))
            .unwrap_or(&self.blocks)
    }
}
