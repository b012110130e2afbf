//! Structural block diff and patch engine.
//!
//! Compares two hierarchical configuration values under a caller-supplied
//! schema of independently diffable regions ("blocks") and produces a minimal
//! list of patches that can be replayed onto any structurally compatible base.
//! This is what lets a configuration generator and a live operator edit the
//! same configuration without clobbering each other: only the blocks the
//! generator actually changed are carried over.
//!
//! # Key Types
//!
//! - [`Value`] / [`Scalar`] -- normalized JSON-shaped tree, with the [`Value::Ignore`] sentinel
//! - [`Path`] / [`PathSegment`] -- location in a tree, e.g. `/spaces[name="kitchen"]/hvac`
//! - [`Block`] -- schema node marking an independently diffable region
//! - [`Patch`] -- one replace or delete at a path
//!
//! # Example
//!
//! ```
//! use bms_block::{apply_patches_to_value, diff_values, Block, Value};
//! use serde_json::json;
//!
//! let schema = vec![Block::new(["objects"]).with_key("id")];
//! let generated_v1 = Value::from(json!({"objects": [{"id": 1, "addr": "foo"}]}));
//! let generated_v2 = Value::from(json!({"objects": [{"id": 1, "addr": "bar"}]}));
//! let active = Value::from(json!({"objects": [{"id": 1, "addr": "foo"}], "note": "edited"}));
//!
//! let patches = diff_values(&generated_v1, &generated_v2, &schema).unwrap();
//! assert_eq!(patches[0].path.to_string(), "/objects[id=1]");
//!
//! let updated = apply_patches_to_value(&active, &patches).unwrap();
//! assert_eq!(
//!     updated,
//!     Value::from(json!({"objects": [{"id": 1, "addr": "bar"}], "note": "edited"}))
//! );
//! ```

pub mod apply;
pub mod block;
pub mod diff;
pub mod error;
pub mod patch;
pub mod path;
pub mod tree;
pub mod value;

#[cfg(test)]
mod laws;

pub use apply::{apply_patches, apply_patches_to_value};
pub use block::Block;
pub use diff::{diff, diff_values};
pub use error::{BlockError, BlockResult};
pub use patch::{sort_patches, Patch};
pub use path::{compare_paths, parse_path, Path, PathParseError, PathSegment};
pub use tree::{validate_schema, BlockNode, BlockTree};
pub use value::{Map, Scalar, Value, ValueKind};
