//! Patch records produced by the diff engine and consumed by the apply engine.

use serde::{Deserialize, Serialize};

use crate::path::{compare_paths, Path};
use crate::value::Value;

/// One recorded change at a [`Path`].
///
/// A replace patch (`deleted == false`) fully replaces the addressed location,
/// except where [`Value::Ignore`] appears inside `value`. A delete patch
/// removes the addressed object field or array element; its `value` carries no
/// meaning.
///
/// Wire format: `{"path": "/objects[id=2]", "value": {...}, "deleted": false}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub path: Path,
    #[serde(default = "Value::null")]
    pub value: Value,
    #[serde(default)]
    pub deleted: bool,
}

impl Patch {
    pub fn replace(path: Path, value: Value) -> Self {
        Self {
            path,
            value,
            deleted: false,
        }
    }

    pub fn delete(path: Path) -> Self {
        Self {
            path,
            value: Value::null(),
            deleted: true,
        }
    }
}

/// Sort patches by [`compare_paths`]. The sort is stable, so patches at the
/// same path keep their relative order.
pub fn sort_patches(patches: &mut [Patch]) {
    patches.sort_by(|a, b| compare_paths(&a.path, &b.path));
}
