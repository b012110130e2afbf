//! Store settings, loaded from a TOML file.

use std::fs;
use std::path::{Path, PathBuf};

use bms_block::{validate_schema, Block};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ReconcileError, ReconcileResult};

/// Where a controller keeps its configuration and how it reconciles it.
///
/// Every field has a default, so a settings file only needs to name what it
/// changes:
///
/// ```toml
/// root = "/var/lib/bms"
/// schema = "schema.json"
/// sort_patches = true
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    /// Directory holding the documents and the patch log.
    pub root: PathBuf,
    pub local_file: PathBuf,
    pub active_file: PathBuf,
    pub patch_log_file: PathBuf,
    /// Sort patches by path before applying and logging them.
    pub sort_patches: bool,
    /// JSON file holding the block schema. No schema means every change
    /// replaces the whole configuration.
    pub schema: Option<PathBuf>,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            local_file: PathBuf::from("local.json"),
            active_file: PathBuf::from("active.json"),
            patch_log_file: PathBuf::from("patches.jsonl"),
            sort_patches: true,
            schema: None,
        }
    }
}

impl ReconcileSettings {
    /// Load settings from a TOML file. Relative `root` and `schema` paths are
    /// taken relative to the directory of the file.
    pub fn load(path: &Path) -> ReconcileResult<Self> {
        let text = fs::read_to_string(path)?;
        let mut settings = Self::from_toml(&text).map_err(|source| ReconcileError::Settings {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(base) = path.parent() {
            settings.root = base.join(&settings.root);
            settings.schema = settings.schema.map(|schema| base.join(schema));
        }
        debug!(path = %path.display(), root = %settings.root.display(), "settings loaded");
        Ok(settings)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// The configured block schema, or an empty one.
    pub fn load_schema(&self) -> ReconcileResult<Vec<Block>> {
        match &self.schema {
            Some(path) => load_schema(path),
            None => Ok(Vec::new()),
        }
    }
}

/// Read a block schema from a JSON array of blocks and check that every
/// nested schema in it is well formed.
pub fn load_schema(path: &Path) -> ReconcileResult<Vec<Block>> {
    let bytes = fs::read(path)?;
    let blocks: Vec<Block> = serde_json::from_slice(&bytes)?;
    validate_schema(&blocks)?;
    debug!(path = %path.display(), blocks = blocks.len(), "schema loaded");
    Ok(blocks)
}
