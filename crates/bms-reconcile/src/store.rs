//! The [`ConfigStore`] trait: where the reconciler keeps its documents.
//!
//! A store holds two configurations and one log:
//!
//! - the **local** config, the last configuration produced by the generator;
//! - the **active** config, the configuration the controller runs with, which
//!   an operator may have edited by hand;
//! - the **patch log**, one [`PatchLogEntry`] per boot that changed something.

use bms_block::{Patch, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReconcileResult;

/// Patches applied to the active config during one reconciliation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchLogEntry {
    pub timestamp: DateTime<Utc>,
    pub patches: Vec<Patch>,
}

impl PatchLogEntry {
    /// Stamp `patches` with the current time.
    pub fn now(patches: Vec<Patch>) -> Self {
        Self {
            timestamp: Utc::now(),
            patches,
        }
    }
}

/// Storage backend for reconciled configuration.
///
/// Implementations must be thread-safe (`Send + Sync`). Reads return
/// `Ok(None)` for a document that has never been written.
pub trait ConfigStore: Send + Sync {
    /// The last generated configuration.
    fn local_config(&self) -> ReconcileResult<Option<Value>>;

    fn set_local_config(&self, config: &Value) -> ReconcileResult<()>;

    /// The configuration the controller runs with.
    fn active_config(&self) -> ReconcileResult<Option<Value>>;

    fn set_active_config(&self, config: &Value) -> ReconcileResult<()>;

    /// Append an entry to the patch log.
    fn save_patches(&self, entry: &PatchLogEntry) -> ReconcileResult<()>;

    /// All log entries, oldest first.
    fn patch_log(&self) -> ReconcileResult<Vec<PatchLogEntry>>;
}
