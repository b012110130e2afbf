//! In-memory configuration store for tests and embedding.
//!
//! [`InMemoryConfigStore`] keeps both documents and the patch log behind
//! `RwLock`s. Data is lost when the store is dropped.

use std::sync::RwLock;

use bms_block::Value;

use crate::error::{ReconcileError, ReconcileResult};
use crate::store::{ConfigStore, PatchLogEntry};

#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    local: RwLock<Option<Value>>,
    active: RwLock<Option<Value>>,
    log: RwLock<Vec<PatchLogEntry>>,
}

impl InMemoryConfigStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds a local and an active config, as after a
    /// previous boot.
    pub fn with_configs(local: Value, active: Value) -> Self {
        Self {
            local: RwLock::new(Some(local)),
            active: RwLock::new(Some(active)),
            log: RwLock::new(Vec::new()),
        }
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> ReconcileError {
    ReconcileError::LockPoisoned(e.to_string())
}

impl ConfigStore for InMemoryConfigStore {
    fn local_config(&self) -> ReconcileResult<Option<Value>> {
        Ok(self.local.read().map_err(poisoned)?.clone())
    }

    fn set_local_config(&self, config: &Value) -> ReconcileResult<()> {
        *self.local.write().map_err(poisoned)? = Some(config.clone());
        Ok(())
    }

    fn active_config(&self) -> ReconcileResult<Option<Value>> {
        Ok(self.active.read().map_err(poisoned)?.clone())
    }

    fn set_active_config(&self, config: &Value) -> ReconcileResult<()> {
        *self.active.write().map_err(poisoned)? = Some(config.clone());
        Ok(())
    }

    fn save_patches(&self, entry: &PatchLogEntry) -> ReconcileResult<()> {
        self.log.write().map_err(poisoned)?.push(entry.clone());
        Ok(())
    }

    fn patch_log(&self) -> ReconcileResult<Vec<PatchLogEntry>> {
        Ok(self.log.read().map_err(poisoned)?.clone())
    }
}
