//! Boot-time reconciliation.
//!
//! At every boot the generator produces a fresh configuration. The
//! [`Reconciler`] diffs it against the configuration the generator produced
//! last time and replays only those changes onto the active configuration, so
//! operator edits to blocks the generator did not touch survive the boot.

use bms_block::{apply_patches_to_value, diff_values, sort_patches, validate_schema, Block, Patch, Value};
use tracing::{debug, info};

use crate::error::ReconcileResult;
use crate::settings::ReconcileSettings;
use crate::store::{ConfigStore, PatchLogEntry};

/// What a reconciliation did.
#[derive(Clone, Debug, PartialEq)]
pub enum ReconcileOutcome {
    /// No local config was stored yet; the generated one was adopted.
    FirstBoot,
    /// The generated config equals the stored local config.
    Unchanged,
    /// The active config was patched.
    Applied { patches: Vec<Patch> },
}

/// A reconciliation that has been computed but not stored.
#[derive(Clone, Debug, PartialEq)]
pub struct Preview {
    pub outcome: ReconcileOutcome,
    /// The active config after the reconciliation.
    pub active: Value,
}

enum Plan {
    FirstBoot { seed_active: bool },
    Unchanged { seed_active: bool },
    Apply { patches: Vec<Patch>, active: Value },
}

#[derive(Debug)]
pub struct Reconciler {
    schema: Vec<Block>,
    settings: ReconcileSettings,
}

impl Reconciler {
    /// Create a reconciler, rejecting a schema that does not fold into a
    /// block tree.
    pub fn new(schema: Vec<Block>, settings: ReconcileSettings) -> ReconcileResult<Self> {
        validate_schema(&schema)?;
        Ok(Self { schema, settings })
    }

    /// A reconciler using the schema file named by `settings`.
    pub fn from_settings(settings: ReconcileSettings) -> ReconcileResult<Self> {
        let schema = settings.load_schema()?;
        Self::new(schema, settings)
    }

    /// The block schema every diff runs against.
    pub fn schema(&self) -> &[Block] {
        &self.schema
    }

    /// The settings this reconciler was built from.
    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    /// Reconcile `generated` into `store`.
    ///
    /// The patch log entry is written before the active config, and the local
    /// config last: if the process dies part way, the next boot diffs against
    /// the old local config again. Nothing is written when patching fails.
    pub fn reconcile(
        &self,
        store: &dyn ConfigStore,
        generated: &Value,
    ) -> ReconcileResult<ReconcileOutcome> {
        match self.plan(store, generated)? {
            Plan::FirstBoot { seed_active } => {
                store.set_local_config(generated)?;
                if seed_active {
                    store.set_active_config(generated)?;
                }
                info!(seed_active, "first boot: adopted generated configuration");
                Ok(ReconcileOutcome::FirstBoot)
            }
            Plan::Unchanged { seed_active } => {
                if seed_active {
                    store.set_active_config(generated)?;
                }
                info!(seed_active, "generated configuration unchanged");
                Ok(ReconcileOutcome::Unchanged)
            }
            Plan::Apply { patches, active } => {
                store.save_patches(&PatchLogEntry::now(patches.clone()))?;
                store.set_active_config(&active)?;
                store.set_local_config(generated)?;
                info!(patches = patches.len(), "active configuration patched");
                Ok(ReconcileOutcome::Applied { patches })
            }
        }
    }

    /// Compute what [`reconcile`](Self::reconcile) would do without writing
    /// to the store.
    pub fn preview(&self, store: &dyn ConfigStore, generated: &Value) -> ReconcileResult<Preview> {
        let preview = match self.plan(store, generated)? {
            Plan::FirstBoot { seed_active } => Preview {
                outcome: ReconcileOutcome::FirstBoot,
                active: self.current_active(store, generated, seed_active)?,
            },
            Plan::Unchanged { seed_active } => Preview {
                outcome: ReconcileOutcome::Unchanged,
                active: self.current_active(store, generated, seed_active)?,
            },
            Plan::Apply { patches, active } => Preview {
                outcome: ReconcileOutcome::Applied { patches },
                active,
            },
        };
        Ok(preview)
    }

    fn current_active(
        &self,
        store: &dyn ConfigStore,
        generated: &Value,
        seed_active: bool,
    ) -> ReconcileResult<Value> {
        if seed_active {
            return Ok(generated.clone());
        }
        Ok(store.active_config()?.unwrap_or_else(|| generated.clone()))
    }

    fn plan(&self, store: &dyn ConfigStore, generated: &Value) -> ReconcileResult<Plan> {
        let active = store.active_config()?;
        let Some(local) = store.local_config()? else {
            return Ok(Plan::FirstBoot {
                seed_active: active.is_none(),
            });
        };

        let mut patches = diff_values(&local, generated, &self.schema)?;
        if patches.is_empty() {
            return Ok(Plan::Unchanged {
                seed_active: active.is_none(),
            });
        }
        if self.settings.sort_patches {
            sort_patches(&mut patches);
        }

        let base_is_local = active.is_none();
        let base = active.unwrap_or(local);
        debug!(patches = patches.len(), base_is_local, "applying generated changes");
        let active = apply_patches_to_value(&base, &patches)?;
        Ok(Plan::Apply { patches, active })
    }
}
