//! Boot-time reconciliation of generated and operator-edited configuration.
//!
//! A controller keeps two copies of its configuration: the one its generator
//! produced last (the *local* config) and the one it runs with (the *active*
//! config), which operators may edit. On boot, [`Reconciler::reconcile`] diffs
//! the previous and the fresh generation under a block schema and patches the
//! active config with just those changes.
//!
//! # Modules
//!
//! - [`store`] -- the [`ConfigStore`] trait and [`PatchLogEntry`]
//! - [`memory`] -- [`InMemoryConfigStore`] for tests and embedding
//! - [`file`] -- [`FileConfigStore`], JSON documents plus an append-only patch log
//! - [`settings`] -- [`ReconcileSettings`] loaded from TOML, schema loading
//! - [`reconcile`] -- the [`Reconciler`] itself

pub mod error;
pub mod file;
pub mod memory;
pub mod reconcile;
pub mod settings;
pub mod store;

pub use error::{ReconcileError, ReconcileResult};
pub use file::FileConfigStore;
pub use memory::InMemoryConfigStore;
pub use reconcile::{Preview, ReconcileOutcome, Reconciler};
pub use settings::{load_schema, ReconcileSettings};
pub use store::{ConfigStore, PatchLogEntry};
