//! Error types for configuration reconciliation.

use std::path::PathBuf;

use bms_block::BlockError;
use thiserror::Error;

/// Errors that can occur while storing or reconciling configuration.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Diffing or patching failed.
    #[error(transparent)]
    Block(#[from] BlockError),

    /// I/O error in a file-backed store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The settings file is not valid TOML for [`ReconcileSettings`](crate::ReconcileSettings).
    #[error("invalid settings in {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A write was attempted on a store opened read-only.
    #[error("store at {} is read-only", .0.display())]
    ReadOnly(PathBuf),

    /// A store lock was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl From<serde_json::Error> for ReconcileError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience type alias for reconciliation operations.
pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;
