//! Error types for the block engine.

use crate::path::{Path, PathParseError};
use crate::value::ValueKind;

/// Errors that can occur while diffing or applying patches.
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    /// An input could not be normalized through serde.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A path string did not match the path grammar.
    #[error(transparent)]
    PathParse(#[from] PathParseError),

    /// A programmatic path segment object did not have exactly one key.
    #[error("invalid path segment: {0}")]
    InvalidPathSegment(String),

    /// The block schema cannot be folded into a block tree.
    #[error("invalid block schema: {0}")]
    InvalidSchema(String),

    /// A field segment met something other than an object.
    #[error("expected object at {path}, found {found}")]
    NotAnObject { path: Path, found: ValueKind },

    /// An array element segment met something other than an array.
    #[error("expected array at {path}, found {found}")]
    NotAnArray { path: Path, found: ValueKind },

    /// A deletion targeted the root value.
    #[error("cannot delete the root")]
    DeleteRoot,

    /// One patch of a list failed; nothing from the list was applied.
    #[error("patch {index} at {path} failed: {source}")]
    PatchFailed {
        index: usize,
        path: Path,
        #[source]
        source: Box<BlockError>,
    },
}

/// Convenience alias for block engine results.
pub type BlockResult<T> = Result<T, BlockError>;
