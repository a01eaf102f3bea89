//! Error types for all querydoc operations.

use thiserror::Error;

/// Top-level error type for querydoc operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Errors raised while constructing an expression node.
///
/// Builder facades validate their arguments eagerly so that a malformed
/// expression fails where it is written, not where it is later rendered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("field path must not be empty")]
    EmptyFieldPath,

    #[error("typed field reference has no member segments")]
    EmptyMemberChain,

    #[error("typed field reference contains an empty member name")]
    EmptyMemberName,

    #[error("text search string must not be empty")]
    EmptySearchText,

    #[error("rename target must not be empty")]
    EmptyRenameTarget,

    #[error("array size bound {bound} cannot be rewritten as an index existence check")]
    SizeBoundOutOfRange { bound: u64 },

    #[error("polygon requires at least three vertices, got {got}")]
    DegeneratePolygon { got: usize },
}

/// Errors raised while rendering an expression node against a schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("the schema for field '{field}' does not describe an array")]
    NotAnArrayField { field: String },

    #[error("typed field '{path}' on '{declaring}' could not be resolved: {reason}")]
    UnresolvedTypedField {
        path: String,
        declaring: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
