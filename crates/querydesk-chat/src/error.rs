//! Error types for the query engine and intent router.

use serde::{Deserialize, Serialize};

/// Errors from the intent router and conversation store.
///
/// Backend failures are not part of this enum: they are reported inside a
/// turn outcome so the caller can answer the user without treating the turn
/// as a crash.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("router is disabled")]
    Disabled,
    #[error("user id cannot be empty")]
    EmptyUserId,
    #[error("query violates schema: {0}")]
    SchemaViolation(#[from] QueryViolation),
    #[error("storage error: {0}")]
    StorageError(String),
}

/// Errors raised while constructing a [`crate::SchemaCatalog`].
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("schema declares no dimensions and no measures")]
    Empty,
    #[error("field key cannot be empty")]
    EmptyFieldKey,
    #[error("duplicate field key: {0}")]
    DuplicateField(String),
    #[error("invalid schema document: {0}")]
    Document(String),
    #[error("cannot read schema document: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Document(err.to_string())
    }
}

/// A built query that breaks the schema contract.
///
/// Only produced by [`crate::Query::validate`]; the builder never emits a
/// query that fails it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryViolation {
    #[error("query has no fields")]
    EmptyFields,
    #[error("query model is empty")]
    MissingModel,
    #[error("query view is empty")]
    MissingView,
    #[error("query limit is zero")]
    ZeroLimit,
    #[error("unknown field '{field}' in {location}")]
    UnknownField {
        location: &'static str,
        field: String,
    },
}

/// Failure reported by an analytics backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendError {
    #[error("backend timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    #[error("backend rejected query with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed backend response: {message}")]
    Malformed { message: String },
    #[error("backend transport error: {message}")]
    Transport { message: String },
}
