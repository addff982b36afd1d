//! Error types for LazyQuery
//!
//! Every fallible operation in the crate returns `Result<_, ViewError>`.
//! Collaborator implementations (`Query`, `QueryFactory`) report failures as
//! a boxed [`QueryError`]; the view wraps those into `Persistence` or
//! `Construction` depending on the call that failed.

use crate::value::PropertyType;
use thiserror::Error;

/// Error type returned by `Query` and `QueryFactory` implementations.
pub type QueryError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ViewError {
    /// `construct_item()` failed in the backing query.
    #[error("failed to construct item: {0}")]
    Construction(#[source] QueryError),

    #[error("index {index} out of range [0, {size})")]
    IndexOutOfRange { index: usize, size: usize },

    /// Operation intentionally not provided by the lazy access pattern.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Load, count, save or delete failed in the backing query.
    #[error("persistence error: {0}")]
    Persistence(#[source] QueryError),

    #[error("property '{0}' not found")]
    UnknownProperty(String),

    #[error("property '{0}' is read-only")]
    ReadOnly(String),

    #[error("type mismatch for property '{property}': expected {expected:?}, got {actual}")]
    TypeMismatch {
        property: String,
        expected: PropertyType,
        actual: String,
    },

    #[error("invalid sort: {0}")]
    InvalidSort(String),

    /// Refresh was refused because buffered mutations are pending.
    #[error("view has {0} uncommitted buffered change(s)")]
    PendingChanges(usize),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ViewError {
    pub(crate) fn out_of_range(index: usize, size: usize) -> Self {
        ViewError::IndexOutOfRange { index, size }
    }
}

impl From<serde_json::Error> for ViewError {
    fn from(err: serde_json::Error) -> Self {
        ViewError::Config(err.to_string())
    }
}
