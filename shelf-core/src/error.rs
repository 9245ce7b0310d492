//! Error types and result types for query-layer operations.
//!
//! Every fallible operation in the workspace returns [`StoreResult<T>`]. Connectors surface
//! native driver failures as [`StoreError::Store`] without reinterpreting them; the façade
//! passes errors through untouched so that business logic can decide how to present them.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when working with the query layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A document or patch violates its schema descriptor before reaching the store.
    #[error("Validation error: {0}")]
    Validation(String),
    /// A filter matched nothing where the caller treats that as an error.
    /// The argument is the entity name.
    #[error("Nothing matched in entity {0}")]
    NotFound(String),
    /// A unique field collides with an existing document.
    /// The first argument is the entity name, the second is the field name.
    #[error("Value of unique field {1} already exists in entity {0}")]
    Conflict(String, String),
    /// Opaque failure reported by the underlying document store.
    #[error("Store error: {0}")]
    Store(String),
    /// Serialization/deserialization error when converting between formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during connector initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A filter or search string could not be interpreted.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// A specialized `Result` type for query-layer operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<BsonError> for StoreError {
    fn from(err: BsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for StoreError {
    fn from(err: SerdeJsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Errors raised while parsing a search string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A `"` was opened and never closed.
    #[error("unterminated quote starting at byte {0}")]
    UnterminatedQuote(usize),
    /// A `(` was opened and never closed.
    #[error("unclosed bracket starting at byte {0}")]
    UnclosedBracket(usize),
    /// A `)` appeared without a matching `(`.
    #[error("unexpected closing bracket at byte {0}")]
    UnexpectedClosingBracket(usize),
    /// A `(` appeared inside another bracket group.
    #[error("nested bracket at byte {0}")]
    NestedBracket(usize),
}

impl From<ParseError> for StoreError {
    fn from(err: ParseError) -> Self {
        StoreError::InvalidQuery(err.to_string())
    }
}
