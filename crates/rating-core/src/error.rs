//! Error types for rating-core

use thiserror::Error;

/// Result type alias for rating-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for domain operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Generic error message
    #[error("{0}")]
    Generic(String),

    /// A stock or provider identifier does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A value could not be parsed into a domain type
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The stock store rejected an operation
    #[error("Store error: {0}")]
    Store(String),
}
