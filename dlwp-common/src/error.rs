//! Common error types for DLWP

use thiserror::Error;

/// Common result type for DLWP operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared across the DLWP crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// An active rule row names a predicate that is not registered.
    /// Aborts a QC run before any row is touched.
    #[error("Unknown rule predicate: {0}")]
    UnknownRule(String),

    /// The rule configuration store holds no active rules
    #[error("No active QC rules configured")]
    NoActiveRules,

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}
