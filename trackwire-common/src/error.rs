//! Common error types for trackwire

use thiserror::Error;

/// Common result type for trackwire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across trackwire modules
///
/// Domain-specific failures live in per-module enums (`LedgerError`,
/// `StoreError`, ...); this type covers the shared infrastructure paths:
/// database access, filesystem I/O during init, and configuration loading.
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
}
