//! Registry Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A registry error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Opening the database or executing a statement failed.
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// The registry has no open connection; call `open()` first.
    #[display("registry is not open")]
    NotOpen,
    /// The blocking runtime driving the connection could not be started.
    #[display("unable to start registry runtime")]
    Runtime,
    /// The database location could not be resolved from configuration.
    #[display("configuration error")]
    Config,
    /// Serialization/deserialization error.
    #[display("invalid registry data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}
impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // A locked or briefly unavailable file may open on the next attempt.
        matches!(self, Self::Database | Self::NotOpen)
    }
}
