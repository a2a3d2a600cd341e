//! Core operation errors.

use thiserror::Error;

/// Errors raised by store operations before any sync is involved.
#[derive(Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CoreError {
    /// Redis-compatible wording; clients match on the WRONGTYPE prefix.
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("index out of range")]
    IndexOutOfRange,

    #[error("invalid key pattern: {0}")]
    InvalidPattern(String),
}
