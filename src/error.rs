//! Error types for the host-facing layer.
//!
//! Tree operations themselves never fail: a missing key is `None`. Errors only
//! come from configuration checks and from [`SharedTree`](crate::SharedTree)
//! writers.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by [`SharedTree`](crate::SharedTree) and
/// [`Transaction::try_insert`](crate::Transaction::try_insert).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Key too large: {size} bytes (max {max})")]
    KeyTooLarge { size: usize, max: usize },

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("Transaction aborted: {0}")]
    Aborted(String),
}
