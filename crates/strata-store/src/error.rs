//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors a backend can report.
///
/// A missing key is never an error; `get` signals it with `Ok(None)`.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend accepted the call but failed to execute it.
    #[error("store operation failed: {0}")]
    Operation(String),
}
