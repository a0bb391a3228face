//! Error types for progress computations.

use lms_storage::StorageError;

/// Result type for progress operations.
pub type Result<T> = std::result::Result<T, ProgressError>;

/// Errors surfaced to callers of the progress engine.
///
/// Business-state edge cases (student not enrolled, course without lessons)
/// are not errors; they come back as well-defined values.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    /// Underlying storage failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A course, section or lesson does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Catalog or progress facts violate an ordering or ownership invariant
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),
}
