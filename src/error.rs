//! Error types for seedcast.
//!
//! Kernel, cache and module code never fail; these errors surface only at
//! the scheduler and pipeline boundaries.

use thiserror::Error;

/// Main error type for the seedcast library.
#[derive(Error, Debug)]
pub enum SeedcastError {
    /// No task registered under the given id
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Pipeline name not present in the registry
    #[error("Unknown pipeline: {0}")]
    UnknownPipeline(String),

    /// Date string that is neither `YYYY-MM-DD` nor RFC 3339
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Upstream snapshot could not be obtained
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// JSON serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using the seedcast error.
pub type Result<T> = std::result::Result<T, SeedcastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SeedcastError::TaskNotFound("daily-report".to_string());
        assert_eq!(err.to_string(), "Task not found: daily-report");

        let err = SeedcastError::UnknownPipeline("nope".to_string());
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_from_serde_error() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: SeedcastError = parse.unwrap_err().into();
        assert!(matches!(err, SeedcastError::Serialization(_)));
    }
}
