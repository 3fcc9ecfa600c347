//! Backend error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during backend operations.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Storage engine failure
    #[error("store error: {0}")]
    Store(#[from] tagtrace_core::StoreError),

    /// Migration orchestration failure
    #[error("migration error: {0}")]
    Migration(#[from] tagtrace_core::migration::MigrationError),

    /// Directory scan failure
    #[error("scan failed: {0}")]
    Scan(#[from] tagtrace_core::ScanError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] tagtrace_config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// File watcher error
    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// The operation needs the relational backend
    #[error("'{operation}' requires the relational backend, which is unavailable")]
    RelationalUnavailable { operation: String },

    /// Path outside the watched project
    #[error("path '{path}' is outside the project root")]
    OutsideRoot { path: PathBuf },

    /// Generic error with context
    #[error("{context}: {message}")]
    WithContext { context: String, message: String },
}

impl BackendError {
    pub fn relational_unavailable(operation: impl Into<String>) -> Self {
        Self::RelationalUnavailable {
            operation: operation.into(),
        }
    }

    pub fn outside_root(path: impl Into<PathBuf>) -> Self {
        Self::OutsideRoot { path: path.into() }
    }

    /// Add context to any error.
    pub fn with_context(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BackendError::relational_unavailable("search_advanced");
        assert!(err.to_string().contains("search_advanced"));
        assert!(err.to_string().contains("unavailable"));

        let err = BackendError::outside_root("/elsewhere/a.md");
        assert!(err.to_string().contains("/elsewhere/a.md"));
    }

    #[test]
    fn test_with_context() {
        let err = BackendError::with_context("saving index", "3 errors");
        assert_eq!(err.to_string(), "saving index: 3 errors");
    }
}
