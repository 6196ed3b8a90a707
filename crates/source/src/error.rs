//! Error type for source operations.

use revbench_core::ConfigurationError;
use thiserror::Error;

/// Result alias for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Errors that can occur while enumerating or fetching sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The operation is not available for this kind of source
    #[error("source '{source_name}' does not support {operation}")]
    NotSupported {
        /// Local key of the source
        source_name: String,
        /// The unsupported operation
        operation: &'static str,
    },

    /// The source offers no versions at all
    #[error("source '{0}' has no versions")]
    NoVersions(String),

    /// The requested version is not offered by the source
    #[error("source '{source_name}' has no version '{version}'")]
    UnknownVersion {
        /// Local key of the source
        source_name: String,
        /// The requested label
        version: String,
    },

    /// Invalid project or selection
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Git operation error
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// Download error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A blocking worker panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
