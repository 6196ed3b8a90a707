//! Configuration errors raised before any step executes.

use thiserror::Error;

/// A plan cannot be built from the given projects, sources or selections.
///
/// These are raised at construction or selection time and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A project declares no sources at all.
    #[error("project '{project}' declares no sources")]
    NoSources {
        /// Project name
        project: String,
    },

    /// A context-aware source cannot produce variants for the partial revision.
    #[error("source '{source_name}' cannot be satisfied: {reason}")]
    Unsatisfiable {
        /// Local key of the source
        source_name: String,
        /// Why no variant fits
        reason: String,
    },

    /// A requested revision string matches no declared source.
    #[error("'{requested}' does not match a version of any source")]
    NoMatchingSource {
        /// The unmatched string
        requested: String,
    },

    /// A requested revision string matches more than one source or version.
    #[error("'{requested}' is ambiguous, candidates: {}", candidates.join(", "))]
    AmbiguousSelection {
        /// The ambiguous string
        requested: String,
        /// Every `source@version` it matches
        candidates: Vec<String>,
    },

    /// Two requested strings select a version of the same source.
    #[error("source '{source_name}' was selected more than once")]
    DuplicateSelection {
        /// Local key of the source
        source_name: String,
    },

    /// A revision lacks a variant for a context-free source.
    #[error("revision for '{project}' has no variant for source '{source_name}'")]
    IncompleteRevision {
        /// Project name
        project: String,
        /// Local key of the missing source
        source_name: String,
    },

    /// An experiment name is not registered.
    #[error("unknown experiment: {0}")]
    UnknownExperiment(String),

    /// A project name or group is not registered.
    #[error("unknown project or group: {0}")]
    UnknownProject(String),
}

/// Errors while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
