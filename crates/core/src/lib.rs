//! revbench core data models.
//!
//! Identifiers, settings, declared projects, persisted records and the
//! configuration errors shared by every other crate.

#![warn(missing_docs)]

// Core identities
mod id;

// Settings and declarations
mod config;
mod project;

// Persistence models
mod record;

mod error;

// Re-exports
pub use id::*;

pub use config::{Settings, DEFAULT_PLUGINS};
pub use project::{HttpVersion, ProjectSpec, SourceSpec};
pub use record::{ExperimentRecord, RunRecord, RunStatus};
pub use error::{ConfigError, ConfigurationError};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
