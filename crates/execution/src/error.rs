//! Execution errors.

use revbench_core::ConfigurationError;
use revbench_source::SourceError;
use revbench_storage::StorageError;
use revbench_tools::ToolError;
use thiserror::Error;

/// Failure of a single step's action.
#[derive(Debug, Error)]
pub enum StepError {
    /// An external process exited non-zero.
    #[error("'{command}' exited with status {code}")]
    Execution {
        /// The command line
        command: String,
        /// Exit status
        code: i32,
        /// Captured standard error
        stderr: String,
    },

    /// OS-level failure inside the step.
    #[error("resource error: {0}")]
    Resource(#[from] std::io::Error),

    /// The user interrupted the run.
    #[error("interrupted")]
    Interrupted,

    /// Fetching or resolving a source failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Persisting a record failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A tool could not be run.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Invalid configuration discovered while running.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A retrieved hand-off was never published.
    #[error("nothing was published under '{0}'")]
    MissingHandoff(String),
}

impl StepError {
    /// Whether this is a user interrupt.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Failure to build a plan. Raised before any step executes.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Bad project, source or selection configuration
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Enumerating versions failed
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Failure to load a plugin.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    /// No plugin of that name is known
    #[error("unknown plugin: {0}")]
    NotFound(String),

    /// The plugin refused to register
    #[error("plugin {plugin} is invalid: {reason}")]
    Invalid {
        /// Plugin name
        plugin: String,
        /// What went wrong
        reason: String,
    },

    /// The plugin's declarations are inconsistent
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
