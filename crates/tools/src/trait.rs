//! Tool abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Errors raised before a tool produced an exit status.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The program could not be started or waited on
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program name
        program: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// The program did not finish in time and was killed
    #[error("{program} timed out after {timeout:?}")]
    Timeout {
        /// Program name
        program: String,
        /// The exceeded limit
        timeout: Duration,
    },
}

/// A tool that can be executed.
///
/// Dropping the returned future must stop the tool; steps rely on this to
/// cancel work in progress.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get tool name.
    fn name(&self) -> &str;

    /// Get tool description.
    fn description(&self) -> &str;

    /// Execute the tool.
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput, ToolError>;
}

/// Input to a tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolInput {
    /// Command arguments
    pub args: Vec<String>,

    /// Environment variables, added to the inherited environment
    pub env: BTreeMap<String, String>,

    /// Standard input
    pub stdin: Option<String>,

    /// Timeout
    pub timeout: Option<Duration>,

    /// Working directory
    pub cwd: Option<PathBuf>,
}

impl ToolInput {
    /// Input with the given arguments.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Run in `cwd`.
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add environment variables.
    pub fn envs<'a>(mut self, env: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        self.env
            .extend(env.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

/// Output from a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Exit code, -1 when killed by a signal
    pub exit_code: i32,

    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Execution duration
    pub duration: Duration,
}

impl ToolOutput {
    /// Whether the tool exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
