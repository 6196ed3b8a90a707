//! Persisted records - experiment transactions and project runs.

use crate::id::{ExperimentId, RunId};
use crate::Time;
use serde::{Deserialize, Serialize};

/// The begin/end record of one experiment execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    /// Stable experiment id
    pub id: ExperimentId,

    /// Experiment name
    pub name: String,

    /// Description
    pub description: String,

    /// When the transaction began
    pub begin: Option<Time>,

    /// When the transaction ended
    pub end: Option<Time>,
}

impl ExperimentRecord {
    /// Create a record that has neither begun nor ended.
    pub fn new(id: ExperimentId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
            begin: None,
            end: None,
        }
    }
}

/// Status of a persisted run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Started, not finished
    Running,
    /// Finished successfully
    Ok,
    /// Finished with an error
    Failed,
}

/// One execution of a project's run step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique identifier
    pub id: RunId,

    /// Project name
    pub project: String,

    /// Project group
    pub group: String,

    /// Owning experiment
    pub experiment: ExperimentId,

    /// Experiment name
    pub experiment_name: String,

    /// Revision identifier (`local@version` pairs)
    pub revision: String,

    /// Configuration label, if the experiment runs several
    pub config: Option<String>,

    /// Status
    pub status: RunStatus,

    /// When started
    pub begin: Time,

    /// When finished
    pub end: Option<Time>,
}

impl RunRecord {
    /// Mark the run finished.
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.end = Some(chrono::Utc::now());
    }
}
