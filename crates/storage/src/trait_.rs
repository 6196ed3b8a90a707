//! Storage trait abstraction.

use async_trait::async_trait;
use revbench_core::{ExperimentId, ExperimentRecord, RunRecord};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Storage abstraction for experiment transactions and runs.
///
/// Methods take `&self` so one backend can be shared by every step of a
/// plan behind an `Arc`.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Experiment transactions ===

    /// Record the begin of an experiment.
    ///
    /// If a record with the same id already began (work units sharing one
    /// experiment id), its begin timestamp is kept. Returns the stored record.
    async fn begin_experiment(&self, record: &ExperimentRecord) -> Result<ExperimentRecord>;

    /// Record the end of an experiment and return the stored record.
    async fn end_experiment(&self, id: ExperimentId) -> Result<ExperimentRecord>;

    /// Load an experiment record by id.
    async fn load_experiment(&self, id: ExperimentId) -> Result<Option<ExperimentRecord>>;

    /// List all experiment records, oldest first.
    async fn list_experiments(&self) -> Result<Vec<ExperimentRecord>>;

    // === Runs ===

    /// Save a run (create or update).
    async fn persist_run(&self, run: &RunRecord) -> Result<()>;

    /// List runs, optionally only those of one experiment, oldest first.
    async fn list_runs(&self, experiment: Option<ExperimentId>) -> Result<Vec<RunRecord>>;
}
