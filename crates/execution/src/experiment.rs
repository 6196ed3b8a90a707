//! Experiments and reports, the other two kinds of registered plugins.

use crate::composite::Node;
use crate::project::ProjectInstance;
use async_trait::async_trait;
use revbench_core::{ExperimentId, Settings};
use revbench_source::Revision;
use revbench_storage::{Storage, StorageError};
use std::sync::Arc;

/// An experiment: what to do with each sampled project revision.
pub trait Experiment: Send + Sync {
    /// Registered name.
    fn name(&self) -> &str;

    /// One-line description, stored with the experiment record.
    fn description(&self) -> &str {
        ""
    }

    /// Pick the revisions to test. All of them by default.
    fn sample(&self, revisions: Vec<Revision>, _settings: &Settings) -> Vec<Revision> {
        revisions
    }

    /// Number of project trees built per revision. Each pass gets its own
    /// project instance and build directory; passes hand files to each
    /// other with publish/retrieve steps.
    fn passes(&self) -> usize {
        1
    }

    /// Ordered steps for one pass over one project instance. They run after
    /// the instance was cleaned, prepared and downloaded.
    fn actions_for_project(
        &self,
        project: &Arc<ProjectInstance>,
        pass: usize,
        settings: &Settings,
    ) -> Vec<Node>;
}

/// Produces a textual report from persisted records.
#[async_trait]
pub trait Report: Send + Sync {
    /// Registered name.
    fn name(&self) -> &str;

    /// One-line description.
    fn description(&self) -> &str {
        ""
    }

    /// Render the report, optionally for one experiment only.
    async fn generate(
        &self,
        storage: &dyn Storage,
        experiment: Option<ExperimentId>,
    ) -> Result<String, StorageError>;
}
