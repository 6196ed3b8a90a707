//! Values threaded through a plan while it runs.

use crate::cancel::CancellationToken;
use crate::project::{ProjectContext, ProjectInstance};
use revbench_core::{ExperimentId, Settings};
use revbench_storage::Storage;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The experiment a step runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentScope {
    /// Stable experiment id
    pub id: ExperimentId,
    /// Experiment name
    pub name: String,
}

/// Files published by one project tree for its siblings, by name.
#[derive(Debug, Clone, Default)]
pub struct Handoff(Arc<Mutex<BTreeMap<String, PathBuf>>>);

impl Handoff {
    /// Record that `key` is available at `path`.
    pub async fn publish(&self, key: impl Into<String>, path: PathBuf) {
        self.0.lock().await.insert(key.into(), path);
    }

    /// Where `key` was published, if it was.
    pub async fn lookup(&self, key: &str) -> Option<PathBuf> {
        self.0.lock().await.get(key).cloned()
    }
}

/// Shared, read-only context of a run. Derived contexts add scoped values.
#[derive(Clone)]
pub struct RunContext {
    settings: Arc<Settings>,
    storage: Arc<dyn Storage>,
    cancel: CancellationToken,
    env: BTreeMap<String, String>,
    config: Option<String>,
    experiment: Option<ExperimentScope>,
    handoff: Handoff,
}

impl RunContext {
    /// Root context for a run.
    pub fn new(settings: Arc<Settings>, storage: Arc<dyn Storage>, cancel: CancellationToken) -> Self {
        Self {
            env: settings.env.clone(),
            settings,
            storage,
            cancel,
            config: None,
            experiment: None,
            handoff: Handoff::default(),
        }
    }

    /// Settings of this run.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Record storage.
    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// The run's cancellation token.
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Scoped environment.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Scoped configuration label.
    pub fn config(&self) -> Option<&str> {
        self.config.as_deref()
    }

    /// The enclosing experiment, if any.
    pub fn experiment(&self) -> Option<&ExperimentScope> {
        self.experiment.as_ref()
    }

    /// Named file hand-offs of the enclosing experiment.
    pub fn handoff(&self) -> &Handoff {
        &self.handoff
    }

    /// A context whose environment is extended by `env`.
    pub fn with_env<'a>(&self, env: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        let mut scoped = self.clone();
        scoped
            .env
            .extend(env.into_iter().map(|(k, v)| (k.clone(), v.clone())));
        scoped
    }

    /// A context carrying a configuration label.
    pub fn with_config(&self, config: impl Into<String>) -> Self {
        let mut scoped = self.clone();
        scoped.config = Some(config.into());
        scoped
    }

    /// A context for the children of an experiment step. Hand-offs do not
    /// leak between experiments.
    pub fn for_experiment(&self, id: ExperimentId, name: impl Into<String>) -> Self {
        let mut scoped = self.clone();
        scoped.experiment = Some(ExperimentScope {
            id,
            name: name.into(),
        });
        scoped.handoff = Handoff::default();
        scoped
    }

    /// Directory holding the hand-off files of the enclosing experiment.
    pub fn handoff_dir(&self) -> PathBuf {
        let name = match &self.experiment {
            Some(scope) => format!("handoff-{}", scope.id),
            None => "handoff".to_string(),
        };
        self.settings.build_dir.join(name)
    }

    /// What a project action sees.
    pub fn project_context(&self, project: &Arc<ProjectInstance>) -> ProjectContext {
        ProjectContext {
            project: project.clone(),
            env: self.env.clone(),
            config: self.config.clone(),
        }
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("env", &self.env)
            .field("config", &self.config)
            .field("experiment", &self.experiment)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
