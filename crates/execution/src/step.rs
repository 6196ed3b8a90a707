//! Leaf steps - one unit of work on a project or an experiment.

use crate::context::{ExperimentScope, RunContext};
use crate::error::StepError;
use crate::project::ProjectInstance;
use crate::status::{StatusCell, StepStatus};
use async_trait::async_trait;
use chrono::Utc;
use revbench_core::{ExperimentId, RunId, RunRecord, RunStatus};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

/// Anything the engine can invoke: leaf steps and composites.
#[async_trait]
pub trait Action: Send + Sync + std::fmt::Display {
    /// Run the action and return the statuses it produced.
    ///
    /// Errors escape to the nearest composite, which decides what they mean.
    async fn invoke(&self, ctx: &RunContext) -> Result<Vec<StepStatus>, StepError>;

    /// Clean up after this action failed.
    async fn onerror(&self, _ctx: &RunContext) {}

    /// Terminal status, `Unset` until the action finished.
    fn status(&self) -> StepStatus;

    /// Number of leaf steps.
    fn count(&self) -> usize {
        1
    }
}

/// Per-step overrides of configure, build and run steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    /// Configuration label, recorded with runs
    pub label: Option<String>,

    /// Extra environment for the project's commands
    pub env: BTreeMap<String, String>,
}

impl Scope {
    /// A labelled scope.
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            env: BTreeMap::new(),
        }
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// What a leaf step does.
pub enum StepKind {
    /// Remove the build directory
    Clean(Arc<ProjectInstance>),
    /// Create the build directory
    Prepare(Arc<ProjectInstance>),
    /// Materialize every source of the revision
    Download(Arc<ProjectInstance>),
    /// Log a message
    Echo {
        /// Owning project
        project: Arc<ProjectInstance>,
        /// The message
        message: String,
    },
    /// Configure the project
    Configure(Arc<ProjectInstance>, Scope),
    /// Build the project
    Build(Arc<ProjectInstance>, Scope),
    /// Run the project's workload and persist a run record
    Run(Arc<ProjectInstance>, Scope),
    /// Remove paths after an experiment, whatever its outcome
    CleanExtra(Vec<PathBuf>),
    /// Make a file of the build directory available to sibling trees
    Publish {
        /// Owning project
        project: Arc<ProjectInstance>,
        /// Name siblings retrieve it by
        key: String,
        /// File or directory, relative paths start at the build directory
        path: PathBuf,
    },
    /// Copy a published file into the build directory
    Retrieve {
        /// Owning project
        project: Arc<ProjectInstance>,
        /// Published name
        key: String,
        /// Destination, relative paths start at the build directory
        dest: PathBuf,
    },
}

/// A leaf step. Created once per planned unit of work and never reused.
pub struct Step {
    kind: StepKind,
    status: StatusCell,
}

impl Step {
    /// Step of the given kind.
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind,
            status: StatusCell::default(),
        }
    }

    /// Remove the project's build directory.
    pub fn clean(project: &Arc<ProjectInstance>) -> Self {
        Self::new(StepKind::Clean(project.clone()))
    }

    /// Create the project's build directory.
    pub fn prepare(project: &Arc<ProjectInstance>) -> Self {
        Self::new(StepKind::Prepare(project.clone()))
    }

    /// Fetch the project's sources.
    pub fn download(project: &Arc<ProjectInstance>) -> Self {
        Self::new(StepKind::Download(project.clone()))
    }

    /// Log `message` for the project.
    pub fn echo(project: &Arc<ProjectInstance>, message: impl Into<String>) -> Self {
        Self::new(StepKind::Echo {
            project: project.clone(),
            message: message.into(),
        })
    }

    /// Configure within `scope`.
    pub fn configure(project: &Arc<ProjectInstance>, scope: Scope) -> Self {
        Self::new(StepKind::Configure(project.clone(), scope))
    }

    /// Build within `scope`.
    pub fn build(project: &Arc<ProjectInstance>, scope: Scope) -> Self {
        Self::new(StepKind::Build(project.clone(), scope))
    }

    /// Run within `scope`.
    pub fn run(project: &Arc<ProjectInstance>, scope: Scope) -> Self {
        Self::new(StepKind::Run(project.clone(), scope))
    }

    /// Remove `paths` after the experiment.
    pub fn clean_extra(paths: Vec<PathBuf>) -> Self {
        Self::new(StepKind::CleanExtra(paths))
    }

    /// Publish `path` under `key`.
    pub fn publish(project: &Arc<ProjectInstance>, key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(StepKind::Publish {
            project: project.clone(),
            key: key.into(),
            path: path.into(),
        })
    }

    /// Retrieve what was published under `key` into `dest`.
    pub fn retrieve(project: &Arc<ProjectInstance>, key: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self::new(StepKind::Retrieve {
            project: project.clone(),
            key: key.into(),
            dest: dest.into(),
        })
    }

    /// What this step does.
    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    /// Short name of the step kind.
    pub fn name(&self) -> &'static str {
        match &self.kind {
            StepKind::Clean(_) => "clean",
            StepKind::Prepare(_) => "prepare",
            StepKind::Download(_) => "download",
            StepKind::Echo { .. } => "echo",
            StepKind::Configure(..) => "configure",
            StepKind::Build(..) => "build",
            StepKind::Run(..) => "run",
            StepKind::CleanExtra(_) => "clean-extra",
            StepKind::Publish { .. } => "publish",
            StepKind::Retrieve { .. } => "retrieve",
        }
    }

    /// The project this step works on; `None` for experiment-level steps.
    pub fn project(&self) -> Option<&Arc<ProjectInstance>> {
        match &self.kind {
            StepKind::Clean(p)
            | StepKind::Prepare(p)
            | StepKind::Download(p)
            | StepKind::Echo { project: p, .. }
            | StepKind::Configure(p, _)
            | StepKind::Build(p, _)
            | StepKind::Run(p, _)
            | StepKind::Publish { project: p, .. }
            | StepKind::Retrieve { project: p, .. } => Some(p),
            StepKind::CleanExtra(_) => None,
        }
    }

    fn scope(&self) -> Option<&Scope> {
        match &self.kind {
            StepKind::Configure(_, s) | StepKind::Build(_, s) | StepKind::Run(_, s) => Some(s),
            _ => None,
        }
    }

    /// Whether this step runs after an experiment regardless of outcome.
    pub fn is_cleanup(&self) -> bool {
        matches!(self.kind, StepKind::CleanExtra(_))
    }

    // Cleanup must finish; runs race the signal themselves to record it.
    fn is_cancellable(&self) -> bool {
        !matches!(
            self.kind,
            StepKind::Clean(_) | StepKind::CleanExtra(_) | StepKind::Run(..) | StepKind::Download(_)
        )
    }

    // Downloads write from blocking threads that outlive a dropped future,
    // so they only check the signal before starting.
    fn finishes_once_started(&self) -> bool {
        matches!(self.kind, StepKind::Download(_))
    }

    async fn execute(&self, ctx: &RunContext) -> Result<(), StepError> {
        match &self.kind {
            StepKind::Clean(project) => clean_project(ctx, project).await?,
            StepKind::Prepare(project) => fs::create_dir_all(project.builddir()).await?,
            StepKind::Download(project) => {
                project.download().await?;
            }
            StepKind::Echo { project, message } => {
                info!(project = %project.name(), "{}", message);
            }
            StepKind::Configure(project, scope) => {
                let pctx = scoped(ctx, scope).project_context(project);
                project.definition().configure(&pctx).await?;
            }
            StepKind::Build(project, scope) => {
                let pctx = scoped(ctx, scope).project_context(project);
                project.definition().build(&pctx).await?;
            }
            StepKind::Run(project, scope) => run_and_record(ctx, project, scope).await?,
            StepKind::CleanExtra(paths) => {
                let mut first_error = None;
                for path in paths {
                    if let Err(e) = remove_path(path).await {
                        warn!(path = %path.display(), error = %e, "Failed to remove");
                        first_error.get_or_insert(e);
                    }
                }
                if let Some(e) = first_error {
                    return Err(e.into());
                }
            }
            StepKind::Publish { project, key, path } => {
                let dest = ctx.handoff_dir().join(key);
                copy_tree(project.builddir().join(path), dest.clone()).await?;
                debug!(key = %key, path = %dest.display(), "Published");
                ctx.handoff().publish(key.clone(), dest).await;
            }
            StepKind::Retrieve { project, key, dest } => {
                let published = ctx
                    .handoff()
                    .lookup(key)
                    .await
                    .ok_or_else(|| StepError::MissingHandoff(key.clone()))?;
                copy_tree(published, project.builddir().join(dest)).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Action for Step {
    async fn invoke(&self, ctx: &RunContext) -> Result<Vec<StepStatus>, StepError> {
        debug!(step = %self, "Running");
        let result = if self.is_cancellable() {
            tokio::select! {
                biased;
                _ = ctx.cancel().cancelled() => Err(StepError::Interrupted),
                result = self.execute(ctx) => result,
            }
        } else if self.finishes_once_started() && ctx.cancel().is_cancelled() {
            Err(StepError::Interrupted)
        } else {
            self.execute(ctx).await
        };

        match result {
            Ok(()) => {
                self.status.set(StepStatus::Ok);
                Ok(vec![StepStatus::Ok])
            }
            Err(e) => {
                if !e.is_interrupt() {
                    self.status.set(StepStatus::Error);
                }
                Err(e)
            }
        }
    }

    async fn onerror(&self, ctx: &RunContext) {
        let Some(project) = self.project() else {
            return;
        };
        // Labelled configurations share the checkout with their siblings;
        // the enclosing project tree cleans up.
        if self.scope().is_some_and(|s| s.label.is_some()) {
            debug!(step = %self, "Leaving cleanup to the project tree");
            return;
        }
        if let Err(e) = clean_project(ctx, project).await {
            warn!(project = %project.name(), error = %e, "Cleanup failed");
        }
    }

    fn status(&self) -> StepStatus {
        self.status.get()
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            StepKind::Echo { message, .. } => write!(f, "echo \"{}\"", message),
            StepKind::CleanExtra(paths) => write!(f, "clean-extra ({} paths)", paths.len()),
            StepKind::Publish { key, .. } => write!(f, "publish {}", key),
            StepKind::Retrieve { key, .. } => write!(f, "retrieve {}", key),
            _ => {
                write!(f, "{}", self.name())?;
                if let Some(project) = self.project() {
                    write!(f, " {}", project.name())?;
                }
                if let Some(label) = self.scope().and_then(|s| s.label.as_deref()) {
                    write!(f, " [{}]", label)?;
                }
                Ok(())
            }
        }
    }
}

fn scoped(ctx: &RunContext, scope: &Scope) -> RunContext {
    let ctx = ctx.with_env(&scope.env);
    match &scope.label {
        Some(label) => ctx.with_config(label.clone()),
        None => ctx,
    }
}

async fn run_and_record(
    ctx: &RunContext,
    project: &Arc<ProjectInstance>,
    scope: &Scope,
) -> Result<(), StepError> {
    let pctx = scoped(ctx, scope).project_context(project);
    let experiment = ctx.experiment().cloned().unwrap_or_else(|| ExperimentScope {
        id: ExperimentId::new(),
        name: String::new(),
    });

    let mut record = RunRecord {
        id: RunId::new(),
        project: project.name().to_string(),
        group: project.group().to_string(),
        experiment: experiment.id,
        experiment_name: experiment.name,
        revision: project.revision().identifier(),
        config: pctx.config.clone(),
        status: RunStatus::Running,
        begin: Utc::now(),
        end: None,
    };
    ctx.storage().persist_run(&record).await?;

    let outcome = tokio::select! {
        biased;
        _ = ctx.cancel().cancelled() => Err(StepError::Interrupted),
        result = project.definition().run_tests(&pctx) => result,
    };

    record.finish(if outcome.is_ok() {
        RunStatus::Ok
    } else {
        RunStatus::Failed
    });
    match ctx.storage().persist_run(&record).await {
        Err(e) if outcome.is_ok() => Err(e.into()),
        Err(e) => {
            warn!(run = %record.id, error = %e, "Failed to record run");
            outcome
        }
        Ok(()) => outcome,
    }
}

/// Remove the project's build directory unless the settings keep it.
pub(crate) async fn clean_project(ctx: &RunContext, project: &ProjectInstance) -> io::Result<()> {
    if ctx.settings().keep_build_dirs {
        debug!(path = %project.builddir().display(), "Keeping build directory");
        return Ok(());
    }
    remove_path(project.builddir()).await
}

async fn remove_path(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    }
}

async fn copy_tree(from: PathBuf, to: PathBuf) -> io::Result<()> {
    tokio::task::spawn_blocking(move || copy_tree_blocking(&from, &to))
        .await
        .map_err(io::Error::other)?
}

fn copy_tree_blocking(from: &Path, to: &Path) -> io::Result<()> {
    if from.is_dir() {
        std::fs::create_dir_all(to)?;
        for entry in std::fs::read_dir(from)? {
            let entry = entry?;
            copy_tree_blocking(&entry.path(), &to.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(from, to).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context;
    use crate::project::tests::{instance, list, FakeProject};
    use crate::cancel::CancellationToken;
    use revbench_source::{Remote, Source, SourceRef, Version};
    use std::sync::atomic::Ordering;

    async fn project(ctx: &RunContext, fake: Arc<FakeProject>) -> Arc<ProjectInstance> {
        Arc::new(instance(fake, ctx.settings()).await)
    }

    #[tokio::test]
    async fn test_prepare_download_clean() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let fake = Arc::new(FakeProject::with_sources(vec![list("src", &["v1"])]));
        let p = project(&ctx, fake).await;

        assert_eq!(Step::prepare(&p).invoke(&ctx).await.unwrap(), vec![StepStatus::Ok]);
        Step::download(&p).invoke(&ctx).await.unwrap();
        assert!(p.source_path(None).is_dir());

        let clean = Step::clean(&p);
        clean.invoke(&ctx).await.unwrap();
        assert_eq!(clean.status(), StepStatus::Ok);
        assert!(!p.builddir().exists());
    }

    #[tokio::test]
    async fn test_failed_step_is_error_and_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let fake = Arc::new(FakeProject {
            fail_build: true,
            ..FakeProject::with_sources(vec![list("src", &["v1"])])
        });
        let p = project(&ctx, fake).await;

        let step = Step::build(&p, Scope::default());
        let err = step.invoke(&ctx).await.unwrap_err();
        assert!(matches!(err, StepError::Execution { code: 2, .. }));
        assert_eq!(step.status(), StepStatus::Error);
    }

    #[tokio::test]
    async fn test_cancelled_step_does_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let fake = Arc::new(FakeProject::with_sources(vec![list("src", &["v1"])]));
        let p = project(&ctx, fake.clone()).await;

        ctx.cancel().cancel();
        let step = Step::build(&p, Scope::default());
        assert!(step.invoke(&ctx).await.unwrap_err().is_interrupt());
        assert_eq!(fake.builds.load(Ordering::SeqCst), 0);
        assert_eq!(step.status(), StepStatus::Unset);
    }

    /// Source whose download is interrupted halfway.
    #[derive(Debug)]
    struct CancelsMidway {
        remote: Remote,
        token: CancellationToken,
    }

    #[async_trait]
    impl Source for CancelsMidway {
        fn local(&self) -> &str {
            "src"
        }

        fn remote(&self) -> &Remote {
            &self.remote
        }

        async fn versions(&self) -> revbench_source::Result<Vec<Version>> {
            Ok(vec![Version::new("v1")])
        }

        async fn version(&self, target_dir: &Path, _: &str) -> revbench_source::Result<PathBuf> {
            self.token.cancel();
            tokio::task::yield_now().await;
            let path = target_dir.join("src");
            tokio::fs::create_dir_all(&path).await?;
            Ok(path)
        }
    }

    #[tokio::test]
    async fn test_started_download_finishes_after_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let source: SourceRef = Arc::new(CancelsMidway {
            remote: Remote::None,
            token: ctx.cancel().clone(),
        });
        let p = project(&ctx, Arc::new(FakeProject::with_sources(vec![source]))).await;

        let step = Step::download(&p);
        assert_eq!(step.invoke(&ctx).await.unwrap(), vec![StepStatus::Ok]);
        assert!(ctx.cancel().is_cancelled());
        assert!(p.source_path(None).is_dir());

        // Once cancelled, a download that has not started is skipped.
        let other = project(&ctx, Arc::new(FakeProject::with_sources(vec![list("src", &["v1"])]))).await;
        let skipped = Step::download(&other);
        assert!(skipped.invoke(&ctx).await.unwrap_err().is_interrupt());
        assert!(!other.source_path(None).exists());
    }

    #[tokio::test]
    async fn test_clean_extra_runs_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let file = dir.path().join("scratch.log");
        let tree = dir.path().join("scratch");
        std::fs::write(&file, "x").unwrap();
        std::fs::create_dir_all(tree.join("nested")).unwrap();

        ctx.cancel().cancel();
        let step = Step::clean_extra(vec![file.clone(), tree.clone(), dir.path().join("absent")]);
        step.invoke(&ctx).await.unwrap();
        assert!(!file.exists());
        assert!(!tree.exists());
    }

    #[tokio::test]
    async fn test_run_persists_record() {
        let dir = tempfile::tempdir().unwrap();
        let root = context(dir.path()).await;
        let id = ExperimentId::new();
        let ctx = root.for_experiment(id, "raw");
        let fake = Arc::new(FakeProject::with_sources(vec![list("src", &["v1"])]));
        let p = project(&ctx, fake.clone()).await;

        Step::run(&p, Scope::labelled("O2")).invoke(&ctx).await.unwrap();

        let runs = ctx.storage().list_runs(Some(id)).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Ok);
        assert_eq!(runs[0].config.as_deref(), Some("O2"));
        assert_eq!(runs[0].revision, "src@v1");
        assert_eq!(runs[0].experiment_name, "raw");
        assert_eq!(fake.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_interrupted_run_is_recorded_failed() {
        let dir = tempfile::tempdir().unwrap();
        let root = context(dir.path()).await;
        let id = ExperimentId::new();
        let ctx = root.for_experiment(id, "raw");
        let p = project(&ctx, Arc::new(FakeProject::with_sources(vec![list("src", &["v1"])]))).await;

        ctx.cancel().cancel();
        let err = Step::run(&p, Scope::default()).invoke(&ctx).await.unwrap_err();
        assert!(err.is_interrupt());
        let runs = ctx.storage().list_runs(Some(id)).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].end.is_some());
    }

    #[tokio::test]
    async fn test_publish_then_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await.for_experiment(ExperimentId::new(), "pgo");
        let sources = vec![list("src", &["v1"])];
        let first = project(&ctx, Arc::new(FakeProject::with_sources(sources.clone()))).await;
        let second = project(&ctx, Arc::new(FakeProject::with_sources(sources))).await;

        std::fs::create_dir_all(first.builddir().join("profile")).unwrap();
        std::fs::write(first.builddir().join("profile/default.profdata"), "counts").unwrap();

        let missing = Step::retrieve(&second, "profile", "profile");
        assert!(matches!(
            missing.invoke(&ctx).await,
            Err(StepError::MissingHandoff(key)) if key == "profile"
        ));

        Step::publish(&first, "profile", "profile").invoke(&ctx).await.unwrap();
        // The publisher's tree may be cleaned before the sibling retrieves.
        Step::clean(&first).invoke(&ctx).await.unwrap();
        Step::retrieve(&second, "profile", "profile").invoke(&ctx).await.unwrap();

        let copied = second.builddir().join("profile/default.profdata");
        assert_eq!(std::fs::read_to_string(copied).unwrap(), "counts");
    }

    #[tokio::test]
    async fn test_onerror_cleans_project_unless_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let p = project(&ctx, Arc::new(FakeProject::with_sources(vec![list("src", &["v1"])]))).await;
        std::fs::create_dir_all(p.builddir()).unwrap();

        Step::build(&p, Scope::labelled("O3")).onerror(&ctx).await;
        assert!(p.builddir().exists());

        Step::build(&p, Scope::default()).onerror(&ctx).await;
        assert!(!p.builddir().exists());
    }

    #[test]
    fn test_display() {
        let step = Step::clean_extra(vec![PathBuf::from("a")]);
        assert_eq!(step.to_string(), "clean-extra (1 paths)");
        assert!(step.is_cleanup());
        assert!(step.project().is_none());
    }
}
