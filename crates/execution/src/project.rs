//! Project definitions and their per-revision instances.

use crate::error::StepError;
use async_trait::async_trait;
use revbench_core::{ConfigurationError, RunId, Settings};
use revbench_source::{Revision, SourceRef};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A benchmark project: its sources and how to configure, build and run it.
///
/// The first declared source is the primary one.
#[async_trait]
pub trait ProjectDefinition: Send + Sync {
    /// Registered name.
    fn name(&self) -> &str;

    /// Group used for bulk selection.
    fn group(&self) -> &str {
        "default"
    }

    /// Free-form domain, e.g. "compression".
    fn domain(&self) -> &str {
        ""
    }

    /// Declared sources, primary first.
    fn sources(&self) -> &[SourceRef];

    /// Configure the fetched sources.
    async fn configure(&self, _ctx: &ProjectContext) -> Result<(), StepError> {
        Ok(())
    }

    /// Build.
    async fn build(&self, ctx: &ProjectContext) -> Result<(), StepError>;

    /// Run the benchmark or test workload.
    async fn run_tests(&self, ctx: &ProjectContext) -> Result<(), StepError>;
}

/// A project pinned to one revision, with its own build directory.
pub struct ProjectInstance {
    definition: Arc<dyn ProjectDefinition>,
    revision: Revision,
    run_id: RunId,
    builddir: PathBuf,
}

impl ProjectInstance {
    /// Pin `definition` to `revision`.
    ///
    /// Fails if the project declares no sources, or if the revision misses a
    /// context-free source of the project.
    pub fn new(
        definition: Arc<dyn ProjectDefinition>,
        revision: Revision,
        settings: &Settings,
    ) -> Result<Self, ConfigurationError> {
        let sources = definition.sources();
        if sources.is_empty() {
            return Err(ConfigurationError::NoSources {
                project: definition.name().to_string(),
            });
        }
        if let Some(missing) = sources
            .iter()
            .filter(|s| s.is_context_free())
            .find(|s| revision.get(s.local()).is_none())
        {
            return Err(ConfigurationError::IncompleteRevision {
                project: definition.name().to_string(),
                source_name: missing.local().to_string(),
            });
        }

        let run_id = RunId::new();
        let builddir = settings.build_dir.join(run_id.build_dir_name(definition.name()));
        Ok(Self {
            definition,
            revision,
            run_id,
            builddir,
        })
    }

    /// The definition this instance was built from.
    pub fn definition(&self) -> &Arc<dyn ProjectDefinition> {
        &self.definition
    }

    /// Project name.
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// Project group.
    pub fn group(&self) -> &str {
        self.definition.group()
    }

    /// The pinned revision.
    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    /// Identifier of this instance.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// `<build_dir>/<name>-<run id>`.
    pub fn builddir(&self) -> &Path {
        &self.builddir
    }

    /// Local name of the primary source.
    pub fn primary_source(&self) -> &str {
        // Construction guarantees at least one source.
        self.definition
            .sources()
            .first()
            .map(|s| s.local())
            .unwrap_or_default()
    }

    /// Version of `source`, the primary source when `None`.
    pub fn version_of(&self, source: Option<&str>) -> Option<&str> {
        self.revision
            .version_of(Some(source.unwrap_or(self.primary_source())))
    }

    /// Where `source` (the primary one when `None`) is materialized.
    pub fn source_path(&self, source: Option<&str>) -> PathBuf {
        self.builddir.join(source.unwrap_or(self.primary_source()))
    }

    /// Materialize every variant of the revision into the build directory.
    pub async fn download(&self) -> Result<Vec<PathBuf>, StepError> {
        let mut paths = Vec::with_capacity(self.revision.len());
        for variant in self.revision.iter() {
            debug!(project = %self.name(), variant = ?variant, "Materializing");
            paths.push(variant.materialize(&self.builddir).await?);
        }
        Ok(paths)
    }
}

impl std::fmt::Display for ProjectInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} @ {}", self.group(), self.name(), self.revision)
    }
}

impl std::fmt::Debug for ProjectInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectInstance")
            .field("name", &self.name())
            .field("revision", &self.revision)
            .field("builddir", &self.builddir)
            .finish()
    }
}

/// What a project action sees: the instance plus scoped values.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// The instance being worked on
    pub project: Arc<ProjectInstance>,

    /// Environment for commands: settings, then enclosing scopes
    pub env: BTreeMap<String, String>,

    /// Configuration label, if the experiment runs several
    pub config: Option<String>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use revbench_source::{select, List, Source};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Project whose build and run count invocations and fail on demand.
    #[derive(Debug, Default)]
    pub struct FakeProject {
        pub sources: Vec<SourceRef>,
        pub fail_build: bool,
        pub interrupt_build: bool,
        pub builds: AtomicUsize,
        pub runs: AtomicUsize,
    }

    impl FakeProject {
        pub fn with_sources(sources: Vec<SourceRef>) -> Self {
            Self {
                sources,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ProjectDefinition for FakeProject {
        fn name(&self) -> &str {
            "fake"
        }

        fn sources(&self) -> &[SourceRef] {
            &self.sources
        }

        async fn build(&self, _ctx: &ProjectContext) -> Result<(), StepError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if self.interrupt_build {
                return Err(StepError::Interrupted);
            }
            if self.fail_build {
                return Err(StepError::Execution {
                    command: "make".into(),
                    code: 2,
                    stderr: String::new(),
                });
            }
            Ok(())
        }

        async fn run_tests(&self, _ctx: &ProjectContext) -> Result<(), StepError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub fn list(local: &str, versions: &[&str]) -> SourceRef {
        Arc::new(List::new(local, versions.iter().copied()))
    }

    pub async fn instance(definition: Arc<dyn ProjectDefinition>, settings: &Settings) -> ProjectInstance {
        let revision = select::<&str>(definition.sources(), &[]).await.unwrap();
        ProjectInstance::new(definition, revision, settings).unwrap()
    }

    #[test]
    fn test_zero_sources_rejected() {
        let definition = Arc::new(FakeProject::default());
        let err = ProjectInstance::new(definition, Revision::new(), &Settings::default()).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::NoSources {
                project: "fake".into()
            }
        );
    }

    #[test]
    fn test_incomplete_revision_rejected() {
        let definition = Arc::new(FakeProject::with_sources(vec![list("src", &["v1"])]));
        let err = ProjectInstance::new(definition, Revision::new(), &Settings::default()).unwrap_err();
        assert!(matches!(err, ConfigurationError::IncompleteRevision { .. }));
    }

    #[tokio::test]
    async fn test_primary_source_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            build_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let definition = Arc::new(FakeProject::with_sources(vec![
            list("main", &["v1", "v2"]),
            list("inputs", &["small"]),
        ]));
        let project = instance(definition, &settings).await;

        assert_eq!(project.primary_source(), "main");
        assert_eq!(project.version_of(None), Some("v1"));
        assert_eq!(project.version_of(Some("inputs")), Some("small"));
        assert_eq!(project.source_path(None), project.builddir().join("main"));
        assert!(project
            .builddir()
            .ends_with(format!("fake-{}", project.run_id())));

        let paths = project.download().await.unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.is_dir()));
        assert!(project.definition().sources()[0].is_context_free());
    }
}
