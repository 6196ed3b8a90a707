//! Building the execution plan: experiments x projects x revisions.

use crate::composite::{ExperimentStep, Node, RequireAll};
use crate::error::PlanError;
use crate::experiment::Experiment;
use crate::project::{ProjectDefinition, ProjectInstance};
use crate::registry::Registries;
use crate::step::Step;
use revbench_core::{ConfigurationError, ExperimentId, Settings};
use revbench_source::{resolve, select, Revision, SingleVersionFilter, Source, SourceRef};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// A project chosen for the plan, with optional version constraints.
#[derive(Clone)]
pub struct ProjectSelection {
    definition: Arc<dyn ProjectDefinition>,
    version: Option<String>,
    revisions: Vec<String>,
}

impl ProjectSelection {
    /// Every revision of `definition`.
    pub fn new(definition: Arc<dyn ProjectDefinition>) -> Self {
        Self {
            definition,
            version: None,
            revisions: Vec::new(),
        }
    }

    /// Only revisions whose primary source is at `version`.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Exactly the one revision selected by these short strings.
    pub fn revisions(mut self, revisions: Vec<String>) -> Self {
        self.revisions = revisions;
        self
    }

    /// The selected project.
    pub fn definition(&self) -> &Arc<dyn ProjectDefinition> {
        &self.definition
    }

    /// Revisions this selection stands for.
    ///
    /// A version constraint applies to the primary source before revision
    /// strings are matched, so both narrow the same choice.
    pub async fn resolve(&self) -> Result<Vec<Revision>, PlanError> {
        let mut sources: Vec<SourceRef> = self.definition.sources().to_vec();
        if sources.is_empty() {
            return Err(ConfigurationError::NoSources {
                project: self.definition.name().to_string(),
            }
            .into());
        }

        if let Some(version) = &self.version {
            let filtered = SingleVersionFilter::new(sources[0].clone(), version)?;
            if !self.revisions.is_empty() && filtered.versions().await?.is_empty() {
                return Err(ConfigurationError::NoMatchingSource {
                    requested: format!("{}@{}", self.definition.name(), version),
                }
                .into());
            }
            sources[0] = Arc::new(filtered);
        }

        if !self.revisions.is_empty() {
            return Ok(vec![select(&sources, &self.revisions).await?]);
        }
        Ok(resolve(&sources).await?)
    }
}

/// Parse `name[@version]`.
pub fn parse_project_selector(selector: &str) -> (&str, Option<&str>) {
    match selector.split_once('@') {
        Some((name, version)) if !version.is_empty() => (name, Some(version)),
        Some((name, _)) => (name, None),
        None => (selector, None),
    }
}

/// Turns experiments and project selections into the plan tree.
///
/// The plan is computed on first use and cached; later calls return the
/// same nodes.
pub struct Experimentator {
    settings: Arc<Settings>,
    experiments: Vec<Arc<dyn Experiment>>,
    projects: Vec<ProjectSelection>,
    plan: OnceCell<Vec<Node>>,
}

impl Experimentator {
    /// Plan `experiments` over `projects`.
    pub fn new(
        settings: Arc<Settings>,
        experiments: Vec<Arc<dyn Experiment>>,
        projects: Vec<ProjectSelection>,
    ) -> Self {
        Self {
            settings,
            experiments,
            projects,
            plan: OnceCell::new(),
        }
    }

    /// Resolve names through the registries.
    ///
    /// `projects` entries are `name[@version]`; `group` adds every project of
    /// that group. `revisions` applies to every selected project.
    pub fn from_registries<S: AsRef<str>>(
        registries: &Registries,
        settings: Arc<Settings>,
        experiments: &[S],
        projects: &[S],
        group: Option<&str>,
        revisions: &[String],
    ) -> Result<Self, ConfigurationError> {
        let experiments = experiments
            .iter()
            .map(|name| {
                registries
                    .experiments
                    .resolve(name.as_ref())
                    .ok_or_else(|| ConfigurationError::UnknownExperiment(name.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut selections = Vec::new();
        for selector in projects {
            let (name, version) = parse_project_selector(selector.as_ref());
            let definition = registries
                .projects
                .resolve(name)
                .ok_or_else(|| ConfigurationError::UnknownProject(name.to_string()))?;
            let mut selection = ProjectSelection::new(definition).revisions(revisions.to_vec());
            if let Some(version) = version {
                selection = selection.version(version);
            }
            selections.push(selection);
        }

        if let Some(group) = group {
            let before = selections.len();
            for (_, definition) in registries.projects.all() {
                let already = selections
                    .iter()
                    .any(|s| s.definition().name() == definition.name());
                if definition.group() == group && !already {
                    selections.push(ProjectSelection::new(definition.clone()).revisions(revisions.to_vec()));
                }
            }
            if selections.len() == before {
                return Err(ConfigurationError::UnknownProject(group.to_string()));
            }
        }

        Ok(Self::new(settings, experiments, selections))
    }

    /// The plan, one experiment node per experiment.
    pub async fn plan(&self) -> Result<&[Node], PlanError> {
        let plan = self.plan.get_or_try_init(|| self.build()).await?;
        Ok(plan)
    }

    /// Settings the plan was built with.
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    async fn build(&self) -> Result<Vec<Node>, PlanError> {
        let mut resolved = Vec::with_capacity(self.projects.len());
        for selection in &self.projects {
            let revisions = selection.resolve().await?;
            debug!(project = %selection.definition().name(), count = revisions.len(), "Resolved revisions");
            resolved.push((selection.definition().clone(), revisions));
        }

        let mut plan = Vec::with_capacity(self.experiments.len());
        for experiment in &self.experiments {
            let id = match self.settings.experiment_id {
                Some(base) => base.for_experiment(experiment.name()),
                None => ExperimentId::new(),
            };
            let mut children = Vec::new();

            for (definition, revisions) in &resolved {
                let sampled = experiment.sample(revisions.clone(), &self.settings);
                for revision in sampled {
                    for pass in 0..experiment.passes() {
                        children.push(self.project_tree(experiment.as_ref(), definition, &revision, pass)?);
                    }
                }
            }

            let tree_count = children.len();
            let mut cleanup = self.settings.cleanup_paths.clone();
            cleanup.push(self.settings.build_dir.join(format!("handoff-{}", id)));
            children.push(Step::clean_extra(cleanup).into());

            info!(experiment = %experiment.name(), id = %id, projects = tree_count, "Planned experiment");
            plan.push(ExperimentStep::new(id, experiment.name(), experiment.description(), children).into());
        }

        Ok(plan)
    }

    fn project_tree(
        &self,
        experiment: &dyn Experiment,
        definition: &Arc<dyn ProjectDefinition>,
        revision: &Revision,
        pass: usize,
    ) -> Result<Node, PlanError> {
        let project = Arc::new(ProjectInstance::new(
            definition.clone(),
            revision.clone(),
            &self.settings,
        )?);

        let mut steps: Vec<Node> = vec![
            Step::clean(&project).into(),
            Step::prepare(&project).into(),
            Step::echo(
                &project,
                format!(
                    "{} {} at {} in {}",
                    experiment.name(),
                    project.name(),
                    revision,
                    project.builddir().display()
                ),
            )
            .into(),
            Step::download(&project).into(),
        ];
        steps.extend(experiment.actions_for_project(&project, pass, &self.settings));
        steps.push(Step::clean(&project).into());

        Ok(RequireAll::for_project(&project, steps).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::Node;
    use crate::project::tests::{list, FakeProject};
    use crate::cancel::CancellationToken;
    use crate::context::RunContext;
    use crate::engine::ExecutionEngine;
    use crate::step::{Action, Scope, StepKind};
    use revbench_storage::{JsonStorage, Storage};

    struct BuildOnly;

    impl Experiment for BuildOnly {
        fn name(&self) -> &str {
            "build-only"
        }

        fn sample(&self, mut revisions: Vec<Revision>, _: &Settings) -> Vec<Revision> {
            revisions.truncate(2);
            revisions
        }

        fn actions_for_project(&self, project: &Arc<ProjectInstance>, _: usize, _: &Settings) -> Vec<Node> {
            vec![Step::build(project, Scope::default()).into()]
        }
    }

    fn fake() -> Arc<FakeProject> {
        Arc::new(FakeProject::with_sources(vec![
            list("main", &["v1", "v2", "v3"]),
            list("inputs", &["small", "large"]),
        ]))
    }

    fn experiment_children(node: &Node) -> &[Node] {
        match node {
            Node::Experiment(e) => e.children(),
            _ => panic!("not an experiment"),
        }
    }

    #[tokio::test]
    async fn test_plan_shape_and_cache() {
        let settings = Arc::new(Settings {
            cleanup_paths: vec!["scratch".into()],
            ..Settings::default()
        });
        let planner = Experimentator::new(
            settings,
            vec![Arc::new(BuildOnly)],
            vec![ProjectSelection::new(fake())],
        );

        let plan = planner.plan().await.unwrap();
        assert_eq!(plan.len(), 1);
        let children = experiment_children(&plan[0]);
        // Two sampled revisions plus the trailing cleanup.
        assert_eq!(children.len(), 3);
        assert!(children[2].is_cleanup());

        let Node::RequireAll(tree) = &children[0] else {
            panic!("expected a project tree");
        };
        let kinds: Vec<_> = tree
            .children()
            .iter()
            .map(|n| match n {
                Node::Step(s) => s.name(),
                _ => "composite",
            })
            .collect();
        assert_eq!(kinds, vec!["clean", "prepare", "echo", "download", "build", "clean"]);
        assert_eq!(plan[0].count(), 6 * 2 + 1);

        let again = planner.plan().await.unwrap();
        assert!(std::ptr::eq(plan, again));
    }

    #[tokio::test]
    async fn test_version_filter_on_primary() {
        let selection = ProjectSelection::new(fake()).version("v2");
        let revisions = selection.resolve().await.unwrap();
        assert_eq!(revisions.len(), 2);
        assert!(revisions.iter().all(|r| r.version_of(Some("main")) == Some("v2")));
    }

    #[tokio::test]
    async fn test_revision_strings_select_one() {
        let selection = ProjectSelection::new(fake()).revisions(vec!["large".into()]);
        let revisions = selection.resolve().await.unwrap();
        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].identifier(), "main@v1,inputs@large");
    }

    #[tokio::test]
    async fn test_version_constraint_applies_to_revision_strings() {
        let selection = ProjectSelection::new(fake())
            .revisions(vec!["large".into()])
            .version("v2");
        let revisions = selection.resolve().await.unwrap();
        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].identifier(), "main@v2,inputs@large");

        // A string for another version of the constrained source has nothing to match.
        let conflicting = ProjectSelection::new(fake())
            .revisions(vec!["v3".into()])
            .version("v2");
        assert!(matches!(
            conflicting.resolve().await,
            Err(PlanError::Source(_))
        ));

        let missing = ProjectSelection::new(fake())
            .revisions(vec!["large".into()])
            .version("v9");
        assert!(matches!(
            missing.resolve().await,
            Err(PlanError::Configuration(ConfigurationError::NoMatchingSource { .. }))
        ));
    }

    #[tokio::test]
    async fn test_project_without_sources_is_rejected() {
        let planner = Experimentator::new(
            Arc::new(Settings::default()),
            vec![Arc::new(BuildOnly)],
            vec![ProjectSelection::new(Arc::new(FakeProject::default()))],
        );
        assert!(matches!(
            planner.plan().await,
            Err(PlanError::Configuration(ConfigurationError::NoSources { .. }))
        ));
    }

    #[test]
    fn test_registry_lookup_errors() {
        let registries = Registries::new();
        let err = Experimentator::from_registries(
            &registries,
            Arc::new(Settings::default()),
            &["missing"],
            &[],
            None,
            &[],
        )
        .err()
        .unwrap();
        assert_eq!(err, ConfigurationError::UnknownExperiment("missing".into()));
    }

    #[test]
    fn test_parse_project_selector() {
        assert_eq!(parse_project_selector("zlib@4f2a"), ("zlib", Some("4f2a")));
        assert_eq!(parse_project_selector("zlib"), ("zlib", None));
        assert_eq!(parse_project_selector("zlib@"), ("zlib", None));
    }

    struct EchoOnly;

    impl Experiment for EchoOnly {
        fn name(&self) -> &str {
            "echo-only"
        }

        fn description(&self) -> &str {
            "Announce revisions"
        }

        fn actions_for_project(&self, _: &Arc<ProjectInstance>, _: usize, _: &Settings) -> Vec<Node> {
            Vec::new()
        }
    }

    fn experiment_of(node: &Node) -> &ExperimentStep {
        match node {
            Node::Experiment(e) => e,
            _ => panic!("not an experiment"),
        }
    }

    #[tokio::test]
    async fn test_fixed_base_id_gives_each_experiment_its_own_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let base = ExperimentId::new();
        let settings = Arc::new(Settings {
            build_dir: dir.path().join("build"),
            experiment_id: Some(base),
            ..Settings::default()
        });
        let planner = Experimentator::new(
            settings.clone(),
            vec![Arc::new(BuildOnly), Arc::new(EchoOnly)],
            vec![ProjectSelection::new(fake())],
        );
        let plan = planner.plan().await.unwrap();

        let ids: Vec<_> = plan.iter().map(|n| experiment_of(n).id()).collect();
        assert_eq!(ids, vec![base.for_experiment("build-only"), base.for_experiment("echo-only")]);
        for (node, id) in plan.iter().zip(&ids) {
            let Node::Step(cleanup) = experiment_of(node).children().last().unwrap() else {
                panic!("expected cleanup");
            };
            assert!(matches!(
                cleanup.kind(),
                StepKind::CleanExtra(paths) if paths.iter().any(|p| p.ends_with(format!("handoff-{}", id)))
            ));
        }

        let storage = Arc::new(JsonStorage::new(dir.path().join("db")).await.unwrap());
        let ctx = RunContext::new(settings, storage.clone(), CancellationToken::new());
        ExecutionEngine::new(ctx).run(plan).await;

        let records = storage.list_experiments().await.unwrap();
        assert_eq!(records.len(), 2);
        let mut names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["build-only", "echo-only"]);
        assert!(records.iter().all(|r| r.end.is_some()));
    }
}
