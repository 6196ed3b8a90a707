//! Projects declared in the settings file, driven by external commands.

use async_trait::async_trait;
use revbench_core::{ConfigurationError, ProjectSpec, Settings, SourceSpec};
use revbench_execution::{PluginError, ProjectContext, ProjectDefinition, Registries, StepError};
use revbench_source::{Conditional, Git, Http, List, SourceRef};
use revbench_tools::{CommandTool, Tool, ToolInput};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Build the source described by `spec`, caching below `cache_dir`.
pub fn build_source(spec: &SourceSpec, cache_dir: &Path) -> SourceRef {
    match spec {
        SourceSpec::Git {
            local,
            remote,
            limit,
            refspec,
        } => {
            let mut git = Git::new(local.clone(), remote.clone(), cache_dir);
            if let Some(limit) = limit {
                git = git.limit(*limit);
            }
            if let Some(refspec) = refspec {
                git = git.refspec(refspec.clone());
            }
            Arc::new(git)
        }
        SourceSpec::Http { local, versions } => Arc::new(Http::new(
            local.clone(),
            versions.iter().map(|v| (v.label.clone(), v.url.clone())),
            cache_dir,
        )),
        SourceSpec::List { local, versions } => {
            Arc::new(List::new(local.clone(), versions.iter().cloned()))
        }
        SourceSpec::Conditional {
            local,
            depends_on,
            table,
        } => Arc::new(Conditional::new(local.clone(), depends_on.clone(), table.clone())),
    }
}

/// A project whose phases are external commands from its declaration.
///
/// Commands run in the primary source's checkout (or `workdir` below it)
/// with `REVBENCH_BUILD_DIR`, `REVBENCH_REVISION` and, for labelled
/// configurations, `REVBENCH_CONFIG` set.
pub struct CommandProject {
    spec: ProjectSpec,
    sources: Vec<SourceRef>,
}

impl CommandProject {
    /// Create the project from its declaration.
    pub fn from_spec(spec: ProjectSpec, settings: &Settings) -> Result<Self, ConfigurationError> {
        if spec.sources.is_empty() {
            return Err(ConfigurationError::NoSources {
                project: spec.name.clone(),
            });
        }
        for source in &spec.sources {
            if let SourceSpec::Conditional { local, depends_on, .. } = source {
                if !spec.sources.iter().any(|s| s.local() == depends_on) {
                    return Err(ConfigurationError::Unsatisfiable {
                        source_name: local.clone(),
                        reason: format!("depends on undeclared source '{}'", depends_on),
                    });
                }
            }
        }

        let sources = spec
            .sources
            .iter()
            .map(|s| build_source(s, &settings.source_cache))
            .collect();
        Ok(Self { spec, sources })
    }

    /// The declaration.
    pub fn spec(&self) -> &ProjectSpec {
        &self.spec
    }

    async fn command(&self, ctx: &ProjectContext, argv: &[String]) -> Result<(), StepError> {
        let Some((program, args)) = argv.split_first() else {
            return Ok(());
        };
        let project = &ctx.project;
        let mut cwd = project.source_path(None);
        if let Some(workdir) = &self.spec.workdir {
            cwd = cwd.join(workdir);
        }

        let mut input = ToolInput::new(args.iter().cloned())
            .cwd(cwd)
            .envs(&ctx.env);
        input.env.insert(
            "REVBENCH_BUILD_DIR".to_string(),
            project.builddir().display().to_string(),
        );
        input
            .env
            .insert("REVBENCH_REVISION".to_string(), project.revision().identifier());
        if let Some(config) = &ctx.config {
            input.env.insert("REVBENCH_CONFIG".to_string(), config.clone());
        }

        let command = argv.join(" ");
        info!(project = %self.spec.name, command = %command, "Running");
        let output = CommandTool::new(program.clone()).execute(&input).await?;
        debug!(project = %self.spec.name, duration = ?output.duration, "Finished");

        if !output.success() {
            return Err(StepError::Execution {
                command,
                code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectDefinition for CommandProject {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn group(&self) -> &str {
        &self.spec.group
    }

    fn domain(&self) -> &str {
        &self.spec.domain
    }

    fn sources(&self) -> &[SourceRef] {
        &self.sources
    }

    async fn configure(&self, ctx: &ProjectContext) -> Result<(), StepError> {
        self.command(ctx, &self.spec.configure).await
    }

    async fn build(&self, ctx: &ProjectContext) -> Result<(), StepError> {
        self.command(ctx, &self.spec.build).await
    }

    async fn run_tests(&self, ctx: &ProjectContext) -> Result<(), StepError> {
        self.command(ctx, &self.spec.run).await
    }
}

/// Register every project declared in the settings.
pub fn register_declared(registries: &mut Registries, settings: &Settings) -> Result<(), PluginError> {
    for spec in &settings.projects {
        let project = CommandProject::from_spec(spec.clone(), settings)?;
        registries
            .projects
            .register(spec.name.clone(), Arc::new(project));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use revbench_execution::ProjectInstance;
    use revbench_core::HttpVersion;
    use revbench_source::{select, Source};
    use std::collections::BTreeMap;

    fn spec(sources: Vec<SourceSpec>) -> ProjectSpec {
        ProjectSpec {
            name: "hello".into(),
            group: "default".into(),
            domain: String::new(),
            sources,
            configure: Vec::new(),
            build: vec![
                "sh".into(),
                "-c".into(),
                "echo \"$REVBENCH_REVISION $CFLAGS\" > built.txt".into(),
            ],
            run: vec!["sh".into(), "-c".into(), "exit 4".into()],
            workdir: None,
        }
    }

    fn inputs() -> SourceSpec {
        SourceSpec::List {
            local: "inputs".into(),
            versions: vec!["small".into()],
        }
    }

    #[test]
    fn test_declaration_errors() {
        let settings = Settings::default();
        assert!(matches!(
            CommandProject::from_spec(spec(Vec::new()), &settings),
            Err(ConfigurationError::NoSources { .. })
        ));

        let dangling = SourceSpec::Conditional {
            local: "flags".into(),
            depends_on: "compiler".into(),
            table: BTreeMap::new(),
        };
        assert!(matches!(
            CommandProject::from_spec(spec(vec![inputs(), dangling]), &settings),
            Err(ConfigurationError::Unsatisfiable { .. })
        ));
    }

    #[tokio::test]
    async fn test_commands_run_in_primary_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            build_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let definition: Arc<dyn ProjectDefinition> =
            Arc::new(CommandProject::from_spec(spec(vec![inputs()]), &settings).unwrap());
        let revision = select::<&str>(definition.sources(), &[]).await.unwrap();
        let project = Arc::new(ProjectInstance::new(definition.clone(), revision, &settings).unwrap());
        project.download().await.unwrap();

        let ctx = ProjectContext {
            project: project.clone(),
            env: [("CFLAGS".to_string(), "-O2".to_string())].into(),
            config: Some("O2".into()),
        };
        definition.configure(&ctx).await.unwrap();
        definition.build(&ctx).await.unwrap();
        let built = std::fs::read_to_string(project.source_path(None).join("built.txt")).unwrap();
        assert_eq!(built, "inputs@small -O2\n");

        let err = definition.run_tests(&ctx).await.unwrap_err();
        assert!(matches!(err, StepError::Execution { code: 4, .. }));
    }

    #[tokio::test]
    async fn test_http_default_is_first_declared() {
        let downloads = SourceSpec::Http {
            local: "data".into(),
            versions: vec![
                HttpVersion {
                    label: "v2".into(),
                    url: "https://example.org/v2.tar.gz".into(),
                },
                HttpVersion {
                    label: "v10".into(),
                    url: "https://example.org/v10.tar.gz".into(),
                },
            ],
        };
        let source = build_source(&downloads, Path::new("cache"));

        assert_eq!(source.default_version().await.unwrap().label, "v2");
        let labels: Vec<_> = source.versions().await.unwrap().into_iter().map(|v| v.label).collect();
        assert_eq!(labels, vec!["v2", "v10"]);
    }

    #[test]
    fn test_register_declared() {
        let settings = Settings {
            projects: vec![spec(vec![inputs()])],
            ..Settings::default()
        };
        let mut registries = Registries::new();
        register_declared(&mut registries, &settings).unwrap();
        let project = registries.projects.resolve("hello").unwrap();
        assert_eq!(project.sources().len(), 1);
        assert_eq!(project.sources()[0].local(), "inputs");
    }
}
