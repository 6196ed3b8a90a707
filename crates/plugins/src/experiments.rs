//! Built-in experiments.

use revbench_core::Settings;
use revbench_execution::{
    AnyOf, Experiment, Node, PluginError, ProjectInstance, Registries, RequireAll, Scope, Step,
};
use revbench_source::Revision;
use std::sync::Arc;

/// Only announces each project revision.
pub struct Empty;

impl Experiment for Empty {
    fn name(&self) -> &str {
        "empty"
    }

    fn description(&self) -> &str {
        "Prepare and download every project, do nothing else"
    }

    fn actions_for_project(&self, _: &Arc<ProjectInstance>, _: usize, _: &Settings) -> Vec<Node> {
        Vec::new()
    }
}

/// Configure, build and run with the default flags.
pub struct Raw;

impl Experiment for Raw {
    fn name(&self) -> &str {
        "raw"
    }

    fn description(&self) -> &str {
        "Configure, build and run each revision unchanged"
    }

    fn sample(&self, mut revisions: Vec<Revision>, settings: &Settings) -> Vec<Revision> {
        if let Some(limit) = settings.sample_limit {
            revisions.truncate(limit);
        }
        revisions
    }

    fn actions_for_project(&self, project: &Arc<ProjectInstance>, _: usize, _: &Settings) -> Vec<Node> {
        vec![
            Step::configure(project, Scope::default()).into(),
            Step::build(project, Scope::default()).into(),
            Step::run(project, Scope::default()).into(),
        ]
    }
}

/// Optimization levels tried by [`OptLevels`].
pub const OPT_LEVELS: &[&str] = &["O0", "O2", "O3"];

/// Build and run once per optimization level. A failing level does not stop
/// the others.
pub struct OptLevels;

impl Experiment for OptLevels {
    fn name(&self) -> &str {
        "opt-levels"
    }

    fn description(&self) -> &str {
        "Build and run each revision at -O0, -O2 and -O3"
    }

    fn actions_for_project(&self, project: &Arc<ProjectInstance>, _: usize, _: &Settings) -> Vec<Node> {
        let configs = OPT_LEVELS
            .iter()
            .map(|level| {
                let flag = format!("-{}", level);
                let scope = Scope::labelled(*level)
                    .env("CFLAGS", flag.clone())
                    .env("CXXFLAGS", flag);
                RequireAll::new(
                    format!("{} [{}]", project.name(), level),
                    vec![
                        Step::configure(project, scope.clone()).into(),
                        Step::build(project, scope.clone()).into(),
                        Step::run(project, scope).into(),
                    ],
                )
                .into()
            })
            .collect();
        vec![AnyOf::new("opt-levels", configs).into()]
    }
}

/// Profile-guided optimization in two passes.
///
/// The first pass builds instrumented and runs to collect a profile, which it
/// publishes under a key derived from project and revision. The second pass
/// retrieves that profile into its own build directory and rebuilds with it.
pub struct Pgo;

impl Pgo {
    fn profile_key(project: &ProjectInstance) -> String {
        format!("{}-{}-profile", project.name(), project.revision().identifier())
    }
}

impl Experiment for Pgo {
    fn name(&self) -> &str {
        "pgo"
    }

    fn description(&self) -> &str {
        "Instrumented build and run, then a profile-optimized rebuild"
    }

    fn passes(&self) -> usize {
        2
    }

    fn actions_for_project(&self, project: &Arc<ProjectInstance>, pass: usize, _: &Settings) -> Vec<Node> {
        let profile = project.builddir().join("profile");
        let key = Self::profile_key(project);

        if pass == 0 {
            let flag = format!("-fprofile-generate={}", profile.display());
            let scope = Scope::labelled("instrumented")
                .env("CFLAGS", flag.clone())
                .env("CXXFLAGS", flag);
            vec![
                Step::configure(project, scope.clone()).into(),
                Step::build(project, scope.clone()).into(),
                Step::run(project, scope).into(),
                Step::publish(project, key, "profile").into(),
            ]
        } else {
            let flag = format!("-fprofile-use={} -fprofile-correction", profile.display());
            let scope = Scope::labelled("optimized")
                .env("CFLAGS", flag.clone())
                .env("CXXFLAGS", flag);
            vec![
                Step::retrieve(project, key, "profile").into(),
                Step::configure(project, scope.clone()).into(),
                Step::build(project, scope.clone()).into(),
                Step::run(project, scope).into(),
            ]
        }
    }
}

pub(crate) fn register_empty(registries: &mut Registries, _: &Settings) -> Result<(), PluginError> {
    registries.experiments.register("empty", Arc::new(Empty));
    Ok(())
}

pub(crate) fn register_raw(registries: &mut Registries, _: &Settings) -> Result<(), PluginError> {
    registries.experiments.register("raw", Arc::new(Raw));
    Ok(())
}

pub(crate) fn register_opt_levels(registries: &mut Registries, _: &Settings) -> Result<(), PluginError> {
    registries.experiments.register("opt-levels", Arc::new(OptLevels));
    Ok(())
}

pub(crate) fn register_pgo(registries: &mut Registries, _: &Settings) -> Result<(), PluginError> {
    registries.experiments.register("pgo", Arc::new(Pgo));
    Ok(())
}
