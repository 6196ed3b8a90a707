//! Immutable run settings.

use crate::error::ConfigError;
use crate::id::ExperimentId;
use crate::project::ProjectSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Plugins loaded when the settings name none.
pub const DEFAULT_PLUGINS: &[&str] = &[
    "revbench.experiments.empty",
    "revbench.experiments.raw",
    "revbench.experiments.opt-levels",
    "revbench.experiments.pgo",
    "revbench.projects.declared",
    "revbench.reports.status",
];

/// Settings for one process.
///
/// Loaded once, adjusted by command-line flags and then shared read-only
/// (behind an `Arc`) with the plan builder and every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the per-project build directories
    pub build_dir: PathBuf,

    /// Shared cache for fetched sources, keyed by source local name
    pub source_cache: PathBuf,

    /// Where experiment and run records are persisted
    pub storage_dir: PathBuf,

    /// Keep build directories after a project finished
    pub keep_build_dirs: bool,

    /// Paths removed after every experiment, whatever its outcome
    pub cleanup_paths: Vec<PathBuf>,

    /// Plugins to discover
    pub plugins: Vec<String>,

    /// Environment passed to every project command
    pub env: BTreeMap<String, String>,

    /// Base id for batches; each experiment records under an id derived
    /// from it and the experiment name
    pub experiment_id: Option<ExperimentId>,

    /// Count degraded (`CAN_CONTINUE`) results as failures
    pub strict: bool,

    /// Experiments that sample take at most this many revisions
    pub sample_limit: Option<usize>,

    /// Projects declared in configuration
    pub projects: Vec<ProjectSpec>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("results"),
            source_cache: PathBuf::from(".revbench/cache"),
            storage_dir: PathBuf::from(".revbench/db"),
            keep_build_dirs: false,
            cleanup_paths: Vec::new(),
            plugins: DEFAULT_PLUGINS.iter().map(|p| p.to_string()).collect(),
            env: BTreeMap::new(),
            experiment_id: None,
            strict: false,
            sample_limit: None,
            projects: Vec::new(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Load settings from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::SourceSpec;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let settings = Settings::from_toml_str("keep_build_dirs = true").unwrap();
        assert!(settings.keep_build_dirs);
        assert_eq!(settings.build_dir, PathBuf::from("results"));
        assert_eq!(settings.plugins.len(), DEFAULT_PLUGINS.len());
    }

    #[test]
    fn test_declared_projects() {
        let text = r#"
            sample_limit = 2

            [env]
            CC = "clang"

            [[projects]]
            name = "hello"
            build = ["make"]

            [[projects.sources]]
            kind = "list"
            local = "inputs"
            versions = ["small", "large"]

            [[projects.sources]]
            kind = "http"
            local = "data"
            versions = [
                { label = "v2", url = "https://example.org/v2.tar.gz" },
                { label = "v10", url = "https://example.org/v10.tar.gz" },
            ]

            [[projects.sources]]
            kind = "conditional"
            local = "reference"
            depends_on = "inputs"
            table = { small = ["ref-small"] }
        "#;
        let settings = Settings::from_toml_str(text).unwrap();
        assert_eq!(settings.sample_limit, Some(2));
        assert_eq!(settings.env.get("CC").map(String::as_str), Some("clang"));

        let project = &settings.projects[0];
        assert_eq!(project.group, "default");
        assert_eq!(project.sources.len(), 3);
        assert_eq!(project.sources[0].local(), "inputs");
        // Downloads keep their declared order.
        let SourceSpec::Http { versions, .. } = &project.sources[1] else {
            panic!("expected an http source");
        };
        let labels: Vec<_> = versions.iter().map(|v| v.label.as_str()).collect();
        assert_eq!(labels, vec!["v2", "v10"]);
        assert!(matches!(
            &project.sources[2],
            SourceSpec::Conditional { depends_on, .. } if depends_on == "inputs"
        ));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Settings::from_toml_str("build_dir = ["),
            Err(ConfigError::Toml(_))
        ));
    }
}
