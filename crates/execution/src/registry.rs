//! Name-to-implementation registries and plugin discovery.

use crate::error::PluginError;
use crate::experiment::{Experiment, Report};
use crate::project::ProjectDefinition;
use revbench_core::Settings;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registry for one kind of implementation.
pub struct Registry<T: ?Sized> {
    kind: &'static str,
    entries: BTreeMap<String, Arc<T>>,
}

impl<T: ?Sized> Registry<T> {
    /// Create an empty registry for `kind` (used in log messages).
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    /// Register an implementation. A duplicate name replaces the previous
    /// entry and is logged.
    pub fn register(&mut self, name: impl Into<String>, item: Arc<T>) {
        let name = name.into();
        if self.entries.insert(name.clone(), item).is_some() {
            warn!(kind = self.kind, name = %name, "Duplicate registration, last one wins");
        }
    }

    /// Get an implementation by name.
    pub fn resolve(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).cloned()
    }

    /// All entries, sorted by name.
    pub fn all(&self) -> impl Iterator<Item = (&str, &Arc<T>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn merge(&mut self, other: Registry<T>) {
        for (name, item) in other.entries {
            self.register(name, item);
        }
    }
}

/// The registries filled by plugins.
pub struct Registries {
    /// Experiments by name
    pub experiments: Registry<dyn Experiment>,
    /// Projects by name
    pub projects: Registry<dyn ProjectDefinition>,
    /// Reports by name
    pub reports: Registry<dyn Report>,
}

impl Registries {
    /// Empty registries.
    pub fn new() -> Self {
        Self {
            experiments: Registry::new("experiment"),
            projects: Registry::new("project"),
            reports: Registry::new("report"),
        }
    }

    fn merge(&mut self, other: Registries) {
        self.experiments.merge(other.experiments);
        self.projects.merge(other.projects);
        self.reports.merge(other.reports);
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration hook of a plugin.
pub type RegisterFn = fn(&mut Registries, &Settings) -> Result<(), PluginError>;

/// A named unit of registrations.
#[derive(Clone)]
pub struct Plugin {
    /// Plugin name, as listed in the settings
    pub name: String,
    /// Registers the plugin's implementations
    pub register: RegisterFn,
}

impl Plugin {
    /// Create a plugin.
    pub fn new(name: impl Into<String>, register: RegisterFn) -> Self {
        Self {
            name: name.into(),
            register,
        }
    }
}

/// Discovery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    /// `discover` has not run
    Unpopulated,
    /// `discover` ran at least once
    Populated,
}

/// Loads plugins by name from a static catalog into the registries.
pub struct Discovery {
    catalog: BTreeMap<String, Plugin>,
    loaded: BTreeSet<String>,
    state: DiscoveryState,
    registries: Registries,
}

impl Discovery {
    /// Discovery over the plugins of `catalog`.
    pub fn new(catalog: impl IntoIterator<Item = Plugin>) -> Self {
        Self {
            catalog: catalog
                .into_iter()
                .map(|plugin| (plugin.name.clone(), plugin))
                .collect(),
            loaded: BTreeSet::new(),
            state: DiscoveryState::Unpopulated,
            registries: Registries::new(),
        }
    }

    /// Load the named plugins.
    ///
    /// Plugins already loaded are skipped. A failing plugin is logged and
    /// left out, registering nothing; it is retried by the next call. The
    /// failures are returned for reporting.
    pub fn discover<S: AsRef<str>>(&mut self, names: &[S], settings: &Settings) -> Vec<PluginError> {
        let mut failures = Vec::new();

        for name in names {
            let name = name.as_ref();
            if self.loaded.contains(name) {
                debug!(plugin = name, "Already loaded");
                continue;
            }

            let result = match self.catalog.get(name) {
                Some(plugin) => {
                    let mut scratch = Registries::new();
                    (plugin.register)(&mut scratch, settings).map(|()| scratch)
                }
                None => Err(PluginError::NotFound(name.to_string())),
            };

            match result {
                Ok(registered) => {
                    self.registries.merge(registered);
                    self.loaded.insert(name.to_string());
                    info!(plugin = name, "Loaded plugin");
                }
                Err(e) => {
                    warn!(plugin = name, error = %e, "Failed to load plugin");
                    failures.push(e);
                }
            }
        }

        self.state = DiscoveryState::Populated;
        failures
    }

    /// Current state.
    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    /// Names of the loaded plugins.
    pub fn loaded(&self) -> impl Iterator<Item = &str> {
        self.loaded.iter().map(String::as_str)
    }

    /// Names of every plugin in the catalog.
    pub fn available(&self) -> impl Iterator<Item = &str> {
        self.catalog.keys().map(String::as_str)
    }

    /// Read access to the registries.
    pub fn registries(&self) -> &Registries {
        &self.registries
    }
}
