//! Sources without fetchable content: plain version lists and context
//! dependent tables.

use crate::error::{Result, SourceError};
use crate::revision::Revision;
use crate::variant::{Remote, Source, Version};
use async_trait::async_trait;
use revbench_core::ConfigurationError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A context-free source whose versions are plain labels, e.g. input sets or
/// parameters. Materializing creates an empty directory.
#[derive(Debug, Clone)]
pub struct List {
    local: String,
    remote: Remote,
    versions: Vec<String>,
}

impl List {
    /// Create a list source.
    pub fn new<I, S>(local: impl Into<String>, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            local: local.into(),
            remote: Remote::None,
            versions: versions.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Source for List {
    fn local(&self) -> &str {
        &self.local
    }

    fn remote(&self) -> &Remote {
        &self.remote
    }

    async fn versions(&self) -> Result<Vec<Version>> {
        Ok(self.versions.iter().map(Version::new).collect())
    }

    async fn version(&self, target_dir: &Path, version: &str) -> Result<PathBuf> {
        if !self.versions.iter().any(|v| v == version) {
            return Err(SourceError::UnknownVersion {
                source_name: self.local.clone(),
                version: version.to_string(),
            });
        }
        materialize_dir(target_dir, &self.local).await
    }
}

/// A context-aware source: its versions are looked up in a table keyed by the
/// version chosen for another source.
#[derive(Debug, Clone)]
pub struct Conditional {
    local: String,
    remote: Remote,
    depends_on: String,
    table: BTreeMap<String, Vec<String>>,
}

impl Conditional {
    /// Create a source whose versions depend on the source `depends_on`.
    pub fn new(
        local: impl Into<String>,
        depends_on: impl Into<String>,
        table: BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self {
            local: local.into(),
            remote: Remote::None,
            depends_on: depends_on.into(),
            table,
        }
    }

    /// The source this one depends on.
    pub fn depends_on(&self) -> &str {
        &self.depends_on
    }
}

#[async_trait]
impl Source for Conditional {
    fn local(&self) -> &str {
        &self.local
    }

    fn remote(&self) -> &Remote {
        &self.remote
    }

    fn is_context_free(&self) -> bool {
        false
    }

    async fn versions(&self) -> Result<Vec<Version>> {
        Err(SourceError::NotSupported {
            source_name: self.local.clone(),
            operation: "versions without context",
        })
    }

    async fn versions_with_context(&self, context: &Revision) -> Result<Vec<Version>> {
        let Some(chosen) = context.get(&self.depends_on) else {
            return Err(ConfigurationError::Unsatisfiable {
                source_name: self.local.clone(),
                reason: format!("'{}' is not part of the revision", self.depends_on),
            }
            .into());
        };

        Ok(self
            .table
            .get(chosen.version())
            .map(|labels| labels.iter().map(Version::new).collect())
            .unwrap_or_default())
    }

    async fn version(&self, target_dir: &Path, _version: &str) -> Result<PathBuf> {
        materialize_dir(target_dir, &self.local).await
    }
}

async fn materialize_dir(target_dir: &Path, local: &str) -> Result<PathBuf> {
    let path = target_dir.join(local);
    tokio::fs::create_dir_all(&path).await?;
    Ok(path)
}
