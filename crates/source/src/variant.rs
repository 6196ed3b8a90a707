//! Source abstraction and the variants it offers.

use crate::error::{Result, SourceError};
use crate::revision::Revision;
use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared handle to a source. Variants keep one to their owner.
pub type SourceRef = Arc<dyn Source>;

/// Where a source fetches from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remote {
    /// Nothing to fetch
    None,
    /// A single URL or repository address
    Url(String),
    /// One URL per version label, in declaration order
    Named(Vec<(String, String)>),
}

/// A version label offered by a source, with optional descriptive detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// The label used for selection and equality
    pub label: String,

    /// Extra information, e.g. a commit summary
    pub detail: Option<String>,
}

impl Version {
    /// Create a version without detail.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            detail: None,
        }
    }

    /// Attach detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// A fetchable unit of code with a discrete set of versions.
///
/// Context-free sources enumerate their versions on their own. Context-aware
/// sources only know their versions once other sources of the same revision
/// are chosen; they report `is_context_free() == false`, answer
/// [`Source::versions_with_context`] and fail [`Source::versions`].
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Stable key of this source within a project.
    fn local(&self) -> &str;

    /// Where this source fetches from.
    fn remote(&self) -> &Remote;

    /// Whether the version set is independent of other sources.
    fn is_context_free(&self) -> bool {
        true
    }

    /// All versions of a context-free source.
    async fn versions(&self) -> Result<Vec<Version>>;

    /// The version used when nothing is selected explicitly.
    async fn default_version(&self) -> Result<Version> {
        self.versions()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::NoVersions(self.local().to_string()))
    }

    /// Versions consistent with an already chosen partial revision.
    async fn versions_with_context(&self, _context: &Revision) -> Result<Vec<Version>> {
        self.versions().await
    }

    /// Materialize `version` below `target_dir` and return its path.
    ///
    /// Calling this again for a version already present is a no-op.
    async fn version(&self, target_dir: &Path, version: &str) -> Result<PathBuf>;
}

/// One concrete version of a source.
///
/// Equality and hashing only look at the owner's local key and the label.
#[derive(Clone)]
pub struct Variant {
    owner: SourceRef,
    version: Version,
}

impl Variant {
    /// Create a variant owned by `owner`.
    pub fn new(owner: SourceRef, version: Version) -> Self {
        Self { owner, version }
    }

    /// The owning source.
    pub fn owner(&self) -> &SourceRef {
        &self.owner
    }

    /// Local key of the owning source.
    pub fn source_name(&self) -> &str {
        self.owner.local()
    }

    /// The version label.
    pub fn version(&self) -> &str {
        &self.version.label
    }

    /// Descriptive detail, if the source provided any.
    pub fn detail(&self) -> Option<&str> {
        self.version.detail.as_deref()
    }

    /// Fetch this variant into `target_dir`.
    pub async fn materialize(&self, target_dir: &Path) -> Result<PathBuf> {
        self.owner.version(target_dir, self.version()).await
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        self.source_name() == other.source_name() && self.version() == other.version()
    }
}

impl Eq for Variant {}

impl Hash for Variant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source_name().hash(state);
        self.version().hash(state);
    }
}

impl std::fmt::Debug for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Variant({}@{})", self.source_name(), self.version())
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.version())
    }
}

/// Turn a source's versions into variants owned by it.
pub(crate) fn variants_of(source: &SourceRef, versions: Vec<Version>) -> Vec<Variant> {
    versions
        .into_iter()
        .map(|v| Variant::new(source.clone(), v))
        .collect()
}
