//! Restricting a source to a single version.

use crate::error::{Result, SourceError};
use crate::variant::{Remote, Source, SourceRef, Version};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Restricts a context-free source to at most one version label.
///
/// The wrapped source is left untouched; [`SingleVersionFilter::explore`]
/// still returns everything it offers.
#[derive(Debug, Clone)]
pub struct SingleVersionFilter {
    inner: SourceRef,
    filter: String,
}

impl SingleVersionFilter {
    /// Wrap `inner`, keeping only the version labelled `filter`.
    pub fn new(inner: SourceRef, filter: impl Into<String>) -> Result<Self> {
        if !inner.is_context_free() {
            return Err(SourceError::NotSupported {
                source_name: inner.local().to_string(),
                operation: "single version filters",
            });
        }
        Ok(Self {
            inner,
            filter: filter.into(),
        })
    }

    /// The label kept by this filter.
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// The wrapped source.
    pub fn inner(&self) -> &SourceRef {
        &self.inner
    }

    /// All versions of the wrapped source, ignoring the filter.
    pub async fn explore(&self) -> Result<Vec<Version>> {
        self.inner.versions().await
    }
}

#[async_trait]
impl Source for SingleVersionFilter {
    fn local(&self) -> &str {
        self.inner.local()
    }

    fn remote(&self) -> &Remote {
        self.inner.remote()
    }

    async fn versions(&self) -> Result<Vec<Version>> {
        Ok(self
            .inner
            .versions()
            .await?
            .into_iter()
            .find(|v| v.label == self.filter)
            .into_iter()
            .collect())
    }

    async fn default_version(&self) -> Result<Version> {
        match self.versions().await?.into_iter().next() {
            Some(version) => Ok(version),
            None => self.inner.default_version().await,
        }
    }

    async fn version(&self, target_dir: &Path, version: &str) -> Result<PathBuf> {
        self.inner.version(target_dir, version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Conditional, List};
    use std::sync::Arc;

    fn labels(versions: &[Version]) -> Vec<&str> {
        versions.iter().map(|v| v.label.as_str()).collect()
    }

    #[tokio::test]
    async fn test_filter_keeps_matching_version() {
        let src: SourceRef = Arc::new(List::new("src", ["v1", "v2", "v3"]));
        let filtered = SingleVersionFilter::new(src.clone(), "v2").unwrap();

        let versions = filtered.versions().await.unwrap();
        assert_eq!(labels(&versions), vec!["v2"]);
        assert_eq!(filtered.default_version().await.unwrap().label, "v2");
        assert_eq!(filtered.local(), "src");
    }

    #[tokio::test]
    async fn test_filter_without_match_is_empty() {
        let src: SourceRef = Arc::new(List::new("src", ["v1", "v2"]));
        let filtered = SingleVersionFilter::new(src, "v9").unwrap();
        assert!(filtered.versions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_explore_returns_unfiltered_set() {
        let src: SourceRef = Arc::new(List::new("src", ["v1", "v2", "v3"]));
        let filtered = SingleVersionFilter::new(src.clone(), "v1").unwrap();
        assert_eq!(
            filtered.explore().await.unwrap(),
            src.versions().await.unwrap()
        );
        // The wrapped source is unchanged.
        assert_eq!(src.versions().await.unwrap().len(), 3);
    }

    #[test]
    fn test_context_aware_source_is_rejected() {
        let src: SourceRef = Arc::new(Conditional::new("flags", "compiler", Default::default()));
        assert!(matches!(
            SingleVersionFilter::new(src, "-O2"),
            Err(SourceError::NotSupported { .. })
        ));
    }
}
