//! Named downloads. Each version label maps to one URL.

use crate::error::{Result, SourceError};
use crate::lock::CacheLock;
use crate::variant::{Remote, Source, Version};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A source whose versions are files downloaded over HTTP.
///
/// Downloads land in `<cache_dir>/<local>/<version>/<file>` and are copied
/// into `<target_dir>/<local>/<file>`.
#[derive(Debug, Clone)]
pub struct Http {
    local: String,
    remote: Remote,
    cache_dir: PathBuf,
    client: reqwest::Client,
}

impl Http {
    /// Create a download source from `(label, url)` pairs.
    pub fn new<I, L, U>(local: impl Into<String>, urls: I, cache_dir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = (L, U)>,
        L: Into<String>,
        U: Into<String>,
    {
        Self {
            local: local.into(),
            remote: Remote::Named(
                urls.into_iter()
                    .map(|(label, url)| (label.into(), url.into()))
                    .collect(),
            ),
            cache_dir: cache_dir.into(),
            client: reqwest::Client::new(),
        }
    }

    fn urls(&self) -> &[(String, String)] {
        match &self.remote {
            Remote::Named(urls) => urls,
            _ => &[],
        }
    }

    fn url_of(&self, version: &str) -> Result<&str> {
        self.urls()
            .iter()
            .find(|(label, _)| label == version)
            .map(|(_, url)| url.as_str())
            .ok_or_else(|| SourceError::UnknownVersion {
                source_name: self.local.clone(),
                version: version.to_string(),
            })
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        info!(source = %self.local, url, "Downloading");
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = dest.with_extension("partial");
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, dest).await?;
        Ok(())
    }
}

/// Last path segment of a URL, ignoring query and fragment.
fn file_name(url: &str, fallback: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => fallback.to_string(),
    }
}

#[async_trait]
impl Source for Http {
    fn local(&self) -> &str {
        &self.local
    }

    fn remote(&self) -> &Remote {
        &self.remote
    }

    async fn versions(&self) -> Result<Vec<Version>> {
        Ok(self
            .urls()
            .iter()
            .map(|(label, url)| Version::new(label).with_detail(url))
            .collect())
    }

    async fn version(&self, target_dir: &Path, version: &str) -> Result<PathBuf> {
        let url = self.url_of(version)?;
        let name = file_name(url, version);
        let target = target_dir.join(&self.local);
        let dest = target.join(&name);
        if tokio::fs::try_exists(&dest).await? {
            debug!(source = %self.local, version, "Already present");
            return Ok(target);
        }

        let cached = self.cache_dir.join(&self.local).join(version).join(&name);
        {
            let cache_dir = self.cache_dir.clone();
            let local = self.local.clone();
            let _lock =
                tokio::task::spawn_blocking(move || CacheLock::acquire(&cache_dir, &local)).await??;
            if !tokio::fs::try_exists(&cached).await? {
                self.download(url, &cached).await?;
            }
        }

        tokio::fs::create_dir_all(&target).await?;
        tokio::fs::copy(&cached, &dest).await?;
        Ok(target)
    }
}
