//! Git repositories as sources. Versions are commits.

use crate::error::{Result, SourceError};
use crate::lock::CacheLock;
use crate::variant::{Remote, Source, Version};
use async_trait::async_trait;
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Oid, Repository, Sort};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Length of the abbreviated commit hashes used as version labels.
pub const ABBREV_LEN: usize = 10;

/// A git repository mirrored into the shared source cache.
///
/// The mirror lives at `<cache_dir>/<local>` and is updated under a
/// [`CacheLock`]; checkouts into build directories clone from the mirror.
#[derive(Debug, Clone)]
pub struct Git {
    local: String,
    remote: Remote,
    cache_dir: PathBuf,
    refspec: String,
    limit: Option<usize>,
}

impl Git {
    /// Create a git source for `url`, cached below `cache_dir`.
    pub fn new(local: impl Into<String>, url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            local: local.into(),
            remote: Remote::Url(url.into()),
            cache_dir: cache_dir.into(),
            refspec: "HEAD".to_string(),
            limit: None,
        }
    }

    /// Start the commit walk at `refspec` instead of `HEAD`.
    pub fn refspec(mut self, refspec: impl Into<String>) -> Self {
        self.refspec = refspec.into();
        self
    }

    /// Only offer the newest `limit` commits.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn url(&self) -> &str {
        match &self.remote {
            Remote::Url(url) => url,
            _ => "",
        }
    }

    fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(&self.local)
    }

    /// Clone or fetch the mirror. The caller holds the cache lock.
    fn update_cache(&self) -> Result<Repository> {
        let path = self.cache_path();
        if path.exists() {
            let repo = Repository::open_bare(&path)?;
            {
                let mut remote = repo.find_remote("origin")?;
                remote.fetch(
                    &["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"],
                    None,
                    None,
                )?;
            }
            debug!(source = %self.local, "Fetched into cache");
            Ok(repo)
        } else {
            std::fs::create_dir_all(&self.cache_dir)?;
            info!(source = %self.local, url = %self.url(), "Cloning into cache");
            Ok(RepoBuilder::new().bare(true).clone(self.url(), &path)?)
        }
    }

    fn walk(&self, repo: &Repository) -> Result<Vec<Version>> {
        let start = repo.revparse_single(&self.refspec)?.peel_to_commit()?;

        let mut walk = repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        walk.push(start.id())?;

        let mut versions = Vec::new();
        for oid in walk {
            if self.limit.is_some_and(|limit| versions.len() >= limit) {
                break;
            }
            let oid = oid?;
            let commit = repo.find_commit(oid)?;
            versions.push(Version::new(abbreviate(oid)).with_detail(commit.summary().unwrap_or_default()));
        }
        Ok(versions)
    }

    fn checkout(&self, target: &Path, version: &str) -> Result<PathBuf> {
        if is_checked_out(target, version) {
            debug!(source = %self.local, version, "Already checked out");
            return Ok(target.to_path_buf());
        }

        let _lock = CacheLock::acquire(&self.cache_dir, &self.local)?;
        let cache = self.cache_path();
        if !cache.exists() {
            self.update_cache()?;
        }

        let repo = if target.exists() {
            Repository::open(target)?
        } else {
            RepoBuilder::new().clone(&cache.to_string_lossy(), target)?
        };

        let commit = repo
            .revparse_single(version)
            .and_then(|object| object.peel_to_commit())
            .map_err(|_| SourceError::UnknownVersion {
                source_name: self.local.clone(),
                version: version.to_string(),
            })?;
        repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
        repo.set_head_detached(commit.id())?;

        info!(source = %self.local, version, path = %target.display(), "Checked out");
        Ok(target.to_path_buf())
    }
}

fn abbreviate(oid: Oid) -> String {
    let mut hash = oid.to_string();
    hash.truncate(ABBREV_LEN);
    hash
}

fn is_checked_out(target: &Path, version: &str) -> bool {
    let Ok(repo) = Repository::open(target) else {
        return false;
    };
    let head = repo.head().and_then(|head| head.peel_to_commit());
    matches!(head, Ok(commit) if commit.id().to_string().starts_with(version))
}

#[async_trait]
impl Source for Git {
    fn local(&self) -> &str {
        &self.local
    }

    fn remote(&self) -> &Remote {
        &self.remote
    }

    async fn versions(&self) -> Result<Vec<Version>> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            let repo = {
                let _lock = CacheLock::acquire(&this.cache_dir, &this.local)?;
                this.update_cache()?
            };
            this.walk(&repo)
        })
        .await?
    }

    async fn version(&self, target_dir: &Path, version: &str) -> Result<PathBuf> {
        let this = self.clone();
        let target = target_dir.join(&self.local);
        let version = version.to_string();
        tokio::task::spawn_blocking(move || this.checkout(&target, &version)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;

    fn commit_file(repo: &Repository, name: &str, content: &str, message: &str) -> Oid {
        let workdir = repo.workdir().unwrap();
        std::fs::write(workdir.join(name), content).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();

        let sig = Signature::now("revbench", "revbench@example.com").unwrap();
        let parents = match repo.head() {
            Ok(head) => vec![head.peel_to_commit().unwrap()],
            Err(_) => Vec::new(),
        };
        let parents: Vec<&git2::Commit<'_>> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    fn fixture() -> (tempfile::TempDir, Oid, Oid) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path().join("upstream")).unwrap();
        let first = commit_file(&repo, "VERSION", "1\n", "Release 1");
        let second = commit_file(&repo, "VERSION", "2\n", "Release 2");
        (dir, first, second)
    }

    fn source(dir: &Path) -> Git {
        Git::new(
            "project.git",
            dir.join("upstream").to_string_lossy(),
            dir.join("cache"),
        )
    }

    #[tokio::test]
    async fn test_versions_newest_first() {
        let (dir, first, second) = fixture();
        let git = source(dir.path());

        let versions = git.versions().await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].label, abbreviate(second));
        assert_eq!(versions[1].label, abbreviate(first));
        assert_eq!(versions[0].detail.as_deref(), Some("Release 2"));
        assert!(dir.path().join("cache/project.git").exists());

        // A second call fetches into the existing mirror.
        assert_eq!(git.versions().await.unwrap(), versions);
    }

    #[tokio::test]
    async fn test_limit_keeps_newest() {
        let (dir, _, second) = fixture();
        let versions = source(dir.path()).limit(1).versions().await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].label, abbreviate(second));
    }

    #[tokio::test]
    async fn test_checkout_older_version() {
        let (dir, first, _) = fixture();
        let git = source(dir.path());
        let build = dir.path().join("build");
        let label = abbreviate(first);

        let path = git.version(&build, &label).await.unwrap();
        assert_eq!(path, build.join("project.git"));
        assert_eq!(std::fs::read_to_string(path.join("VERSION")).unwrap(), "1\n");

        // Idempotent.
        assert_eq!(git.version(&build, &label).await.unwrap(), path);
    }

    #[tokio::test]
    async fn test_checkout_unknown_version() {
        let (dir, _, _) = fixture();
        let err = source(dir.path())
            .version(&dir.path().join("build"), "0000000000")
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::UnknownVersion { .. }));
    }
}
