//! Git repositories, driven through the `git` command line.

use super::{checkout_path, endpoint, sanitize_path_component, Materialized, RepositoryCredentials, RepositoryResolver, ResolvedRepository};
use crate::cluster::ClusterClient;
use crate::crd::Repository;
use crate::error::SyncError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, Instrument};

/// Clones and pulls git repositories below a base path
pub struct GitResolver {
    base_path: PathBuf,
    cluster: Arc<dyn ClusterClient>,
    /// `<checkout path>@<tag>` of tags fetched by this process
    fetched_tags: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for GitResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitResolver")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

/// Validate the remote URL scheme
pub(crate) fn validate_git_url(url: &str) -> Result<(), SyncError> {
    if url.starts_with("https://") || url.starts_with("ssh://") {
        Ok(())
    } else {
        Err(SyncError::configuration(format!(
            "unsupported git URL '{url}': only https:// and ssh:// are accepted"
        )))
    }
}

/// Remote URL with basic credentials embedded
fn authenticated_url(url: &str, credentials: &RepositoryCredentials) -> Result<String, SyncError> {
    let RepositoryCredentials::Basic { username, token } = credentials else {
        return Ok(url.to_string());
    };
    let mut parsed = reqwest::Url::parse(url)
        .map_err(|e| SyncError::configuration(format!("invalid git URL '{url}': {e}")))?;
    parsed
        .set_username(username)
        .and_then(|()| parsed.set_password(Some(token.as_str())))
        .map_err(|()| SyncError::configuration(format!("cannot set credentials on '{url}'")))?;
    Ok(parsed.to_string())
}

/// Run git and return trimmed stdout. A failing command is a transient error.
async fn git(args: &[&str], cwd: Option<&Path>, ssh_key: Option<&Path>) -> Result<String, SyncError> {
    let mut command = tokio::process::Command::new("git");
    if let Some(cwd) = cwd {
        command.arg("-C").arg(cwd);
    }
    command.args(args).env("GIT_TERMINAL_PROMPT", "0");
    if let Some(key) = ssh_key {
        command.env(
            "GIT_SSH_COMMAND",
            format!(
                "ssh -i {} -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null",
                key.display()
            ),
        );
    }

    let output = command.output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SyncError::transient(format!(
            "git {} failed: {}",
            args.first().copied().unwrap_or_default(),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

impl GitResolver {
    pub fn new(base_path: impl Into<PathBuf>, cluster: Arc<dyn ClusterClient>) -> Self {
        Self {
            base_path: base_path.into(),
            cluster,
            fetched_tags: Mutex::new(HashSet::new()),
        }
    }

    /// Write the SSH key next to the checkouts with owner-only permissions
    async fn write_ssh_key(
        &self,
        repository: &Repository,
        credentials: &RepositoryCredentials,
    ) -> Result<Option<PathBuf>, SyncError> {
        let RepositoryCredentials::Ssh { private_key } = credentials else {
            return Ok(None);
        };
        let dir = self.base_path.join("keys");
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!(
            "{}-{}",
            sanitize_path_component(repository.repository_namespace()),
            sanitize_path_component(repository.repository_name())
        ));
        let mut key = private_key.to_string();
        if !key.ends_with('\n') {
            key.push('\n');
        }
        tokio::fs::write(&path, key.as_bytes()).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        Ok(Some(path))
    }

    async fn clone(
        &self,
        url: &str,
        reference: Option<&str>,
        path: &Path,
        ssh_key: Option<&Path>,
    ) -> Result<(), SyncError> {
        if path.exists() {
            tokio::fs::remove_dir_all(path).await?;
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let target = path.to_string_lossy().to_string();
        let mut args = vec!["clone", "--depth", "1"];
        if let Some(reference) = reference {
            args.extend(["--branch", reference]);
        }
        args.extend([url, target.as_str()]);
        git(&args, None, ssh_key).await.map(|_| ())
    }
}

#[async_trait]
impl RepositoryResolver for GitResolver {
    async fn resolve(&self, repository: &Repository) -> Result<ResolvedRepository, SyncError> {
        let url = endpoint(repository)?;
        validate_git_url(url)?;

        let path = checkout_path(&self.base_path, "git", repository);
        let tag = repository.spec.tag.as_deref();
        let tag_key = tag.map(|tag| format!("{}@{tag}", path.display()));
        let cloned = path.join(".git").is_dir();

        // A fetched tag is immutable for the lifetime of the process
        if let Some(tag_key) = &tag_key {
            if cloned && self.fetched_tags.lock().await.contains(tag_key) {
                debug!(repository = %repository.repository_name(), "Tag already fetched, skipping network");
                let commit = git(&["rev-parse", "HEAD"], Some(&path), None).await?;
                return Ok(ResolvedRepository {
                    fingerprint: commit,
                    materialized: Materialized::Directory(path),
                });
            }
        }

        let credentials = RepositoryCredentials::load(self.cluster.as_ref(), repository).await?;
        let remote = authenticated_url(url, &credentials)?;
        let ssh_key = self.write_ssh_key(repository, &credentials).await?;
        let ssh_key = ssh_key.as_deref();

        let span = info_span!(
            "git.sync",
            repository.name = repository.repository_name(),
            git.reference = repository.reference().unwrap_or("HEAD"),
            operation.duration_ms = tracing::field::Empty,
            operation.success = tracing::field::Empty,
        );
        let start = Instant::now();
        let result = async {
            match (tag, repository.spec.branch.as_deref()) {
                (Some(tag), _) => self.clone(&remote, Some(tag), &path, ssh_key).await?,
                (None, branch) if cloned => {
                    let reference = branch.unwrap_or("HEAD");
                    git(&["fetch", "--depth", "1", "origin", reference], Some(&path), ssh_key)
                        .await?;
                    git(&["reset", "--hard", "FETCH_HEAD"], Some(&path), None).await?;
                }
                (None, branch) => self.clone(&remote, branch, &path, ssh_key).await?,
            }
            git(&["rev-parse", "HEAD"], Some(&path), None).await
        }
        .instrument(span.clone())
        .await;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        span.record("operation.duration_ms", duration_ms);
        span.record("operation.success", result.is_ok());
        let commit = result?;

        if let Some(tag_key) = tag_key {
            self.fetched_tags.lock().await.insert(tag_key);
        }
        info!(repository = %repository.repository_name(), commit = %commit, "Resolved git repository");
        Ok(ResolvedRepository {
            fingerprint: commit,
            materialized: Materialized::Directory(path),
        })
    }
}
