//! HTTP archive repositories.
//!
//! The archive is downloaded and extracted once per URL. A tree that holds a
//! valid bundle is marked with a `.fingerprint` file and reused until the URL
//! changes; a tree that fails validation is deleted and fetched again on the
//! next call.

use super::{checkout_path, endpoint, Materialized, RepositoryCredentials, RepositoryResolver, ResolvedRepository};
use crate::bundle::{load_from_tree, sha224_hex};
use crate::cluster::ClusterClient;
use crate::crd::Repository;
use crate::error::SyncError;
use async_trait::async_trait;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};

const FINGERPRINT_FILE: &str = ".fingerprint";

/// Supported archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveKind {
    /// Archive kind from the URL path; any other extension is a configuration error
    pub fn from_url(url: &str) -> Result<Self, SyncError> {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
        if path.ends_with(".tar.gz") {
            Ok(ArchiveKind::TarGz)
        } else if path.ends_with(".tar") {
            Ok(ArchiveKind::Tar)
        } else if path.ends_with(".zip") {
            Ok(ArchiveKind::Zip)
        } else {
            Err(SyncError::configuration(format!(
                "unsupported archive '{url}': only .zip, .tar and .tar.gz are accepted"
            )))
        }
    }
}

/// Extract `bytes` into `target`. Entries escaping `target` are rejected by the
/// archive readers.
pub fn extract_archive(kind: ArchiveKind, bytes: &[u8], target: &Path) -> Result<(), SyncError> {
    std::fs::create_dir_all(target)?;
    match kind {
        ArchiveKind::Tar => tar::Archive::new(Cursor::new(bytes)).unpack(target)?,
        ArchiveKind::TarGz => {
            tar::Archive::new(flate2::read::GzDecoder::new(Cursor::new(bytes))).unpack(target)?;
        }
        ArchiveKind::Zip => zip::ZipArchive::new(Cursor::new(bytes))
            .and_then(|mut archive| archive.extract(target))
            .map_err(|e| SyncError::transient(format!("invalid zip archive: {e}")))?,
    }
    Ok(())
}

/// Downloads and extracts archives below a base path
pub struct HttpResolver {
    base_path: PathBuf,
    cluster: Arc<dyn ClusterClient>,
    http: reqwest::Client,
}

impl std::fmt::Debug for HttpResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResolver")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

impl HttpResolver {
    pub fn new(
        base_path: impl Into<PathBuf>,
        cluster: Arc<dyn ClusterClient>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            cluster,
            http,
        }
    }

    async fn download(
        &self,
        url: &str,
        credentials: &RepositoryCredentials,
    ) -> Result<Vec<u8>, SyncError> {
        let mut request = self.http.get(url);
        if let RepositoryCredentials::Basic { username, token } = credentials {
            request = request.basic_auth(username, Some(token.as_str()));
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SyncError::transient(format!(
                "archive download returned HTTP {}",
                response.status().as_u16()
            )));
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(SyncError::transient("downloaded archive is empty"));
        }
        Ok(bytes.to_vec())
    }
}

/// Fingerprint of a previously validated tree
async fn cached_fingerprint(tree: &Path) -> Option<String> {
    tokio::fs::read_to_string(tree.join(FINGERPRINT_FILE))
        .await
        .ok()
        .map(|fingerprint| fingerprint.trim().to_string())
        .filter(|fingerprint| !fingerprint.is_empty())
}

#[async_trait]
impl RepositoryResolver for HttpResolver {
    async fn resolve(&self, repository: &Repository) -> Result<ResolvedRepository, SyncError> {
        let url = endpoint(repository)?;
        if !url.starts_with("https://") {
            return Err(SyncError::configuration(format!(
                "unsupported archive URL '{url}': only https:// is accepted"
            )));
        }
        let kind = ArchiveKind::from_url(url)?;

        // One tree per URL, so a changed URL is fetched again
        let tree = checkout_path(&self.base_path, "http", repository).join(&sha224_hex(url.as_bytes())[..16]);
        if let Some(fingerprint) = cached_fingerprint(&tree).await {
            return Ok(ResolvedRepository {
                fingerprint,
                materialized: Materialized::Directory(tree),
            });
        }

        let credentials = RepositoryCredentials::load(self.cluster.as_ref(), repository).await?;
        let span = info_span!(
            "archive.download",
            repository.name = repository.repository_name(),
            archive.size_bytes = tracing::field::Empty,
            operation.duration_ms = tracing::field::Empty,
            operation.success = tracing::field::Empty,
        );
        let start = Instant::now();
        let downloaded = self.download(url, &credentials).instrument(span.clone()).await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        span.record("operation.duration_ms", duration_ms);
        span.record("operation.success", downloaded.is_ok());
        let bytes = downloaded?;
        span.record("archive.size_bytes", bytes.len() as u64);

        let fingerprint = sha224_hex(&bytes);
        if tree.exists() {
            tokio::fs::remove_dir_all(&tree).await?;
        }
        let target = tree.clone();
        let format = repository.spec.format;
        let validated = tokio::task::spawn_blocking(move || {
            extract_archive(kind, &bytes, &target)?;
            let payload = load_from_tree(&target, &[], format)?;
            if payload.is_empty() {
                return Err(SyncError::transient("archive contains no bundle files"));
            }
            Ok(())
        })
        .await
        .map_err(|e| SyncError::transient(format!("archive extraction task failed: {e}")))?;

        if let Err(e) = validated {
            warn!(repository = %repository.repository_name(), error = %e, "Extracted archive is not a valid bundle, removing");
            if let Err(remove_error) = tokio::fs::remove_dir_all(&tree).await {
                warn!(error = %remove_error, "Failed to remove invalid archive tree");
            }
            return Err(SyncError::transient(format!("invalid bundle archive: {e}")));
        }

        tokio::fs::write(tree.join(FINGERPRINT_FILE), &fingerprint).await?;
        info!(repository = %repository.repository_name(), fingerprint = %fingerprint, "Extracted archive repository");
        Ok(ResolvedRepository {
            fingerprint,
            materialized: Materialized::Directory(tree),
        })
    }
}
