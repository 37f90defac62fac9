//! Repository credentials read from the Secret named in `spec.auth`.

use crate::cluster::ClusterClient;
use crate::crd::{Repository, RepositoryAuthType};
use crate::error::SyncError;
use zeroize::Zeroizing;

/// Credentials for fetching a repository
#[derive(Clone, Default)]
pub enum RepositoryCredentials {
    #[default]
    None,
    Basic {
        username: String,
        token: Zeroizing<String>,
    },
    Ssh {
        private_key: Zeroizing<String>,
    },
}

impl std::fmt::Debug for RepositoryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryCredentials::None => f.write_str("None"),
            RepositoryCredentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("token", &"[REDACTED]")
                .finish(),
            RepositoryCredentials::Ssh { .. } => f.write_str("Ssh([REDACTED])"),
        }
    }
}

impl RepositoryCredentials {
    /// Load credentials; a missing Secret or key is a configuration error
    pub async fn load(
        cluster: &dyn ClusterClient,
        repository: &Repository,
    ) -> Result<Self, SyncError> {
        let Some(auth) = &repository.spec.auth else {
            return Ok(Self::None);
        };
        if auth.r#type == RepositoryAuthType::None {
            return Ok(Self::None);
        }

        let namespace = repository.repository_namespace();
        let secret = cluster
            .get_secret(namespace, &auth.existing_secret_name)
            .await?
            .ok_or_else(|| {
                SyncError::configuration(format!(
                    "auth secret {namespace}/{} not found",
                    auth.existing_secret_name
                ))
            })?;
        let required = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| secret.string(key))
                .ok_or_else(|| {
                    SyncError::configuration(format!(
                        "auth secret {} has none of {}",
                        auth.existing_secret_name,
                        keys.join(", ")
                    ))
                })
        };

        match auth.r#type {
            RepositoryAuthType::Basic => Ok(Self::Basic {
                username: required(&["USERNAME", "username"])?,
                token: Zeroizing::new(required(&["TOKEN", "PASSWORD", "token", "password"])?),
            }),
            RepositoryAuthType::Ssh => Ok(Self::Ssh {
                private_key: Zeroizing::new(required(&["SSH_KEY", "ssh-privatekey"])?),
            }),
            RepositoryAuthType::None => Ok(Self::None),
        }
    }
}
