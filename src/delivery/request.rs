//! Gateway update requests and management credentials.

use crate::bundle::{BuiltBundle, BundleKind, Payload};
use crate::crd::NotificationConfig;
use zeroize::Zeroizing;

/// Basic auth credentials for the gateway management API
#[derive(Clone)]
pub struct ManagementCredentials {
    pub username: String,
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for ManagementCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Notification to send after a delivery cycle
#[derive(Debug, Clone)]
pub struct NotificationTarget {
    pub config: NotificationConfig,
    /// Repository reference name
    pub repository: String,
    /// Commit or content hash of the delivered content
    pub commit: String,
}

/// One bundle on its way to a gateway fleet
#[derive(Clone)]
pub struct GatewayUpdateRequest {
    pub kind: BundleKind,
    pub payload: Payload,
    pub fingerprint: String,
    /// Remove the marker instead of setting it
    pub delete: bool,
    /// Label (ephemeral) or annotation (DB-backed) key recording the fingerprint
    pub marker_key: String,
    pub credentials: ManagementCredentials,
    /// Bundle encryption passphrase, sent base64 encoded
    pub passphrase: Option<Zeroizing<String>>,
    pub notification: Option<NotificationTarget>,
}

impl std::fmt::Debug for GatewayUpdateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayUpdateRequest")
            .field("kind", &self.kind)
            .field("fingerprint", &self.fingerprint)
            .field("delete", &self.delete)
            .field("marker_key", &self.marker_key)
            .field("credentials", &self.credentials)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl GatewayUpdateRequest {
    pub fn new(
        built: BuiltBundle,
        marker_key: String,
        credentials: ManagementCredentials,
    ) -> Self {
        Self {
            kind: built.kind,
            payload: built.payload,
            fingerprint: built.fingerprint,
            delete: false,
            marker_key,
            credentials,
            passphrase: None,
            notification: None,
        }
    }

    pub fn with_delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    pub fn with_passphrase(mut self, passphrase: Option<Zeroizing<String>>) -> Self {
        self.passphrase = passphrase;
        self
    }

    pub fn with_notification(mut self, notification: Option<NotificationTarget>) -> Self {
        self.notification = notification;
        self
    }
}
