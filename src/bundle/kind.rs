//! Bundle kinds and the desired state each one is built from.

use super::builders::{
    build_cluster_properties, build_external_certs, build_external_keys, build_external_secrets,
    build_listen_ports, build_otk_certificates, build_otk_maintenance, build_otk_policies,
    ExternalSource, OtkPeer, PeerCertificate,
};
use super::{Bundle, RepositoryPayload};
use crate::crd::{ClusterProperty, EntityRef, ListenPort, OtkDatabaseConfig, OtkType};
use crate::error::SyncError;
use std::collections::BTreeMap;

/// Kind of configuration carried by a gateway update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleKind {
    Repository,
    ExternalSecret,
    ExternalKey,
    ExternalCert,
    ClusterProperties,
    ListenPorts,
    OtkDatabaseMaintenance,
    OtkPolicies,
    OtkCertificates,
}

impl BundleKind {
    /// Slug used in marker keys and status
    pub fn as_str(self) -> &'static str {
        match self {
            BundleKind::Repository => "repository",
            BundleKind::ExternalSecret => "external-secrets",
            BundleKind::ExternalKey => "external-keys",
            BundleKind::ExternalCert => "external-certs",
            BundleKind::ClusterProperties => "cluster-properties",
            BundleKind::ListenPorts => "listen-ports",
            BundleKind::OtkDatabaseMaintenance => "otk-maintenance",
            BundleKind::OtkPolicies => "otk-policies",
            BundleKind::OtkCertificates => "otk-certificates",
        }
    }
}

impl std::fmt::Display for BundleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire payload of a gateway update
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// One graphman document posted to `/graphman`
    Graphman(serde_json::Value),
    /// Restman documents posted one by one to `/restman`
    Restman(BTreeMap<String, String>),
}

/// Result of building a desired state
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltBundle {
    pub kind: BundleKind,
    pub payload: Payload,
    /// Fingerprint of the desired entities
    pub fingerprint: String,
    /// Desired entity identities, recorded as last applied after delivery
    pub entities: Vec<EntityRef>,
    /// Nothing to deliver
    pub empty: bool,
}

/// Current desired state of one configuration domain
#[derive(Debug, Clone)]
pub enum DesiredState {
    Repository(RepositoryPayload),
    ExternalSecrets(Vec<ExternalSource>),
    ExternalKeys(Vec<ExternalSource>),
    ExternalCerts(Vec<ExternalSource>),
    ClusterProperties(Vec<ClusterProperty>),
    ListenPorts(Vec<ListenPort>),
    OtkDatabaseMaintenance(OtkDatabaseConfig),
    OtkPolicies { role: OtkType, peer: Option<OtkPeer> },
    OtkCertificates(Vec<PeerCertificate>),
}

impl DesiredState {
    pub fn kind(&self) -> BundleKind {
        match self {
            DesiredState::Repository(_) => BundleKind::Repository,
            DesiredState::ExternalSecrets(_) => BundleKind::ExternalSecret,
            DesiredState::ExternalKeys(_) => BundleKind::ExternalKey,
            DesiredState::ExternalCerts(_) => BundleKind::ExternalCert,
            DesiredState::ClusterProperties(_) => BundleKind::ClusterProperties,
            DesiredState::ListenPorts(_) => BundleKind::ListenPorts,
            DesiredState::OtkDatabaseMaintenance(_) => BundleKind::OtkDatabaseMaintenance,
            DesiredState::OtkPolicies { .. } => BundleKind::OtkPolicies,
            DesiredState::OtkCertificates(_) => BundleKind::OtkCertificates,
        }
    }

    /// Build the bundle. Entities in `previous` that are no longer desired become deletes.
    pub fn build(&self, previous: &[EntityRef]) -> Result<BuiltBundle, SyncError> {
        let bundle = match self {
            DesiredState::Repository(RepositoryPayload::Restman(documents)) => {
                let payload = RepositoryPayload::Restman(documents.clone());
                return Ok(BuiltBundle {
                    kind: self.kind(),
                    fingerprint: payload.fingerprint(),
                    payload: Payload::Restman(documents.clone()),
                    entities: Vec::new(),
                    empty: documents.is_empty(),
                });
            }
            DesiredState::Repository(RepositoryPayload::Graphman(bundle)) => bundle.clone(),
            DesiredState::ExternalSecrets(sources) => build_external_secrets(sources)?,
            DesiredState::ExternalKeys(sources) => build_external_keys(sources)?,
            DesiredState::ExternalCerts(sources) => build_external_certs(sources)?,
            DesiredState::ClusterProperties(properties) => build_cluster_properties(properties)?,
            DesiredState::ListenPorts(ports) => build_listen_ports(ports)?,
            DesiredState::OtkDatabaseMaintenance(database) => build_otk_maintenance(database)?,
            DesiredState::OtkPolicies { role, peer } => build_otk_policies(*role, peer.as_ref())?,
            DesiredState::OtkCertificates(certificates) => build_otk_certificates(certificates)?,
        };
        Ok(finish(self.kind(), bundle, previous))
    }
}

fn finish(kind: BundleKind, mut bundle: Bundle, previous: &[EntityRef]) -> BuiltBundle {
    bundle.tombstone_missing(previous);
    BuiltBundle {
        kind,
        fingerprint: bundle.fingerprint(),
        entities: bundle.entity_refs(),
        empty: bundle.is_empty(),
        payload: Payload::Graphman(bundle.to_json()),
    }
}

/// Delete bundle for entities that were applied under a marker now being removed
pub fn build_delete(kind: BundleKind, previous: &[EntityRef]) -> BuiltBundle {
    let mut bundle = Bundle::new();
    for entity in previous {
        bundle.tombstone(&entity.kind, entity.name.clone());
    }
    BuiltBundle {
        kind,
        fingerprint: bundle.fingerprint(),
        entities: Vec::new(),
        empty: bundle.is_empty(),
        payload: Payload::Graphman(bundle.to_json()),
    }
}
