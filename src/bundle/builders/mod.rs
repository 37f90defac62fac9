//! # Bundle Builders
//!
//! Pure transforms from a configuration domain's desired state to a [`Bundle`].
//! Builders never perform I/O; Secrets are read by the caller and passed in.
//!
//! [`Bundle`]: super::Bundle

mod cluster;
mod external;
mod otk;
mod pem;

pub use cluster::{build_cluster_properties, build_listen_ports};
pub use external::{build_external_certs, build_external_keys, build_external_secrets, ExternalSource};
pub use otk::{
    build_otk_certificates, build_otk_maintenance, build_otk_policies, OtkPeer, PeerCertificate,
    MAINTENANCE_TASKS,
};
pub use pem::{pem_body, split_pem_certificates};
