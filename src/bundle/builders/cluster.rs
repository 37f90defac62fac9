//! Cluster properties and listen ports.

use crate::bundle::Bundle;
use crate::crd::{ClusterProperty, ListenPort};
use crate::error::SyncError;
use serde_json::json;
use std::collections::BTreeSet;

fn ensure_unique<'a>(
    domain: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), SyncError> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(SyncError::configuration(format!(
                "duplicate {domain} name '{name}'"
            )));
        }
    }
    Ok(())
}

/// `clusterProperties` section, one entry per property
pub fn build_cluster_properties(properties: &[ClusterProperty]) -> Result<Bundle, SyncError> {
    ensure_unique("cluster property", properties.iter().map(|p| p.name.as_str()))?;

    let mut bundle = Bundle::new();
    for property in properties {
        bundle.upsert(
            "clusterProperties",
            json!({
                "name": property.name,
                "value": property.value,
                "hiddenProperty": false,
            }),
        )?;
    }
    Ok(bundle)
}

/// `listenPorts` section, one entry per port
pub fn build_listen_ports(ports: &[ListenPort]) -> Result<Bundle, SyncError> {
    ensure_unique("listen port", ports.iter().map(|p| p.name.as_str()))?;

    let mut bundle = Bundle::new();
    for port in ports {
        let mut features = port.enabled_features.clone();
        features.sort();
        features.dedup();

        let mut entry = json!({
            "name": port.name,
            "enabled": port.enabled,
            "protocol": port.protocol,
            "port": port.port,
            "enabledFeatures": features,
        });
        if let Some(tls) = port.tls.as_ref().filter(|tls| tls.enabled) {
            entry["tlsSettings"] = json!({
                "clientAuthentication": tls.client_authentication.as_deref().unwrap_or("OPTIONAL"),
                "enabledVersions": tls.versions,
                "enabledCipherSuites": tls.cipher_suites,
                "useCipherSuitesOrder": true,
            });
            if let Some(key) = &tls.private_key {
                entry["tlsSettings"]["keystoreId"] = json!("00000000000000000000000000000002");
                entry["tlsSettings"]["keyAlias"] = json!(key);
            }
        }
        bundle.upsert("listenPorts", entry)?;
    }
    Ok(bundle)
}
