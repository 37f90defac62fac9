//! OAuth toolkit maintenance tasks, policy overrides and certificate exchange.

use super::pem::{pem_body, split_pem_certificates};
use crate::bundle::Bundle;
use crate::crd::{OtkDatabaseConfig, OtkType};
use crate::error::SyncError;
use serde_json::json;

/// Scheduled maintenance tasks: (task name, policy name, cron expression)
pub const MAINTENANCE_TASKS: &[(&str, &str, &str)] = &[
    (
        "otk-maintenance-client",
        "OTK Database Maintenance - Client",
        "0 0 * * * ?",
    ),
    (
        "otk-maintenance-id-token",
        "OTK Database Maintenance - Id token",
        "0 */30 * * * ?",
    ),
    (
        "otk-maintenance-miscellaneous",
        "OTK Database Maintenance - Miscellaneous",
        "0 */15 * * * ?",
    ),
    (
        "otk-maintenance-sessions",
        "OTK Database Maintenance - Sessions",
        "0 */5 * * * ?",
    ),
    (
        "otk-maintenance-tokens",
        "OTK Database Maintenance - Tokens",
        "0 */10 * * * ?",
    ),
];

/// Paired gateway reachable by this one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtkPeer {
    pub host: String,
    pub port: u16,
}

/// Certificate published by the paired gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificate {
    /// Role of the gateway that published it
    pub role: OtkType,
    pub gateway: String,
    pub pem: String,
}

/// Maintenance tasks; empty when the database is externally managed or tasks are off
pub fn build_otk_maintenance(database: &OtkDatabaseConfig) -> Result<Bundle, SyncError> {
    let mut bundle = Bundle::new();
    if database.externally_managed || !database.maintenance_tasks {
        return Ok(bundle);
    }
    for (name, policy, cron) in MAINTENANCE_TASKS {
        bundle.upsert(
            "scheduledTasks",
            json!({
                "name": name,
                "policyName": policy,
                "jobType": "RECURRING",
                "cronExpression": cron,
                "executeOnSingleNode": true,
                "executeOnCreate": false,
                "status": "SCHEDULED",
                "properties": { "connectionName": database.connection_name },
            }),
        )?;
    }
    Ok(bundle)
}

fn set_variable(name: &str, value: &str) -> String {
    format!(
        r#"<L7p:SetVariable><L7p:Base64Expression stringValue="{}"/><L7p:VariableToSet stringValue="{name}"/></L7p:SetVariable>"#,
        base64_encode(value)
    )
}

fn base64_encode(value: &str) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(value)
}

/// Role-dependent policy overrides.
///
/// A DMZ gateway points its token and client calls at the internal gateway; an
/// internal gateway records the DMZ host it trusts. A single gateway only records
/// its role.
pub fn build_otk_policies(role: OtkType, peer: Option<&OtkPeer>) -> Result<Bundle, SyncError> {
    let mut variables = vec![("otk.role".to_string(), role.as_str().to_string())];
    match (role, peer) {
        (OtkType::Single, _) => {}
        (OtkType::Dmz, Some(peer)) => {
            variables.push(("host_oauth2_auth_server".to_string(), peer.host.clone()));
            variables.push(("port_oauth2_auth_server".to_string(), peer.port.to_string()));
        }
        (OtkType::Internal, Some(peer)) => {
            variables.push(("host_dmz_gateway".to_string(), peer.host.clone()));
            variables.push(("port_dmz_gateway".to_string(), peer.port.to_string()));
        }
        (role, None) => {
            return Err(SyncError::configuration(format!(
                "OTK {} gateway has no paired gateway reference",
                role.as_str()
            )));
        }
    }

    let assertions: String = variables
        .iter()
        .map(|(name, value)| set_variable(name, value))
        .collect();
    let xml = format!(
        r#"<wsp:Policy xmlns:L7p="http://www.layer7tech.com/ws/policy" xmlns:wsp="http://schemas.xmlsoap.org/ws/2002/12/policy"><wsp:All wsp:Usage="Required">{assertions}</wsp:All></wsp:Policy>"#
    );

    let mut bundle = Bundle::new();
    bundle.upsert(
        "policies",
        json!({
            "name": "#OTK Deployment Configuration",
            "folderPath": "/OTK/Customizations",
            "policyType": "FRAGMENT",
            "soap": false,
            "policy": { "xml": xml },
        }),
    )?;
    Ok(bundle)
}

/// Trusted certificates from the paired gateway's published certificate
pub fn build_otk_certificates(certificates: &[PeerCertificate]) -> Result<Bundle, SyncError> {
    let mut bundle = Bundle::new();
    for published in certificates {
        let trusted_for = match published.role {
            // Internal trusts the DMZ as a client
            OtkType::Dmz => json!(["SIGNING_CLIENT_CERTS", "SSL"]),
            _ => json!(["SSL"]),
        };
        for (index, certificate) in split_pem_certificates(&published.pem).iter().enumerate() {
            bundle.upsert(
                "trustedCerts",
                json!({
                    "name": format!("otk-{}-{}-{index}", published.role.as_str(), published.gateway),
                    "certBase64": pem_body(certificate),
                    "trustAnchor": true,
                    "verifyHostname": false,
                    "trustedFor": trusted_for,
                    "revocationCheckPolicyType": "USE_DEFAULT",
                }),
            )?;
        }
    }
    Ok(bundle)
}
