//! External secrets, keys and certificates.
//!
//! Opaque Secrets become stored passwords (one per data key), TLS Secrets become
//! private keys, and PEM certificates become trusted certificates. Disabled
//! references are left out; the caller turns previously applied entries into
//! deletes.

use super::pem::{pem_body, split_pem_certificates};
use crate::bundle::Bundle;
use crate::cluster::SecretData;
use crate::crd::ExternalReference;
use crate::error::SyncError;
use serde_json::json;

/// Default keystore of a gateway node
const DEFAULT_KEYSTORE_ID: &str = "00000000000000000000000000000002";

/// An external reference together with the Secret it points at
#[derive(Debug, Clone)]
pub struct ExternalSource {
    pub reference: ExternalReference,
    pub secret: SecretData,
}

fn required(source: &ExternalSource, key: &str) -> Result<String, SyncError> {
    source.secret.string(key).ok_or_else(|| {
        SyncError::configuration(format!(
            "secret '{}' has no '{key}' entry",
            source.reference.name
        ))
    })
}

fn add_key(bundle: &mut Bundle, source: &ExternalSource) -> Result<(), SyncError> {
    let certificate = required(source, "tls.crt")?;
    let private_key = required(source, "tls.key")?;
    let chain = split_pem_certificates(&certificate);
    if chain.is_empty() {
        return Err(SyncError::configuration(format!(
            "secret '{}' has no PEM certificate in tls.crt",
            source.reference.name
        )));
    }

    let reference = &source.reference;
    let mut entry = json!({
        "keystoreId": DEFAULT_KEYSTORE_ID,
        "alias": reference.alias.as_deref().unwrap_or(&reference.name),
        "keyType": "RSA",
        "pem": private_key,
        "certChain": chain,
    });
    if let Some(usage) = &reference.key_usage_type {
        entry["usageTypes"] = json!([usage]);
    }
    bundle.upsert("keys", entry)
}

/// Stored passwords from Opaque Secrets, private keys from TLS Secrets
pub fn build_external_secrets(sources: &[ExternalSource]) -> Result<Bundle, SyncError> {
    let mut bundle = Bundle::new();
    for source in sources.iter().filter(|s| s.reference.enabled) {
        if source.secret.is_tls() {
            add_key(&mut bundle, source)?;
            continue;
        }
        for key in source.secret.data.keys() {
            let value = required(source, key)?;
            bundle.upsert(
                "secrets",
                json!({
                    "name": format!("{}-{key}", source.reference.name),
                    "description": source.reference.description.as_deref().unwrap_or(""),
                    "secretType": "PASSWORD",
                    "variableReferencable": source.reference.variable_referencable,
                    "secret": value,
                }),
            )?;
        }
    }
    Ok(bundle)
}

/// Private keys; every referenced Secret must carry `tls.crt` and `tls.key`
pub fn build_external_keys(sources: &[ExternalSource]) -> Result<Bundle, SyncError> {
    let mut bundle = Bundle::new();
    for source in sources.iter().filter(|s| s.reference.enabled) {
        add_key(&mut bundle, source)?;
    }
    Ok(bundle)
}

/// Trusted certificates, one per PEM certificate found in the Secret
pub fn build_external_certs(sources: &[ExternalSource]) -> Result<Bundle, SyncError> {
    let mut bundle = Bundle::new();
    for source in sources.iter().filter(|s| s.reference.enabled) {
        let reference = &source.reference;
        let mut trusted_for = reference.trusted_for.clone();
        trusted_for.sort();
        trusted_for.dedup();

        for (key, value) in &source.secret.data {
            // Private keys sometimes live next to the certificate
            let Ok(text) = std::str::from_utf8(value) else {
                continue;
            };
            let certificates = split_pem_certificates(text);
            let multiple = certificates.len() > 1;
            for (index, certificate) in certificates.iter().enumerate() {
                let name = if multiple {
                    format!("{}-{}-{index}", reference.name, key.replace('.', "-"))
                } else {
                    format!("{}-{}", reference.name, key.replace('.', "-"))
                };
                bundle.upsert(
                    "trustedCerts",
                    json!({
                        "name": name,
                        "certBase64": pem_body(certificate),
                        "trustAnchor": reference.trust_anchor,
                        "verifyHostname": reference.verify_hostname,
                        "trustedFor": trusted_for,
                        "revocationCheckPolicyType": "USE_DEFAULT",
                    }),
                )?;
            }
        }
    }
    Ok(bundle)
}
