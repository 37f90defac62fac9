//! # Checksum Gate
//!
//! Decides whether a target needs a bundle by comparing the fingerprint recorded
//! in its marker (a pod label or a Deployment annotation) with the new one.
//!
//! The gate is advisory. Two attempts may both pass it before either records
//! its marker; bundle application is apply-by-name, so a repeated delivery is
//! harmless.

use crate::constants::{LABEL_MAX_LENGTH, MARKER_DOMAIN};
use std::collections::BTreeMap;

/// `true` unless the marker already holds `fingerprint`. A missing marker always applies.
pub fn should_apply(markers: &BTreeMap<String, String>, key: &str, fingerprint: &str) -> bool {
    markers.get(key).is_none_or(|current| current != fingerprint)
}

/// `true` when a marker exists and a delete therefore has something to undo
pub fn should_delete(markers: &BTreeMap<String, String>, key: &str) -> bool {
    markers.contains_key(key)
}

/// Marker key `<domain>.gateway-config.io/<name>`, with `name` reduced to label syntax
pub fn marker_key(domain: &str, name: &str) -> String {
    format!("{domain}.{MARKER_DOMAIN}/{}", sanitize_label_name(name))
}

/// Reduce `name` to a valid label name: alphanumerics, `-`, `_` and `.`, starting
/// and ending with an alphanumeric, at most 63 characters
pub fn sanitize_label_name(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let truncated: String = mapped.chars().take(LABEL_MAX_LENGTH).collect();
    let trimmed = truncated.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    if trimmed.is_empty() {
        "default".to_string()
    } else {
        trimmed.to_string()
    }
}
