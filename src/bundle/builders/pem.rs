//! PEM helpers shared by the key and certificate builders.

const BEGIN_CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----";
const END_CERTIFICATE: &str = "-----END CERTIFICATE-----";

/// Split a PEM chain into individual certificates, each with its armor lines
pub fn split_pem_certificates(pem: &str) -> Vec<String> {
    let mut certificates = Vec::new();
    let mut rest = pem;
    while let Some(start) = rest.find(BEGIN_CERTIFICATE) {
        let Some(end) = rest[start..].find(END_CERTIFICATE) else {
            break;
        };
        let end = start + end + END_CERTIFICATE.len();
        certificates.push(rest[start..end].to_string());
        rest = &rest[end..];
    }
    certificates
}

/// Base64 body of a single PEM block without armor or whitespace
pub fn pem_body(pem: &str) -> String {
    pem.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect()
}
