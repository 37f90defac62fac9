//! # Gateway Management Client
//!
//! Posts bundles to a gateway's management endpoint. Graphman payloads go to
//! `/graphman` as one JSON document; restman payloads go to `/restman`, one
//! document per request.

use super::request::GatewayUpdateRequest;
use crate::bundle::Payload;
use crate::constants::{GRAPHMAN_PATH, PASSPHRASE_HEADER, RESTMAN_PATH};
use crate::error::SyncError;
use async_trait::async_trait;
use base64::Engine;
use std::time::Instant;
use tracing::{debug, info_span, Instrument};

/// Delivers one update request to one endpoint
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// `base_url` is `https://<host>:<port>`. Any non-2xx response is an error.
    async fn apply(&self, base_url: &str, request: &GatewayUpdateRequest) -> Result<(), SyncError>;
}

/// Request bodies accepted by the management API
#[derive(Debug)]
enum Body<'a> {
    Json(&'a serde_json::Value),
    Xml(&'a str),
}

/// [`GatewayClient`] over HTTPS
#[derive(Debug, Clone)]
pub struct HttpGatewayClient {
    http: reqwest::Client,
}

impl HttpGatewayClient {
    /// Gateways serve the management API with self-signed certificates, so
    /// certificate verification is disabled for this client.
    pub fn new() -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { http })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn post(
        &self,
        url: &str,
        request: &GatewayUpdateRequest,
        body: Body<'_>,
    ) -> Result<(), SyncError> {
        let mut builder = self
            .http
            .post(url)
            .basic_auth(
                &request.credentials.username,
                Some(request.credentials.password.as_str()),
            );
        if let Some(passphrase) = &request.passphrase {
            builder = builder.header(
                PASSPHRASE_HEADER,
                base64::engine::general_purpose::STANDARD.encode(passphrase.as_bytes()),
            );
        }
        builder = match body {
            Body::Json(document) => builder.json(document),
            Body::Xml(document) => builder
                .header(reqwest::header::CONTENT_TYPE, "application/xml")
                .body(document.to_string()),
        };

        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(SyncError::transient(format!(
            "gateway returned HTTP {} for {url}: {}",
            status.as_u16(),
            text.chars().take(512).collect::<String>()
        )))
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn apply(&self, base_url: &str, request: &GatewayUpdateRequest) -> Result<(), SyncError> {
        let base_url = base_url.trim_end_matches('/');
        let span = info_span!(
            "gateway.apply",
            gateway.url = base_url,
            bundle.kind = request.kind.as_str(),
            bundle.fingerprint = request.fingerprint.as_str(),
            operation.duration_ms = tracing::field::Empty,
            operation.success = tracing::field::Empty,
        );
        let start = Instant::now();

        let result = async {
            match &request.payload {
                Payload::Graphman(document) => {
                    let url = format!("{base_url}{GRAPHMAN_PATH}");
                    self.post(&url, request, Body::Json(document)).await
                }
                Payload::Restman(documents) => {
                    let url = format!("{base_url}{RESTMAN_PATH}");
                    for (name, document) in documents {
                        debug!(document = %name, "Posting restman document");
                        self.post(&url, request, Body::Xml(document)).await?;
                    }
                    Ok(())
                }
            }
        }
        .instrument(span.clone())
        .await;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        span.record("operation.duration_ms", duration_ms);
        span.record("operation.success", result.is_ok());
        result
    }
}
