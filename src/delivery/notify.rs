//! Delivery notifications.

use crate::crd::NotificationConfig;
use crate::error::SyncError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

/// Webhook body sent after a delivery cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub repository: String,
    pub commit: String,
    /// Gateway the bundle was delivered to
    pub deployment: String,
    pub text: String,
    /// Targets that confirmed the delivery; failed targets are absent
    pub pods: BTreeMap<String, bool>,
}

/// Sends delivery notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        config: &NotificationConfig,
        notification: &Notification,
    ) -> Result<(), SyncError>;
}

/// [`Notifier`] posting JSON to a webhook URL
#[derive(Debug, Clone, Default)]
pub struct WebhookNotifier {
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(
        &self,
        config: &NotificationConfig,
        notification: &Notification,
    ) -> Result<(), SyncError> {
        let mut request = self.http.post(&config.url).json(notification);
        for (name, value) in &config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SyncError::transient(format!(
                "notification webhook returned HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}
