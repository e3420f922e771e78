use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::http_client::HttpClient;

/// Message delivered to a reporter.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// Someone claims the reporter's item.
    ClaimSubmitted {
        item_id: Uuid,
        item_name: String,
        claimant_email: String,
        evidence: String,
        identifier_matched: bool,
    },
    /// A new report of the opposite type carries the same identifier.
    PossibleMatch {
        item_id: Uuid,
        item_name: String,
        matched_item_id: Uuid,
    },
}

#[tonic::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &str, notice: &Notice) -> AppResult<()>;
}

/// Writes notices to the log only.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[tonic::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient: &str, notice: &Notice) -> AppResult<()> {
        tracing::info!("Notification for {}: {:?}", recipient, notice);
        Ok(())
    }
}

/// Posts notices to a mail relay webhook.
pub struct WebhookNotifier {
    url: String,
    http_client: Arc<HttpClient>,
}

impl WebhookNotifier {
    pub fn new(url: String, http_client: Arc<HttpClient>) -> Self {
        Self { url, http_client }
    }
}

#[tonic::async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, recipient: &str, notice: &Notice) -> AppResult<()> {
        let payload = serde_json::json!({
            "to": recipient,
            "notice": notice,
        });

        let response = self
            .http_client
            .post_json(&self.url, &payload)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to send notification: {}", e)))?;

        if response.status().is_success() {
            tracing::info!("Notification sent to {}", recipient);
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Notification failed: {} - {}", status, body);
            Err(AppError::Internal(format!("Notification failed: {}", status)))
        }
    }
}
