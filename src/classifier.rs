use std::sync::Arc;

use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::http_client::HttpClient;
use crate::models::NOT_SCANNED;

/// Produces a coarse category label for a report photo.
#[tonic::async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &[u8], content_type: &str) -> AppResult<String>;
}

/// Used when no classifier endpoint is configured.
#[derive(Debug, Default)]
pub struct NoopClassifier;

#[tonic::async_trait]
impl Classifier for NoopClassifier {
    async fn classify(&self, _image: &[u8], _content_type: &str) -> AppResult<String> {
        Ok(NOT_SCANNED.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    category: String,
}

/// Calls an image classification service over HTTP.
pub struct HttpClassifier {
    url: String,
    http_client: Arc<HttpClient>,
}

impl HttpClassifier {
    pub fn new(url: String, http_client: Arc<HttpClient>) -> Self {
        Self { url, http_client }
    }
}

#[tonic::async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, image: &[u8], content_type: &str) -> AppResult<String> {
        let response: ClassifyResponse = self
            .http_client
            .post_file_json(&self.url, "image", image.to_vec(), content_type)
            .await
            .map_err(|e| AppError::Internal(format!("Classifier request failed: {}", e)))?;

        let category = response.category.trim().to_lowercase();
        if category.is_empty() {
            return Ok(NOT_SCANNED.to_string());
        }
        Ok(category)
    }
}
