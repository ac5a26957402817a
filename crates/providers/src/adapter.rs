use reqwest::Client as HttpClient;
use serde_json::Value;
use std::sync::Arc;

use crate::mock::MockBackend;
use crate::types::*;
use parley_core::{BackendConfig, Result, TransportError};

/// Completion backend used by the conversation controller
#[async_trait::async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send one request and wait for its reply
    ///
    /// Failures are reported as `Error::Transport`.
    async fn complete(&self, request: PromptRequest) -> Result<CompletionReply>;

    /// Short label for logs and status output
    fn describe(&self) -> String;
}

/// Remote completion endpoint reached with `POST {base_url}{path}`
pub struct HttpBackend {
    client: HttpClient,
    endpoint: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, path: &str) -> Self {
        Self { client: HttpClient::new(), endpoint: format!("{}{}", base_url.trim_end_matches('/'), path) }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl CompletionBackend for HttpBackend {
    async fn complete(&self, request: PromptRequest) -> Result<CompletionReply> {
        tracing::debug!(endpoint = %self.endpoint, messages = request.chat_history.len(), "Sending prompt request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| TransportError::Network(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Backend returned an error status");
            return Err(TransportError::status(status.as_u16(), status.canonical_reason().unwrap_or(""), body).into());
        }

        let value: Value = serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(normalize_reply(&value))
    }

    fn describe(&self) -> String {
        format!("http {}", self.endpoint)
    }
}

/// Map a decoded 2xx body onto the canonical reply
///
/// Accepts `{"message": "..."}` and the legacy `{"instructions": {"message": "..."}}`.
/// Anything else, including an empty string, yields no reply text.
pub fn normalize_reply(body: &Value) -> CompletionReply {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .or_else(|| {
            body.get("instructions")
                .and_then(|legacy| legacy.get("message"))
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
        })
        .map(str::to_string);

    CompletionReply { message }
}

pub struct BackendFactory;

impl BackendFactory {
    pub fn create_from_config(config: &BackendConfig) -> Result<Arc<dyn CompletionBackend>> {
        match config {
            BackendConfig::Http { base_url, path, .. } => Ok(Arc::new(HttpBackend::new(base_url, path))),
            BackendConfig::Mock { responses_file: Some(path), .. } => Ok(Arc::new(MockBackend::from_file(path)?)),
            BackendConfig::Mock { responses_file: None, .. } => Ok(Arc::new(MockBackend::echo())),
        }
    }
}
