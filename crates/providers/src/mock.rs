use crate::CompletionBackend;
use crate::types::*;
use parley_core::{Error, Result, TransportError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted outcome for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MockResponse {
    /// 2xx with reply text, optionally after a delay
    Reply {
        message: String,
        #[serde(default)]
        delay_ms: u64,
    },
    /// 2xx without a reply field
    Empty,
    /// Non-2xx answer
    Status {
        status: u16,
        #[serde(default)]
        status_text: String,
        #[serde(default)]
        body: String,
    },
    /// Failure before any response arrived
    Network { message: String },
}

impl MockResponse {
    pub fn reply(message: impl Into<String>) -> Self {
        MockResponse::Reply { message: message.into(), delay_ms: 0 }
    }

    pub fn delayed(message: impl Into<String>, delay: Duration) -> Self {
        MockResponse::Reply { message: message.into(), delay_ms: delay.as_millis() as u64 }
    }

    pub fn status(status: u16, status_text: impl Into<String>, body: impl Into<String>) -> Self {
        MockResponse::Status { status, status_text: status_text.into(), body: body.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        MockResponse::Network { message: message.into() }
    }
}

/// Mock configuration from TOML file
#[derive(Debug, Deserialize)]
struct MockConfig {
    responses: Vec<MockResponse>,
}

/// Scripted backend for offline sessions and tests
///
/// Every request is recorded. Once the script is exhausted the backend
/// echoes the prompt (echo mode) or answers with a fixed notice.
pub struct MockBackend {
    responses: Vec<MockResponse>,
    current: AtomicUsize,
    echo: bool,
    requests: Mutex<Vec<PromptRequest>>,
}

impl MockBackend {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self { responses, current: AtomicUsize::new(0), echo: false, requests: Mutex::new(Vec::new()) }
    }

    /// Backend that repeats each prompt back
    pub fn echo() -> Self {
        Self { echo: true, ..Self::new(Vec::new()) }
    }

    /// Load a `[[responses]]` script
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read mock responses file {}: {}", path.display(), e)))?;
        let config: MockConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse mock responses: {}", e)))?;

        tracing::debug!(count = config.responses.len(), "Loaded mock responses");
        Ok(Self::new(config.responses))
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<PromptRequest> {
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    fn next_response(&self, request: &PromptRequest) -> MockResponse {
        let index = self.current.fetch_add(1, Ordering::SeqCst);
        if let Some(response) = self.responses.get(index) {
            return response.clone();
        }

        if self.echo {
            return MockResponse::reply(format!("echo: {}", request.latest_prompt().unwrap_or_default()));
        }

        MockResponse::reply(format!(
            "No more mock responses configured (requested: {}, available: {})",
            index + 1,
            self.responses.len()
        ))
    }
}

#[async_trait::async_trait]
impl CompletionBackend for MockBackend {
    async fn complete(&self, request: PromptRequest) -> Result<CompletionReply> {
        let response = self.next_response(&request);
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(request);

        match response {
            MockResponse::Reply { message, delay_ms } => {
                if delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                if message.is_empty() { Ok(CompletionReply::empty()) } else { Ok(CompletionReply::text(message)) }
            }
            MockResponse::Empty => Ok(CompletionReply::empty()),
            MockResponse::Status { status, status_text, body } => {
                Err(TransportError::status(status, status_text, body).into())
            }
            MockResponse::Network { message } => Err(TransportError::Network(message).into()),
        }
    }

    fn describe(&self) -> String {
        if self.echo { "mock (echo)".to_string() } else { format!("mock ({} scripted)", self.responses.len()) }
    }
}
