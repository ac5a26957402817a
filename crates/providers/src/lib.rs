pub mod adapter;
pub mod mock;
pub mod prompts;
pub mod types;

pub use adapter::{BackendFactory, CompletionBackend, HttpBackend, normalize_reply};
pub use mock::{MockBackend, MockResponse};
pub use prompts::{build_request_payload, build_system_content};
pub use types::{ChatMessage, CompletionReply, OutboundPayload, PromptRequest, Role};

pub use parley_core::{Error, Result};
