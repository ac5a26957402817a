pub mod clipboard;
pub mod config;
pub mod error;
pub mod instructions;
pub mod logging;
pub mod markup;
pub mod storage;
pub mod transcript;

pub use clipboard::{Clipboard, MemoryClipboard};
pub use config::{BackendConfig, Config, ConfigError, ConversationConfig, Profile};
pub use error::{Error, Result, StorageError, TransportError};
pub use instructions::{DEFAULT_SLOT_KEY, InstructionProfile, InstructionSlot, SlotSpec};
pub use markup::{CodeBlock, Segment};
pub use storage::{FileStore, KeyValueStore, MemoryStore, SessionStorage};
pub use transcript::{Message, MessageRole, PLACEHOLDER_CONTENT, TranscriptChange, TranscriptStore};
