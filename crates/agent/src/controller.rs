//! Conversation controller: one submit, request, reconcile cycle at a time.
//!
//! The controller owns the transcript and the instruction profile. A
//! submission moves `Idle -> Submitting`, appends the user message and a
//! pending placeholder, calls the backend without holding the state lock, and
//! then either replaces the placeholder with the reply or rolls it back.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use parley_core::config::{
    DEFAULT_FALLBACK_REPLY, DEFAULT_MAX_PROMPT_CHARS, DEFAULT_SYSTEM_PROMPT, DEFAULT_TIMEOUT_SECS,
};
use parley_core::logging::{PrivacyConfig, redact_content};
use parley_core::{
    Clipboard, Error, InstructionProfile, Message, Profile, Result, SessionStorage, TranscriptChange, TranscriptStore,
    TransportError, markup,
};
use parley_providers::{CompletionBackend, PromptRequest, build_request_payload, build_system_content};
use tokio::sync::broadcast;

/// Submission phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Submitting,
}

/// Why a submit call did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Prompt was empty or whitespace only
    EmptyPrompt,
    /// Prompt exceeded the configured character limit
    TooLong { chars: usize, limit: usize },
    /// Another submission is outstanding
    Busy,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::EmptyPrompt => write!(f, "prompt is empty"),
            IgnoreReason::TooLong { chars, limit } => {
                write!(f, "prompt is {} characters long (limit {})", chars, limit)
            }
            IgnoreReason::Busy => write!(f, "a prompt is already being answered"),
        }
    }
}

/// Result of one submit call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Guard rejected the prompt; nothing was sent
    Ignored(IgnoreReason),
    /// Backend replied; the resolved assistant message
    Resolved(Message),
    /// Backend failed; the placeholder was rolled back
    Failed(TransportError),
}

impl SubmitOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, SubmitOutcome::Resolved(_))
    }
}

/// Injected conversation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// System directive used when every slot is blank
    pub default_system_prompt: String,
    /// Reply used when a 2xx body carries no message
    pub fallback_reply: String,
    pub max_prompt_chars: usize,
    pub timeout: Duration,
    /// How prompt and reply text appear in logs
    pub privacy: PrivacyConfig,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            privacy: PrivacyConfig::default(),
        }
    }
}

impl ControllerSettings {
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            default_system_prompt: profile.conversation.default_system_prompt.clone(),
            fallback_reply: profile.conversation.fallback_reply.clone(),
            max_prompt_chars: profile.conversation.max_prompt_chars,
            timeout: profile.backend.timeout(),
            privacy: PrivacyConfig::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_privacy(mut self, privacy: PrivacyConfig) -> Self {
        self.privacy = privacy;
        self
    }
}

#[derive(Debug)]
struct ControllerState {
    phase: Phase,
    transcript: TranscriptStore,
    profile: InstructionProfile,
    draft: String,
}

/// Shared conversation state machine
///
/// Use through `Arc<ConversationController>`; every method takes `&self`.
pub struct ConversationController {
    backend: Arc<dyn CompletionBackend>,
    settings: ControllerSettings,
    storage: SessionStorage,
    state: Mutex<ControllerState>,
}

impl ConversationController {
    /// Create a controller and rehydrate its state from storage
    ///
    /// `layout` is the configured slot layout; stored slot bodies are merged
    /// into it. Unreadable stored values are logged and replaced with empty
    /// state.
    pub fn open(
        backend: Arc<dyn CompletionBackend>, settings: ControllerSettings, storage: SessionStorage,
        layout: InstructionProfile,
    ) -> Self {
        let messages = storage.load_transcript().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Discarding unreadable transcript");
            Vec::new()
        });
        let profile = storage.restore_profile(layout.clone()).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Discarding unreadable instruction profile");
            layout
        });

        let transcript = TranscriptStore::from_messages(messages);
        tracing::info!(messages = transcript.len(), backend = %backend.describe(), "Conversation restored");

        Self {
            backend,
            settings,
            storage,
            state: Mutex::new(ControllerState { phase: Phase::Idle, transcript, profile, draft: String::new() }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist_transcript(&self, transcript: &TranscriptStore) {
        match self.storage.save_transcript(transcript.messages()) {
            Ok(()) => tracing::debug!(messages = transcript.history().len(), "Transcript persisted"),
            Err(e) => tracing::warn!(error = %e, "Failed to persist transcript"),
        }
    }

    fn persist_profile(&self, profile: &InstructionProfile) {
        if let Err(e) = self.storage.save_profile(profile) {
            tracing::warn!(error = %e, "Failed to persist instruction profile");
        }
    }

    /// Submit a prompt and wait for the reconciliation
    ///
    /// Returns `Err` only for invariant violations; backend failures are
    /// reported as `SubmitOutcome::Failed` after the rollback.
    pub async fn submit(&self, prompt: &str) -> Result<SubmitOutcome> {
        if prompt.trim().is_empty() {
            return Ok(SubmitOutcome::Ignored(IgnoreReason::EmptyPrompt));
        }

        let chars = prompt.chars().count();
        if chars > self.settings.max_prompt_chars {
            return Ok(SubmitOutcome::Ignored(IgnoreReason::TooLong { chars, limit: self.settings.max_prompt_chars }));
        }

        let request = {
            let mut state = self.lock();
            if state.phase == Phase::Submitting {
                tracing::debug!("Ignoring submit while a request is outstanding");
                return Ok(SubmitOutcome::Ignored(IgnoreReason::Busy));
            }

            let history = state.transcript.history();
            let payload = build_request_payload(&state.profile, &history, prompt, &self.settings.default_system_prompt);

            state.transcript.append([Message::user(prompt), Message::placeholder()])?;
            state.phase = Phase::Submitting;
            state.draft.clear();
            self.persist_transcript(&state.transcript);

            tracing::info!(
                prompt = %redact_content(prompt, &self.settings.privacy),
                messages = payload.len(),
                "Submitting prompt"
            );
            PromptRequest::new(payload)
        };

        let mut in_flight = InFlight { controller: self, armed: true };

        let result = match tokio::time::timeout(self.settings.timeout, self.backend.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.settings.timeout).into()),
        };

        in_flight.armed = false;
        self.reconcile(result)
    }

    fn reconcile(&self, result: Result<parley_providers::CompletionReply>) -> Result<SubmitOutcome> {
        let mut state = self.lock();
        state.phase = Phase::Idle;

        let outcome = match result {
            Ok(reply) => {
                let text = reply.message.unwrap_or_else(|| {
                    tracing::debug!("Reply carried no message; using fallback acknowledgement");
                    self.settings.fallback_reply.clone()
                });
                let message = Message::assistant(text);

                if let Err(e) = state.transcript.replace_last(message.clone()) {
                    state.transcript.remove_all_pending();
                    self.persist_transcript(&state.transcript);
                    return Err(e);
                }

                tracing::info!(reply = %redact_content(&message.content, &self.settings.privacy), "Prompt resolved");
                Ok(SubmitOutcome::Resolved(message))
            }
            Err(Error::Transport(e)) => {
                let removed = state.transcript.remove_all_pending();
                tracing::warn!(error = %e, removed, "Prompt failed; placeholder rolled back");
                Ok(SubmitOutcome::Failed(e))
            }
            Err(other) => {
                state.transcript.remove_all_pending();
                self.persist_transcript(&state.transcript);
                return Err(other);
            }
        };

        self.persist_transcript(&state.transcript);
        outcome
    }

    /// Replace the pending draft text
    pub fn set_draft(&self, text: impl Into<String>) {
        self.lock().draft = text.into();
    }

    pub fn draft(&self) -> String {
        self.lock().draft.clone()
    }

    /// Submit whatever is in the draft
    pub async fn submit_draft(&self) -> Result<SubmitOutcome> {
        let draft = self.draft();
        self.submit(&draft).await
    }

    /// Clear the whole transcript
    ///
    /// Refused (returns `false`) while a submission is outstanding.
    pub fn clear_transcript(&self) -> bool {
        let mut state = self.lock();
        if state.phase == Phase::Submitting {
            tracing::debug!("Refusing to clear transcript while submitting");
            return false;
        }

        state.transcript.clear();
        self.persist_transcript(&state.transcript);
        tracing::info!("Transcript cleared");
        true
    }

    /// Replace the body of an instruction slot
    pub fn set_slot(&self, key: &str, body: impl Into<String>) -> Result<()> {
        let mut state = self.lock();
        state.profile.set_body(key, body)?;
        self.persist_profile(&state.profile);
        tracing::info!(slot = key, "Instruction slot updated");
        Ok(())
    }

    /// Empty the body of an instruction slot
    pub fn clear_slot(&self, key: &str) -> Result<()> {
        let mut state = self.lock();
        state.profile.clear_slot(key)?;
        self.persist_profile(&state.profile);
        tracing::info!(slot = key, "Instruction slot cleared");
        Ok(())
    }

    pub fn instruction_profile(&self) -> InstructionProfile {
        self.lock().profile.clone()
    }

    /// System directive the next request would carry
    pub fn system_directive(&self) -> String {
        let content = build_system_content(&self.lock().profile);
        if content.is_empty() { self.settings.default_system_prompt.clone() } else { content }
    }

    /// Snapshot of the transcript, including any pending placeholder
    pub fn transcript(&self) -> Vec<Message> {
        self.lock().transcript.messages().to_vec()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn backend_description(&self) -> String {
        self.backend.describe()
    }

    /// Receive a change notification after every transcript mutation
    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptChange> {
        self.lock().transcript.subscribe()
    }

    fn resolved_message(&self, index: usize) -> Result<Message> {
        let state = self.lock();
        match state.transcript.get(index) {
            Some(message) if !message.pending => Ok(message.clone()),
            Some(_) => Err(Error::validation(format!("message {} is still pending", index))),
            None => Err(Error::validation(format!(
                "no message at index {} (transcript has {})",
                index,
                state.transcript.len()
            ))),
        }
    }

    /// Copy the full content of a message
    pub fn copy_message(&self, index: usize, clipboard: &dyn Clipboard) -> Result<()> {
        let message = self.resolved_message(index)?;
        clipboard.set_text(&message.content)
    }

    /// Copy one fenced code block of a message
    pub fn copy_code_block(&self, index: usize, block: usize, clipboard: &dyn Clipboard) -> Result<()> {
        let message = self.resolved_message(index)?;
        let blocks = markup::code_blocks(&message.content);
        let code = blocks.get(block).ok_or_else(|| {
            Error::validation(format!("message {} has no code block {} ({} found)", index, block, blocks.len()))
        })?;
        clipboard.set_text(&code.code)
    }
}

impl std::fmt::Debug for ConversationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationController")
            .field("backend", &self.backend.describe())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Rolls back an outstanding submission whose future was dropped
struct InFlight<'a> {
    controller: &'a ConversationController,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut state = self.controller.lock();
        state.phase = Phase::Idle;
        let removed = state.transcript.remove_all_pending();
        self.controller.persist_transcript(&state.transcript);
        tracing::warn!(removed, "Submission abandoned; placeholder rolled back");
    }
}
