//! Outbound request assembly.
//!
//! Turns the instruction profile, the resolved history and a new prompt into
//! the message list sent to the completion backend.

use crate::types::{ChatMessage, OutboundPayload};
use parley_core::{InstructionProfile, Message};

/// Combine the non-blank slots into one system directive
///
/// Slots render as `"{title}:\n{body}"` (or the body alone when untitled),
/// joined by a blank line. Returns an empty string when every slot is blank.
pub fn build_system_content(profile: &InstructionProfile) -> String {
    profile
        .slots()
        .iter()
        .filter(|slot| !slot.is_blank())
        .map(|slot| {
            let title = slot.title.trim();
            let body = slot.body.trim();
            if title.is_empty() { body.to_string() } else { format!("{}:\n{}", title, body) }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
        .trim()
        .to_string()
}

/// Assemble the outbound message list
///
/// Pending entries in `history` are skipped.
pub fn build_request_payload(
    profile: &InstructionProfile, history: &[Message], new_prompt: &str, default_system: &str,
) -> OutboundPayload {
    let system = build_system_content(profile);
    let system = if system.is_empty() { default_system.to_string() } else { system };

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(history.iter().filter(|m| !m.pending).map(ChatMessage::from));
    messages.push(ChatMessage::user(new_prompt));

    OutboundPayload(messages)
}
