//! Instruction Profile: user-editable named slots combined into the system
//! directive sent with every request.

use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Key of the single slot used when no layout is configured
pub const DEFAULT_SLOT_KEY: &str = "instructions";

/// Declared slot in a profile layout (from configuration)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotSpec {
    /// Unique key used to address the slot
    pub key: String,
    /// Heading rendered before the body in the system directive
    #[serde(default)]
    pub title: String,
}

impl SlotSpec {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self { key: key.into(), title: title.into() }
    }
}

/// A slot with its current content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionSlot {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl InstructionSlot {
    pub fn new(key: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { key: key.into(), title: title.into(), body: body.into() }
    }

    /// A slot with a whitespace-only body contributes nothing
    pub fn is_blank(&self) -> bool {
        self.body.trim().is_empty()
    }
}

/// Ordered set of instruction slots with unique keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<InstructionSlot>", into = "Vec<InstructionSlot>")]
pub struct InstructionProfile {
    slots: Vec<InstructionSlot>,
}

impl InstructionProfile {
    /// Build an empty profile from a declared layout
    pub fn from_layout(layout: &[SlotSpec]) -> Result<Self> {
        let slots = layout
            .iter()
            .map(|spec| InstructionSlot::new(spec.key.clone(), spec.title.clone(), String::new()))
            .collect();
        Self::from_slots(slots)
    }

    /// Build a profile from slots, rejecting empty or duplicate keys
    pub fn from_slots(slots: Vec<InstructionSlot>) -> Result<Self> {
        let mut seen = HashSet::new();
        for slot in &slots {
            if slot.key.trim().is_empty() {
                return Err(Error::validation("instruction slot key must not be empty"));
            }
            if !seen.insert(slot.key.as_str()) {
                return Err(Error::validation(format!("duplicate instruction slot key: {}", slot.key)));
            }
        }
        Ok(Self { slots })
    }

    /// The layout used when none is configured: one untitled slot
    pub fn default_layout() -> Vec<SlotSpec> {
        vec![SlotSpec::new(DEFAULT_SLOT_KEY, "")]
    }

    /// All slots in declared order
    pub fn slots(&self) -> &[InstructionSlot] {
        &self.slots
    }

    /// Look up a slot by key
    pub fn slot(&self, key: &str) -> Option<&InstructionSlot> {
        self.slots.iter().find(|s| s.key == key)
    }

    fn slot_mut(&mut self, key: &str) -> Result<&mut InstructionSlot> {
        self.slots
            .iter_mut()
            .find(|s| s.key == key)
            .ok_or_else(|| Error::validation(format!("unknown instruction slot: {}", key)))
    }

    /// Replace the body of a slot
    pub fn set_body(&mut self, key: &str, body: impl Into<String>) -> Result<()> {
        self.slot_mut(key)?.body = body.into();
        Ok(())
    }

    /// Empty the body of a slot
    pub fn clear_slot(&mut self, key: &str) -> Result<()> {
        self.slot_mut(key)?.body.clear();
        Ok(())
    }

    /// True when every slot is blank
    pub fn is_blank(&self) -> bool {
        self.slots.iter().all(InstructionSlot::is_blank)
    }

    /// Adopt bodies from a stored profile for keys that exist in this layout
    ///
    /// Titles stay as configured; stored slots with unknown keys are dropped.
    pub fn merge_bodies(&mut self, stored: &InstructionProfile) {
        for slot in &mut self.slots {
            if let Some(saved) = stored.slot(&slot.key) {
                slot.body = saved.body.clone();
            }
        }
    }

    /// Put free-form legacy instructions into the first slot
    pub fn adopt_legacy_text(&mut self, text: &str) {
        if let Some(first) = self.slots.first_mut() {
            first.body = text.to_string();
        }
    }
}

impl Default for InstructionProfile {
    fn default() -> Self {
        Self { slots: vec![InstructionSlot::new(DEFAULT_SLOT_KEY, "", "")] }
    }
}

impl TryFrom<Vec<InstructionSlot>> for InstructionProfile {
    type Error = Error;

    fn try_from(slots: Vec<InstructionSlot>) -> Result<Self> {
        Self::from_slots(slots)
    }
}

impl From<InstructionProfile> for Vec<InstructionSlot> {
    fn from(profile: InstructionProfile) -> Self {
        profile.slots
    }
}
