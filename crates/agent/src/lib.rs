pub mod controller;

pub use controller::{ControllerSettings, ConversationController, IgnoreReason, Phase, SubmitOutcome};
