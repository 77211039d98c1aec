use super::command_registry::{CommandSpec, VOICE_COMMANDS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceCommand {
    Reset,
    Trigger,
    Content(String),
}

impl VoiceCommand {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Trigger => "trigger",
            Self::Content(_) => "content",
        }
    }
}

fn find_command(lowered: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| lowered.contains(spec.phrase))
        .map(|spec| spec.action)
}

/// Classifies one recognized utterance. Phrase matching is a
/// case-insensitive substring test; content keeps the raw text untouched.
pub fn classify_utterance(text: &str) -> VoiceCommand {
    let lowered = text.to_lowercase();
    match find_command(&lowered, VOICE_COMMANDS) {
        Some("reset") => VoiceCommand::Reset,
        Some("trigger") => VoiceCommand::Trigger,
        _ => VoiceCommand::Content(text.to_string()),
    }
}
