mod command_parser;
mod command_registry;

pub use command_parser::{classify_utterance, VoiceCommand};
pub use command_registry::VOICE_HELP_PHRASES;
