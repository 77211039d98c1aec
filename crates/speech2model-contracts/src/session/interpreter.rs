use crate::voice::{classify_utterance, VoiceCommand};

use super::buffer::SessionBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterState {
    Collecting,
    Generating,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    Appended,
    Cleared,
    NothingToSend,
    Triggered(String),
    /// Input arrived while a triggered description was still being generated.
    Busy,
}

impl FeedOutcome {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Appended => "utterance",
            Self::Cleared => "buffer_cleared",
            Self::NothingToSend => "nothing_to_send",
            Self::Triggered(_) => "trigger",
            Self::Busy => "busy",
        }
    }
}

/// Turns utterances into buffer edits and trigger events.
#[derive(Debug, Clone)]
pub struct CommandInterpreter {
    buffer: SessionBuffer,
    state: InterpreterState,
}

impl Default for CommandInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandInterpreter {
    pub fn new() -> Self {
        Self {
            buffer: SessionBuffer::new(),
            state: InterpreterState::Collecting,
        }
    }

    pub fn state(&self) -> InterpreterState {
        self.state
    }

    pub fn buffer(&self) -> &SessionBuffer {
        &self.buffer
    }

    pub fn feed(&mut self, utterance: &str) -> FeedOutcome {
        if self.state == InterpreterState::Generating {
            return FeedOutcome::Busy;
        }
        match classify_utterance(utterance) {
            VoiceCommand::Reset => {
                self.buffer.clear();
                FeedOutcome::Cleared
            }
            VoiceCommand::Trigger => {
                if self.buffer.join().trim().is_empty() {
                    self.buffer.clear();
                    return FeedOutcome::NothingToSend;
                }
                let description = self.buffer.drain_joined();
                self.state = InterpreterState::Generating;
                FeedOutcome::Triggered(description)
            }
            VoiceCommand::Content(text) => {
                self.buffer.push(text);
                FeedOutcome::Appended
            }
        }
    }

    /// Returns to collecting once the triggered pipeline has finished,
    /// whether it produced an artifact or failed.
    pub fn finish_generation(&mut self) {
        self.state = InterpreterState::Collecting;
    }
}
