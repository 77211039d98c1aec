#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub phrase: &'static str,
    pub action: &'static str,
}

/// Control phrases in match priority. The first phrase contained in an
/// utterance wins, so "start over" shadows "create model" when both occur.
pub(crate) const VOICE_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        phrase: "start over",
        action: "reset",
    },
    CommandSpec {
        phrase: "create model",
        action: "trigger",
    },
];

pub const VOICE_HELP_PHRASES: &[&str] = &["\"start over\"", "\"create model\""];
