pub mod completion;
pub mod controller;
pub mod error;
pub mod generation;
pub mod listen;
pub mod segment;
pub mod stt;

#[cfg(feature = "microphone")]
pub mod microphone;

use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::blocking::Response as HttpResponse;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::HttpFailure;

pub use completion::{CompletionService, OllamaClient, PromptSynthesizer, Synthesis};
pub use controller::{
    save_asset, ControllerSettings, Delivery, LoopExit, SavedArtifact, SessionController,
    TurnOutcome,
};
pub use error::{
    CompletionError, DownloadError, PipelineError, PollError, RecognitionFailure,
    SubmissionError,
};
pub use generation::{GenerationApi, GenerationClient, MeshyApi, Pacer, PollPolicy, ThreadPacer};
pub use listen::{ConsoleSource, UtteranceSource};
pub use segment::{ListenSettings, SpeechSegmenter};
pub use stt::{Transcriber, WhisperTranscriber};

#[cfg(feature = "microphone")]
pub use microphone::MicrophoneSource;

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Reads an endpoint base from the environment, falling back to `default`,
/// without a trailing slash.
pub(crate) fn api_base_from_env(key: &str, default: &str) -> String {
    non_empty_env(key)
        .map(|value| value.trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub(crate) fn response_json_or_failure(response: HttpResponse) -> Result<Value, HttpFailure> {
    let status = response.status();
    let body = response.text().map_err(HttpFailure::Transport)?;
    if !status.is_success() {
        return Err(HttpFailure::Status {
            code: status.as_u16(),
            body: truncate_text(&body, 512),
        });
    }
    serde_json::from_str(&body)
        .map_err(|err| HttpFailure::Decode(format!("invalid JSON payload: {err}")))
}

pub(crate) fn status_failure(response: HttpResponse) -> HttpFailure {
    let code = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    HttpFailure::Status {
        code,
        body: truncate_text(&body, 512),
    }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0)
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::{sha256_hex, truncate_text};

    #[test]
    fn truncate_text_marks_cut() {
        assert_eq!(truncate_text("abc", 5), "abc");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }

    #[test]
    fn sha256_hex_is_lowercase_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
