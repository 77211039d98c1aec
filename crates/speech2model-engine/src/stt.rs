//! Speech-to-text over an OpenAI-compatible transcription endpoint.

use std::io::Cursor;
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;

use crate::error::RecognitionFailure;
use crate::{api_base_from_env, non_empty_env, truncate_text};

pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_STT_MODEL: &str = "whisper-1";

/// Turns one recorded WAV segment into text.
pub trait Transcriber {
    fn transcribe(&self, wav: &[u8]) -> Result<String, RecognitionFailure>;
}

impl<T: Transcriber + ?Sized> Transcriber for Box<T> {
    fn transcribe(&self, wav: &[u8]) -> Result<String, RecognitionFailure> {
        (**self).transcribe(wav)
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

pub struct WhisperTranscriber {
    api_base: String,
    api_key: String,
    model: String,
    http: HttpClient,
}

impl WhisperTranscriber {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            http: HttpClient::new(),
        }
    }

    /// Reads `OPENAI_API_KEY` and `OPENAI_API_BASE`. `api_base` overrides the
    /// environment when given.
    pub fn from_env(model: &str, api_base: Option<&str>) -> anyhow::Result<Self> {
        let api_key = non_empty_env("OPENAI_API_KEY")
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY not set"))?;
        let base = match api_base.map(str::trim).filter(|value| !value.is_empty()) {
            Some(base) => base.to_string(),
            None => api_base_from_env("OPENAI_API_BASE", DEFAULT_OPENAI_BASE),
        };
        Ok(Self::new(base, api_key, model))
    }

    pub fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.api_base)
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, wav: &[u8]) -> Result<String, RecognitionFailure> {
        tracing::debug!(audio_bytes = wav.len(), "starting transcription");
        let part = Part::bytes(wav.to_vec())
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|err| RecognitionFailure::ServiceUnavailable(err.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(60))
            .multipart(form)
            .send()
            .map_err(|err| RecognitionFailure::ServiceUnavailable(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RecognitionFailure::ServiceUnavailable(format!(
                "transcription returned {}: {}",
                status.as_u16(),
                truncate_text(&body, 256)
            )));
        }
        let payload: TranscriptionResponse = response
            .json()
            .map_err(|err| RecognitionFailure::ServiceUnavailable(err.to_string()))?;
        transcript_or_unintelligible(payload.text)
    }
}

fn transcript_or_unintelligible(text: String) -> Result<String, RecognitionFailure> {
    let text = text.trim();
    if text.is_empty() {
        return Err(RecognitionFailure::Unintelligible);
    }
    Ok(text.to_string())
}

/// Encodes mono f32 samples as 16-bit PCM WAV.
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> anyhow::Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let pcm = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(pcm)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
