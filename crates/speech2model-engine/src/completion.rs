use std::io::{BufRead, BufReader, Lines};

use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;
use speech2model_contracts::prompts::{extract_modeling_prompt, PromptRequest};

use crate::error::CompletionError;
use crate::{api_base_from_env, status_failure};

pub const DEFAULT_OLLAMA_BASE: &str = "http://localhost:11434";

/// A text-completion backend that blocks until the whole answer is known.
pub trait CompletionService {
    fn complete(&self, request: &PromptRequest) -> Result<String, CompletionError>;
}

impl<T: CompletionService + ?Sized> CompletionService for Box<T> {
    fn complete(&self, request: &PromptRequest) -> Result<String, CompletionError> {
        (**self).complete(request)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CompletionFragment {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Lazily decodes line-delimited completion fragments.
///
/// Blank lines are skipped and iteration stops after the first fragment with
/// `done: true`, even if the reader has more lines.
pub struct FragmentStream<R> {
    lines: Lines<R>,
    finished: bool,
}

impl<R: BufRead> FragmentStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            finished: false,
        }
    }
}

impl<R: BufRead> Iterator for FragmentStream<R> {
    type Item = Result<CompletionFragment, CompletionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err.into()));
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let fragment = match serde_json::from_str::<CompletionFragment>(&line) {
                Ok(fragment) => fragment,
                Err(err) => {
                    self.finished = true;
                    return Some(Err(CompletionError::Decode(format!(
                        "bad fragment line: {err}"
                    ))));
                }
            };
            if let Some(message) = fragment.error.as_deref() {
                self.finished = true;
                return Some(Err(CompletionError::Service(message.to_string())));
            }
            self.finished = fragment.done;
            return Some(Ok(fragment));
        }
    }
}

pub fn collect_completion<R: BufRead>(reader: R) -> Result<String, CompletionError> {
    let mut text = String::new();
    let mut saw_done = false;
    for fragment in FragmentStream::new(reader) {
        let fragment = fragment?;
        text.push_str(&fragment.response);
        saw_done = fragment.done;
    }
    if !saw_done {
        tracing::debug!(chars = text.len(), "completion stream ended without done marker");
    }
    Ok(text)
}

/// Ollama `/api/generate` client.
pub struct OllamaClient {
    api_base: String,
    http: HttpClient,
}

impl OllamaClient {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            http: HttpClient::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(api_base_from_env("OLLAMA_HOST", DEFAULT_OLLAMA_BASE))
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/generate", self.api_base)
    }
}

impl CompletionService for OllamaClient {
    fn complete(&self, request: &PromptRequest) -> Result<String, CompletionError> {
        let endpoint = self.endpoint();
        tracing::debug!(%endpoint, model = %request.model, "requesting completion");
        let response = self
            .http
            .post(&endpoint)
            .json(&json!({
                "prompt": request.prompt,
                "model": request.model,
            }))
            .send()?;
        if !response.status().is_success() {
            return Err(status_failure(response).into());
        }
        let text = collect_completion(BufReader::new(response))?;
        tracing::info!(chars = text.len(), "completion received");
        Ok(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub request: PromptRequest,
    pub raw_completion: String,
    pub modeling_prompt: String,
}

/// Template substitution, completion, then extraction.
pub struct PromptSynthesizer<C> {
    service: C,
    model: String,
}

impl<C: CompletionService> PromptSynthesizer<C> {
    pub fn new(service: C, model: impl Into<String>) -> Self {
        Self {
            service,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn synthesize(&self, description: &str) -> Result<Synthesis, CompletionError> {
        let request = PromptRequest::new(description, &self.model);
        let raw_completion = self.service.complete(&request)?;
        let modeling_prompt = extract_modeling_prompt(&raw_completion);
        if modeling_prompt.trim().is_empty() {
            return Err(CompletionError::EmptyPrompt);
        }
        Ok(Synthesis {
            request,
            raw_completion,
            modeling_prompt,
        })
    }
}
