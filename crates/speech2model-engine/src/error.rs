//! Typed failures for each stage of the voice-to-model pipeline.

use std::path::PathBuf;
use std::time::Duration;

use speech2model_contracts::jobs::JobStatus;
use thiserror::Error;

/// Per-utterance failure from an utterance source. Never fatal.
#[derive(Debug, Error)]
pub enum RecognitionFailure {
    #[error("speech was not intelligible")]
    Unintelligible,

    #[error("speech recognition service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Completion-service failure. Aborts the triggered session only.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion service returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("completion stream read failed: {0}")]
    Stream(#[from] std::io::Error),

    #[error("completion stream was malformed: {0}")]
    Decode(String),

    #[error("completion service reported an error: {0}")]
    Service(String),

    #[error("completion produced an empty modeling prompt")]
    EmptyPrompt,
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("MESHY_API_KEY not set")]
    MissingApiKey,

    #[error("generation submit failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("generation submit returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("generation submit response was malformed: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("job status request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("job status request returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("job status response was malformed: {0}")]
    Decode(String),

    /// Only raised when a polling ceiling was configured.
    #[error("job {job_id} still not finished after {waited:?}")]
    TimedOut { job_id: String, waited: Duration },

    #[error("polling for job {job_id} was interrupted")]
    Interrupted { job_id: String },
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("job {job_id} has status {status}; nothing to download")]
    NotRetrievable { job_id: String, status: JobStatus },

    #[error("job {job_id} succeeded without a glb url")]
    MissingUrl { job_id: String },

    #[error("artifact download failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("artifact download returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("artifact body could not be read: {0}")]
    Body(String),
}

/// Everything that can end a triggered session early.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("generation job {job_id} ended with status {status}: {message}")]
    JobFailed {
        job_id: String,
        status: JobStatus,
        message: String,
    },

    #[error("failed to save artifact {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Completion(_) => "completion",
            Self::Submission(_) => "submit",
            Self::Poll(_) => "poll",
            Self::Download(_) => "download",
            Self::JobFailed { .. } => "job",
            Self::Persist { .. } => "persist",
        }
    }
}

/// Shared shape of a failed HTTP exchange, mapped into the stage error of
/// whichever call produced it.
#[derive(Debug)]
pub(crate) enum HttpFailure {
    Transport(reqwest::Error),
    Status { code: u16, body: String },
    Decode(String),
}

impl From<HttpFailure> for SubmissionError {
    fn from(value: HttpFailure) -> Self {
        match value {
            HttpFailure::Transport(err) => Self::Transport(err),
            HttpFailure::Status { code, body } => Self::Status { code, body },
            HttpFailure::Decode(message) => Self::Decode(message),
        }
    }
}

impl From<HttpFailure> for PollError {
    fn from(value: HttpFailure) -> Self {
        match value {
            HttpFailure::Transport(err) => Self::Transport(err),
            HttpFailure::Status { code, body } => Self::Status { code, body },
            HttpFailure::Decode(message) => Self::Decode(message),
        }
    }
}

impl From<HttpFailure> for DownloadError {
    fn from(value: HttpFailure) -> Self {
        match value {
            HttpFailure::Transport(err) => Self::Transport(err),
            HttpFailure::Status { code, body } => Self::Status { code, body },
            HttpFailure::Decode(message) => Self::Body(message),
        }
    }
}

impl From<HttpFailure> for CompletionError {
    fn from(value: HttpFailure) -> Self {
        match value {
            HttpFailure::Transport(err) => Self::Transport(err),
            HttpFailure::Status { code, body } => Self::Status { code, body },
            HttpFailure::Decode(message) => Self::Decode(message),
        }
    }
}
