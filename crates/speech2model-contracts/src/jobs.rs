use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_NEGATIVE_PROMPT: &str = "low quality, low resolution, low poly, ugly";
pub const DEFAULT_ART_STYLE: &str = "realistic";
pub const ARTIFACT_PREFIX: &str = "speech2model_";
pub const ARTIFACT_EXTENSION: &str = "glb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[serde(alias = "PENDING")]
    Queued,
    InProgress,
    Succeeded,
    Failed,
    #[serde(alias = "EXPIRED")]
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::InProgress => "IN_PROGRESS",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUrls {
    pub glb: Option<String>,
    pub fbx: Option<String>,
    pub obj: Option<String>,
    pub usdz: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    #[serde(default)]
    pub message: String,
}

/// Remote job as last observed through the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationJob {
    #[serde(default)]
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub model_urls: ModelUrls,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub task_error: Option<TaskError>,
    /// Submission time in unix milliseconds; names the downloaded artifact.
    #[serde(default)]
    pub created_at: Option<u64>,
}

impl GenerationJob {
    pub fn queued(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            progress: None,
            model_urls: ModelUrls::default(),
            thumbnail_url: None,
            task_error: None,
            created_at: None,
        }
    }

    pub fn is_retrievable(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    pub fn glb_url(&self) -> Option<&str> {
        self.model_urls
            .glb
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn failure_message(&self) -> Option<&str> {
        self.task_error
            .as_ref()
            .map(|err| err.message.trim())
            .filter(|value| !value.is_empty())
    }
}

/// Body of the preview-mode create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewTaskRequest {
    pub mode: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub art_style: String,
    pub should_remesh: bool,
}

impl PreviewTaskRequest {
    pub fn new(prompt: &str, negative_prompt: &str, art_style: &str, should_remesh: bool) -> Self {
        Self {
            mode: "preview".to_string(),
            prompt: prompt.to_string(),
            negative_prompt: negative_prompt.to_string(),
            art_style: art_style.to_string(),
            should_remesh,
        }
    }

    pub fn with_defaults(prompt: &str) -> Self {
        Self::new(prompt, DEFAULT_NEGATIVE_PROMPT, DEFAULT_ART_STYLE, true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAsset {
    pub file_name: String,
    pub source_url: String,
    pub bytes: Vec<u8>,
}

pub fn artifact_file_name(submitted_at_millis: u128) -> String {
    format!("{ARTIFACT_PREFIX}{submitted_at_millis}.{ARTIFACT_EXTENSION}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{artifact_file_name, GenerationJob, JobStatus, PreviewTaskRequest};

    #[test]
    fn status_payload_parses_with_aliases() -> anyhow::Result<()> {
        let job: GenerationJob = serde_json::from_value(json!({
            "id": "task-1",
            "status": "PENDING",
            "progress": 0,
        }))?;
        assert_eq!(job.status, JobStatus::Queued);
        assert!(!job.status.is_terminal());
        assert_eq!(job.glb_url(), None);

        let expired: GenerationJob = serde_json::from_value(json!({
            "id": "task-1",
            "status": "EXPIRED",
        }))?;
        assert_eq!(expired.status, JobStatus::Canceled);
        assert!(expired.status.is_terminal());
        assert!(!expired.is_retrievable());
        Ok(())
    }

    #[test]
    fn succeeded_payload_exposes_glb_url() -> anyhow::Result<()> {
        let job: GenerationJob = serde_json::from_value(json!({
            "id": "task-2",
            "status": "SUCCEEDED",
            "progress": 100,
            "model_urls": {"glb": " https://assets.example/model.glb ", "fbx": ""},
            "thumbnail_url": "https://assets.example/preview.png",
            "task_error": {"message": ""},
        }))?;
        assert!(job.is_retrievable());
        assert_eq!(job.progress, Some(100));
        assert_eq!(job.glb_url(), Some("https://assets.example/model.glb"));
        assert_eq!(job.failure_message(), None);
        Ok(())
    }

    #[test]
    fn failed_payload_keeps_task_error() -> anyhow::Result<()> {
        let job: GenerationJob = serde_json::from_value(json!({
            "id": "task-3",
            "status": "FAILED",
            "progress": 40,
            "task_error": {"message": "prompt rejected"},
        }))?;
        assert_eq!(job.status.to_string(), "FAILED");
        assert!(!job.is_retrievable());
        assert_eq!(job.failure_message(), Some("prompt rejected"));
        Ok(())
    }

    #[test]
    fn preview_request_serializes_service_fields() -> anyhow::Result<()> {
        let body = serde_json::to_value(PreviewTaskRequest::with_defaults("A red chair."))?;
        assert_eq!(
            body,
            json!({
                "mode": "preview",
                "prompt": "A red chair.",
                "negative_prompt": "low quality, low resolution, low poly, ugly",
                "art_style": "realistic",
                "should_remesh": true,
            })
        );
        Ok(())
    }

    #[test]
    fn artifact_name_uses_submission_time() {
        assert_eq!(
            artifact_file_name(1_760_000_000_123),
            "speech2model_1760000000123.glb"
        );
    }
}
