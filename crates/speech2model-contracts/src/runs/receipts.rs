use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::events::now_utc_iso;
use crate::jobs::{GenerationJob, PreviewTaskRequest};

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

/// Sidecar record written next to every saved artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReceipt {
    pub schema_version: u64,
    pub session_id: String,
    pub description: String,
    pub request: PreviewTaskRequest,
    pub job_id: String,
    pub status: String,
    pub source_url: String,
    pub artifact_path: String,
    pub byte_count: u64,
    pub sha256: String,
    pub ts: String,
}

impl ArtifactReceipt {
    pub fn new(
        session_id: &str,
        description: &str,
        request: &PreviewTaskRequest,
        job: &GenerationJob,
        source_url: &str,
        artifact_path: &Path,
        byte_count: u64,
        sha256: &str,
    ) -> Self {
        Self {
            schema_version: RECEIPT_SCHEMA_VERSION,
            session_id: session_id.to_string(),
            description: description.to_string(),
            request: request.clone(),
            job_id: job.id.clone(),
            status: job.status.to_string(),
            source_url: source_url.to_string(),
            artifact_path: artifact_path.to_string_lossy().to_string(),
            byte_count,
            sha256: sha256.to_string(),
            ts: now_utc_iso(),
        }
    }
}

pub fn receipt_path_for(artifact_path: &Path) -> PathBuf {
    let mut name = artifact_path
        .file_name()
        .map(|value| value.to_os_string())
        .unwrap_or_default();
    name.push(".json");
    artifact_path.with_file_name(name)
}

pub fn write_receipt(path: &Path, receipt: &ArtifactReceipt) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(receipt)?)?;
    Ok(())
}
