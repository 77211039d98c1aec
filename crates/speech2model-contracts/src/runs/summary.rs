use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::events::now_utc_iso;

/// Counters for one run of the listening loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub utterances: u64,
    pub recognition_failures: u64,
    pub triggers: u64,
    pub artifacts: u64,
    pub pipeline_failures: u64,
    pub artifact_paths: Vec<String>,
}

impl SessionSummary {
    pub fn start(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            started_at: now_utc_iso(),
            ..Self::default()
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = now_utc_iso();
    }
}

pub fn write_summary(path: &Path, summary: &SessionSummary) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(summary)?)?;
    Ok(())
}
