use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client as HttpClient;
use serde_json::Value;
use speech2model_contracts::jobs::{
    artifact_file_name, GeneratedAsset, GenerationJob, PreviewTaskRequest,
};

use crate::error::{DownloadError, HttpFailure, PollError, SubmissionError};
use crate::{
    api_base_from_env, non_empty_env, response_json_or_failure, status_failure, timestamp_millis,
};

pub const DEFAULT_MESHY_BASE: &str = "https://api.meshy.ai/openapi/v2/text-to-3d";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Shorter intervals are raised to this so the ceiling always advances.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Raw calls against an asynchronous text-to-3D job service.
pub trait GenerationApi {
    /// Creates a preview task and returns its id.
    fn create_task(&self, request: &PreviewTaskRequest) -> Result<String, SubmissionError>;
    fn fetch_task(&self, job_id: &str) -> Result<GenerationJob, PollError>;
    fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, DownloadError>;
}

impl<T: GenerationApi + ?Sized> GenerationApi for Box<T> {
    fn create_task(&self, request: &PreviewTaskRequest) -> Result<String, SubmissionError> {
        (**self).create_task(request)
    }

    fn fetch_task(&self, job_id: &str) -> Result<GenerationJob, PollError> {
        (**self).fetch_task(job_id)
    }

    fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        (**self).fetch_asset(url)
    }
}

/// Meshy text-to-3D v2.
pub struct MeshyApi {
    api_base: String,
    api_key: String,
    http: HttpClient,
    request_timeout: Duration,
}

impl MeshyApi {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http: HttpClient::new(),
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn from_env() -> Result<Self, SubmissionError> {
        let Some(api_key) = non_empty_env("MESHY_API_KEY") else {
            return Err(SubmissionError::MissingApiKey);
        };
        Ok(Self::new(
            api_base_from_env("MESHY_API_BASE", DEFAULT_MESHY_BASE),
            api_key,
        ))
    }

    fn task_endpoint(&self, job_id: &str) -> String {
        format!("{}/{}", self.api_base, job_id)
    }
}

impl GenerationApi for MeshyApi {
    fn create_task(&self, request: &PreviewTaskRequest) -> Result<String, SubmissionError> {
        let response = self
            .http
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .map_err(SubmissionError::Transport)?;
        let payload = response_json_or_failure(response)?;
        parse_task_id(&payload).ok_or_else(|| {
            SubmissionError::Decode(format!("response missing task id: {payload}"))
        })
    }

    fn fetch_task(&self, job_id: &str) -> Result<GenerationJob, PollError> {
        let response = self
            .http
            .get(self.task_endpoint(job_id))
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .send()
            .map_err(PollError::Transport)?;
        let payload = response_json_or_failure(response)?;
        parse_job(job_id, payload).map_err(PollError::from)
    }

    fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self.http.get(url).send().map_err(DownloadError::Transport)?;
        if !response.status().is_success() {
            return Err(status_failure(response).into());
        }
        let bytes = response.bytes().map_err(DownloadError::Transport)?;
        Ok(bytes.to_vec())
    }
}

fn parse_task_id(payload: &Value) -> Option<String> {
    payload
        .get("result")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn parse_job(job_id: &str, payload: Value) -> Result<GenerationJob, HttpFailure> {
    let mut job: GenerationJob = serde_json::from_value(payload)
        .map_err(|err| HttpFailure::Decode(format!("unexpected task payload: {err}")))?;
    if job.id.trim().is_empty() {
        job.id = job_id.to_string();
    }
    Ok(job)
}

/// Blocks the polling loop between status requests.
pub trait Pacer {
    fn wait(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn wait(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Fixed-interval polling. `max_wait` is `None` by default, which keeps
/// polling until the service reports a terminal status.
///
/// The ceiling counts wall-clock time including status requests, and never
/// less than the total time spent waiting between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
        }
    }
}

/// Submit, poll and retrieve against a [`GenerationApi`].
pub struct GenerationClient<A, P = ThreadPacer> {
    api: A,
    pacer: P,
    policy: PollPolicy,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<A: GenerationApi> GenerationClient<A, ThreadPacer> {
    pub fn new(api: A) -> Self {
        Self::with_pacer(api, ThreadPacer)
    }
}

impl<A: GenerationApi, P: Pacer> GenerationClient<A, P> {
    pub fn with_pacer(api: A, pacer: P) -> Self {
        Self {
            api,
            pacer,
            policy: PollPolicy::default(),
            interrupt: None,
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// The configured interval, raised to [`MIN_POLL_INTERVAL`].
    pub fn poll_interval(&self) -> Duration {
        self.policy.interval.max(MIN_POLL_INTERVAL)
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn submit(
        &self,
        prompt: &str,
        negative_prompt: &str,
        art_style: &str,
        should_remesh: bool,
    ) -> Result<GenerationJob, SubmissionError> {
        self.submit_request(&PreviewTaskRequest::new(
            prompt,
            negative_prompt,
            art_style,
            should_remesh,
        ))
    }

    pub fn submit_request(
        &self,
        request: &PreviewTaskRequest,
    ) -> Result<GenerationJob, SubmissionError> {
        let submitted_at = timestamp_millis();
        let job_id = self.api.create_task(request)?;
        tracing::info!(%job_id, art_style = %request.art_style, "preview task created");
        let mut job = GenerationJob::queued(job_id);
        job.created_at = u64::try_from(submitted_at).ok();
        Ok(job)
    }

    /// Polls until the job reaches a terminal status.
    ///
    /// One status request is issued per iteration, then the pacer waits one
    /// interval; the first terminal status is returned without another
    /// request. `observe` sees every fetched snapshot.
    pub fn poll_until_terminal(
        &self,
        job: &GenerationJob,
        mut observe: impl FnMut(&GenerationJob),
    ) -> Result<GenerationJob, PollError> {
        let interval = self.poll_interval();
        let started = Instant::now();
        let mut slept = Duration::ZERO;
        loop {
            let mut current = self.api.fetch_task(&job.id)?;
            if current.created_at.is_none() {
                current.created_at = job.created_at;
            }
            observe(&current);
            if current.status.is_terminal() {
                tracing::info!(job_id = %current.id, status = %current.status, "task finished");
                return Ok(current);
            }
            tracing::debug!(
                job_id = %current.id,
                status = %current.status,
                progress = current.progress.unwrap_or(0),
                "task still running"
            );
            if let Some(limit) = self.policy.max_wait {
                let waited = started.elapsed().max(slept);
                if waited >= limit {
                    return Err(PollError::TimedOut {
                        job_id: job.id.clone(),
                        waited,
                    });
                }
            }
            if self.interrupted() {
                return Err(PollError::Interrupted {
                    job_id: job.id.clone(),
                });
            }
            self.pacer.wait(interval);
            slept += interval;
        }
    }

    /// Downloads the glb of a succeeded job. Any other status is refused
    /// before a request is made.
    pub fn retrieve(&self, job: &GenerationJob) -> Result<GeneratedAsset, DownloadError> {
        if !job.is_retrievable() {
            return Err(DownloadError::NotRetrievable {
                job_id: job.id.clone(),
                status: job.status,
            });
        }
        let Some(url) = job.glb_url() else {
            return Err(DownloadError::MissingUrl {
                job_id: job.id.clone(),
            });
        };
        let bytes = self.api.fetch_asset(url)?;
        tracing::info!(job_id = %job.id, bytes = bytes.len(), "artifact downloaded");
        let stamp = job
            .created_at
            .map(u128::from)
            .unwrap_or_else(timestamp_millis);
        Ok(GeneratedAsset {
            file_name: artifact_file_name(stamp),
            source_url: url.to_string(),
            bytes,
        })
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use speech2model_contracts::jobs::JobStatus;

    use speech2model_contracts::jobs::{GenerationJob, PreviewTaskRequest};

    use super::testing::{job, RecordingPacer, ScriptedApi};
    use super::{
        parse_job, parse_task_id, GenerationApi, GenerationClient, PollPolicy, MIN_POLL_INTERVAL,
    };
    use crate::error::{DownloadError, PollError, SubmissionError};

    #[test]
    fn parse_task_id_reads_result_field() {
        assert_eq!(
            parse_task_id(&json!({"result": "018a210d-8ba4"})),
            Some("018a210d-8ba4".to_string())
        );
        assert_eq!(parse_task_id(&json!({"result": ""})), None);
        assert_eq!(parse_task_id(&json!({"id": "x"})), None);
    }

    #[test]
    fn parse_job_fills_missing_id() -> anyhow::Result<()> {
        let parsed = parse_job(
            "task-7",
            json!({"status": "IN_PROGRESS", "progress": 12, "model_urls": {}}),
        )
        .map_err(|err| anyhow::anyhow!("{err:?}"))?;
        assert_eq!(parsed.id, "task-7");
        assert_eq!(parsed.status, JobStatus::InProgress);
        assert_eq!(parsed.progress, Some(12));
        Ok(())
    }

    #[test]
    fn parse_job_rejects_unknown_status() {
        assert!(parse_job("task-7", json!({"status": "MELTING"})).is_err());
    }

    #[test]
    fn submit_sends_preview_request() -> anyhow::Result<()> {
        let client = GenerationClient::new(ScriptedApi::default());
        let job = client.submit("A red chair.", "ugly", "cartoon", false)?;
        assert_eq!(job.id, "task-1");
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.created_at.is_some());

        let created = client.api().created.borrow();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].mode, "preview");
        assert_eq!(created[0].negative_prompt, "ugly");
        assert_eq!(created[0].art_style, "cartoon");
        assert!(!created[0].should_remesh);
        Ok(())
    }

    #[test]
    fn submit_failure_is_submission_error() {
        let api = ScriptedApi::default();
        *api.create_result.borrow_mut() = Some(Err(SubmissionError::Status {
            code: 401,
            body: "bad key".to_string(),
        }));
        let err = GenerationClient::new(api)
            .submit("x", "y", "realistic", true)
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Status { code: 401, .. }));
    }

    #[test]
    fn poll_issues_one_request_per_interval_and_stops_at_terminal() -> anyhow::Result<()> {
        let pacer = RecordingPacer::default();
        let api = ScriptedApi::with_statuses(vec![
            job(JobStatus::Queued, 0),
            job(JobStatus::InProgress, 40),
            job(JobStatus::Succeeded, 100),
            job(JobStatus::InProgress, 100),
        ]);
        let client = GenerationClient::with_pacer(api, &pacer);
        let mut seen = Vec::new();
        let finished = client.poll_until_terminal(&job(JobStatus::Queued, 0), |snapshot| {
            seen.push((snapshot.status, snapshot.progress))
        })?;

        assert_eq!(finished.status, JobStatus::Succeeded);
        assert_eq!(client.api().status_calls.get(), 3);
        assert_eq!(client.api().statuses.borrow().len(), 1);
        assert_eq!(*pacer.waits.borrow(), vec![Duration::from_secs(5); 2]);
        assert_eq!(
            seen,
            vec![
                (JobStatus::Queued, Some(0)),
                (JobStatus::InProgress, Some(40)),
                (JobStatus::Succeeded, Some(100)),
            ]
        );
        Ok(())
    }

    #[test]
    fn poll_returns_failed_job_without_retrying() -> anyhow::Result<()> {
        let pacer = RecordingPacer::default();
        let api = ScriptedApi::with_statuses(vec![job(JobStatus::Failed, 10)]);
        let client = GenerationClient::with_pacer(api, &pacer);
        let finished = client.poll_until_terminal(&job(JobStatus::Queued, 0), |_| {})?;
        assert_eq!(finished.status, JobStatus::Failed);
        assert!(pacer.waits.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn poll_transport_failure_is_poll_error() {
        let pacer = RecordingPacer::default();
        let api = ScriptedApi::default();
        api.statuses.borrow_mut().push_back(Err(PollError::Status {
            code: 503,
            body: "unavailable".to_string(),
        }));
        let err = GenerationClient::with_pacer(api, &pacer)
            .poll_until_terminal(&job(JobStatus::Queued, 0), |_| {})
            .unwrap_err();
        assert!(matches!(err, PollError::Status { code: 503, .. }));
    }

    #[test]
    fn poll_ceiling_stops_long_running_job() {
        let pacer = RecordingPacer::default();
        let api = ScriptedApi::with_statuses(vec![job(JobStatus::InProgress, 1); 10]);
        let client = GenerationClient::with_pacer(api, &pacer).with_policy(PollPolicy {
            interval: Duration::from_secs(5),
            max_wait: Some(Duration::from_secs(10)),
        });
        let err = client
            .poll_until_terminal(&job(JobStatus::Queued, 0), |_| {})
            .unwrap_err();
        assert!(
            matches!(err, PollError::TimedOut { waited, .. } if waited == Duration::from_secs(10))
        );
        assert_eq!(client.api().status_calls.get(), 3);
    }

    #[test]
    fn zero_interval_is_raised_and_ceiling_still_fires() {
        let pacer = RecordingPacer::default();
        let api = ScriptedApi::with_statuses(vec![job(JobStatus::InProgress, 1); 500]);
        let client = GenerationClient::with_pacer(api, &pacer).with_policy(PollPolicy {
            interval: Duration::ZERO,
            max_wait: Some(Duration::from_secs(1)),
        });
        assert_eq!(client.poll_interval(), MIN_POLL_INTERVAL);

        let err = client
            .poll_until_terminal(&job(JobStatus::Queued, 0), |_| {})
            .unwrap_err();
        assert!(matches!(err, PollError::TimedOut { .. }));
        assert_eq!(client.api().status_calls.get(), 11);
        assert!(pacer.waits.borrow().iter().all(|wait| *wait == MIN_POLL_INTERVAL));
    }

    #[test]
    fn ceiling_counts_time_spent_in_requests() {
        struct SlowApi(ScriptedApi);

        impl GenerationApi for SlowApi {
            fn create_task(&self, request: &PreviewTaskRequest) -> Result<String, SubmissionError> {
                self.0.create_task(request)
            }

            fn fetch_task(&self, job_id: &str) -> Result<GenerationJob, PollError> {
                std::thread::sleep(Duration::from_millis(200));
                self.0.fetch_task(job_id)
            }

            fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
                self.0.fetch_asset(url)
            }
        }

        let pacer = RecordingPacer::default();
        let api = SlowApi(ScriptedApi::with_statuses(vec![job(JobStatus::InProgress, 1); 50]));
        let client = GenerationClient::with_pacer(api, &pacer).with_policy(PollPolicy {
            interval: MIN_POLL_INTERVAL,
            max_wait: Some(Duration::from_millis(500)),
        });
        let err = client
            .poll_until_terminal(&job(JobStatus::Queued, 0), |_| {})
            .unwrap_err();
        assert!(matches!(err, PollError::TimedOut { .. }));
        // Waiting alone would need six requests to reach 500ms.
        assert!(client.api().0.status_calls.get() <= 3);
    }

    #[test]
    fn poll_stops_when_interrupted() {
        let pacer = RecordingPacer::default();
        let api = ScriptedApi::with_statuses(vec![job(JobStatus::InProgress, 1); 3]);
        let flag = Arc::new(AtomicBool::new(true));
        let err = GenerationClient::with_pacer(api, &pacer)
            .with_interrupt(flag)
            .poll_until_terminal(&job(JobStatus::Queued, 0), |_| {})
            .unwrap_err();
        assert!(matches!(err, PollError::Interrupted { .. }));
        assert!(pacer.waits.borrow().is_empty());
    }

    #[test]
    fn retrieve_downloads_succeeded_job() -> anyhow::Result<()> {
        let client = GenerationClient::new(ScriptedApi::with_statuses(Vec::new()));
        let mut done = job(JobStatus::Succeeded, 100);
        done.created_at = Some(1_700_000_000_000);
        let asset = client.retrieve(&done)?;
        assert_eq!(asset.bytes, b"glTF".to_vec());
        assert_eq!(asset.file_name, "speech2model_1700000000000.glb");
        assert_eq!(asset.source_url, "https://assets.example/task-1.glb");
        Ok(())
    }

    #[test]
    fn retrieve_refuses_failed_job_without_network() {
        let client = GenerationClient::new(ScriptedApi::with_statuses(Vec::new()));
        for status in [JobStatus::Failed, JobStatus::Canceled, JobStatus::InProgress] {
            let err = client.retrieve(&job(status, 50)).unwrap_err();
            assert!(matches!(err, DownloadError::NotRetrievable { .. }));
        }
        assert_eq!(client.api().asset_calls.get(), 0);
    }

    #[test]
    fn retrieve_requires_glb_url() {
        let client = GenerationClient::new(ScriptedApi::with_statuses(Vec::new()));
        let mut done = job(JobStatus::Succeeded, 100);
        done.model_urls.glb = None;
        let err = client.retrieve(&done).unwrap_err();
        assert!(matches!(err, DownloadError::MissingUrl { .. }));
    }
}
