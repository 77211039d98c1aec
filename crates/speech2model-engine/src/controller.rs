use std::fmt::Display;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use speech2model_contracts::events::EventWriter;
use speech2model_contracts::jobs::{
    GeneratedAsset, GenerationJob, JobStatus, PreviewTaskRequest, DEFAULT_ART_STYLE,
    DEFAULT_NEGATIVE_PROMPT,
};
use speech2model_contracts::runs::receipts::{receipt_path_for, write_receipt, ArtifactReceipt};
use speech2model_contracts::runs::summary::{write_summary, SessionSummary};
use speech2model_contracts::session::{CommandInterpreter, FeedOutcome};
use speech2model_contracts::voice::VOICE_HELP_PHRASES;

use crate::completion::{CompletionService, PromptSynthesizer};
use crate::error::{PipelineError, RecognitionFailure};
use crate::generation::{GenerationApi, GenerationClient, Pacer, ThreadPacer};
use crate::listen::UtteranceSource;
use crate::sha256_hex;

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub out_dir: PathBuf,
    pub summary_path: Option<PathBuf>,
    pub negative_prompt: String,
    pub art_style: String,
    pub should_remesh: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("."),
            summary_path: None,
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
            art_style: DEFAULT_ART_STYLE.to_string(),
            should_remesh: true,
        }
    }
}

/// A saved artifact and the job that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub artifact_path: PathBuf,
    pub receipt_path: Option<PathBuf>,
    pub job: GenerationJob,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Appended,
    Cleared,
    NothingToSend,
    Busy,
    Delivered(Delivery),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Interrupted,
    SourceExhausted,
}

/// Drives listen, interpret and the triggered pipeline on one thread.
pub struct SessionController<S, C, A, P = ThreadPacer> {
    source: S,
    synthesizer: PromptSynthesizer<C>,
    generator: GenerationClient<A, P>,
    interpreter: CommandInterpreter,
    events: EventWriter,
    summary: SessionSummary,
    settings: ControllerSettings,
    interrupt: Arc<AtomicBool>,
    out: Box<dyn Write>,
}

impl<S, C, A, P> SessionController<S, C, A, P>
where
    S: UtteranceSource,
    C: CompletionService,
    A: GenerationApi,
    P: Pacer,
{
    pub fn new(
        source: S,
        synthesizer: PromptSynthesizer<C>,
        generator: GenerationClient<A, P>,
        events: EventWriter,
        settings: ControllerSettings,
        interrupt: Arc<AtomicBool>,
    ) -> Self {
        let summary = SessionSummary::start(events.session_id());
        Self {
            source,
            synthesizer,
            generator,
            interpreter: CommandInterpreter::new(),
            events,
            summary,
            settings,
            interrupt,
            out: Box::new(io::stdout()),
        }
    }

    /// Replaces stdout as the destination for user-facing lines.
    pub fn with_output(mut self, out: Box<dyn Write>) -> Self {
        self.out = out;
        self
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    pub fn interpreter(&self) -> &CommandInterpreter {
        &self.interpreter
    }

    pub fn generator(&self) -> &GenerationClient<A, P> {
        &self.generator
    }

    /// Listens until interrupted or until the source runs dry, then writes
    /// the session summary.
    pub fn run(&mut self) -> anyhow::Result<LoopExit> {
        self.record(
            "session_started",
            json!({
                "text_model": self.synthesizer.model(),
                "out_dir": self.settings.out_dir.to_string_lossy(),
                "art_style": self.settings.art_style,
                "poll_interval_s": self.generator.poll_interval().as_secs_f64(),
            }),
        );
        tracing::info!(session_id = %self.events.session_id(), "session started");
        self.say(format!(
            "Once finished describing the 3D model say {}. Say {} to clear it.",
            VOICE_HELP_PHRASES[1], VOICE_HELP_PHRASES[0]
        ));

        let exit = loop {
            if self.interrupted() {
                break LoopExit::Interrupted;
            }
            self.say("Listening...");
            match self.source.listen() {
                Ok(Some(utterance)) => {
                    // A line typed after Ctrl-C must not start a new turn.
                    if self.interrupted() {
                        tracing::debug!("dropping utterance received after interrupt");
                        break LoopExit::Interrupted;
                    }
                    self.handle_utterance(&utterance);
                }
                Ok(None) => {
                    if self.interrupted() {
                        break LoopExit::Interrupted;
                    }
                    break LoopExit::SourceExhausted;
                }
                Err(failure) => self.report_recognition_failure(&failure),
            }
        };

        self.summary.finish();
        self.record(
            "session_finished",
            json!({
                "exit": format!("{exit:?}"),
                "utterances": self.summary.utterances,
                "triggers": self.summary.triggers,
                "artifacts": self.summary.artifacts,
                "pipeline_failures": self.summary.pipeline_failures,
            }),
        );
        if let Some(path) = self.settings.summary_path.clone() {
            write_summary(&path, &self.summary)?;
        }
        tracing::info!(?exit, artifacts = self.summary.artifacts, "session finished");
        self.say("Exiting live transcription...");
        Ok(exit)
    }

    pub fn handle_utterance(&mut self, utterance: &str) -> TurnOutcome {
        self.summary.utterances += 1;
        self.say(format!("You said: {utterance}"));
        let outcome = self.interpreter.feed(utterance);
        let event_type = outcome.event_type();
        self.record(
            "utterance",
            json!({
                "text": utterance,
                "buffered": self.interpreter.buffer().len(),
            }),
        );

        match outcome {
            FeedOutcome::Appended => TurnOutcome::Appended,
            FeedOutcome::Cleared => {
                self.record(event_type, json!({}));
                self.say("3D model description cleared. Please begin describing.");
                TurnOutcome::Cleared
            }
            FeedOutcome::NothingToSend => {
                self.record(event_type, json!({}));
                self.say("No text to send. Buffer is empty.");
                TurnOutcome::NothingToSend
            }
            FeedOutcome::Busy => {
                tracing::debug!("utterance ignored while generating");
                TurnOutcome::Busy
            }
            FeedOutcome::Triggered(description) => {
                self.summary.triggers += 1;
                self.record(event_type, json!({ "description": description }));
                let result = self.run_pipeline(&description);
                self.interpreter.finish_generation();
                self.settle(result)
            }
        }
    }

    /// Synthesize, submit, poll, retrieve and persist for one description.
    pub fn run_pipeline(&mut self, description: &str) -> Result<Delivery, PipelineError> {
        let synthesis = self.synthesizer.synthesize(description)?;
        tracing::debug!(prompt = %synthesis.request.prompt, "full completion prompt");
        self.record(
            "completion_received",
            json!({
                "model": synthesis.request.model,
                "chars": synthesis.raw_completion.chars().count(),
            }),
        );
        let prompt = synthesis.modeling_prompt;
        self.record("modeling_prompt", json!({ "prompt": prompt }));
        self.say("Adjusted 3D Model Prompt:");
        self.say(&prompt);

        let request = PreviewTaskRequest::new(
            &prompt,
            &self.settings.negative_prompt,
            &self.settings.art_style,
            self.settings.should_remesh,
        );
        self.say("Sending 3D Model Prompt to Meshy");
        let job = self.generator.submit_request(&request)?;
        self.record("job_submitted", json!({ "job_id": job.id }));
        self.say(format!("Preview task created. Task ID: {}", job.id));

        let interval = self.generator.poll_interval();
        let events = &self.events;
        let out = &mut self.out;
        let finished = self.generator.poll_until_terminal(&job, |snapshot| {
            if let Err(err) = events.emit_value(
                "job_status",
                json!({
                    "job_id": snapshot.id,
                    "status": snapshot.status.as_str(),
                    "progress": snapshot.progress,
                }),
            ) {
                tracing::warn!(error = %err, "failed to write job_status event");
            }
            if !snapshot.status.is_terminal() {
                if let Err(err) = writeln!(
                    out,
                    "Preview task status: {} | Progress: {} | Retrying in {} seconds...",
                    snapshot.status,
                    snapshot.progress.unwrap_or(0),
                    interval.as_secs_f64()
                ) {
                    tracing::warn!(error = %err, "failed to write console output");
                }
            }
        })?;

        if finished.status != JobStatus::Succeeded {
            return Err(PipelineError::JobFailed {
                job_id: finished.id.clone(),
                status: finished.status,
                message: finished
                    .failure_message()
                    .unwrap_or("no reason given")
                    .to_string(),
            });
        }
        self.say("Preview task finished.");

        let asset = self.generator.retrieve(&finished)?;
        let saved = save_asset(
            &self.settings.out_dir,
            &asset,
            self.events.session_id(),
            description,
            &request,
            &finished,
        )?;
        let SavedArtifact {
            artifact_path,
            receipt_path,
            sha256,
        } = saved;

        self.record(
            "artifact_saved",
            json!({
                "job_id": finished.id,
                "path": artifact_path.to_string_lossy(),
                "bytes": asset.bytes.len(),
                "sha256": sha256,
            }),
        );
        self.say(format!(
            "Preview model downloaded to: {}",
            artifact_path.display()
        ));
        Ok(Delivery {
            artifact_path,
            receipt_path,
            job: finished,
            prompt,
        })
    }

    fn settle(&mut self, result: Result<Delivery, PipelineError>) -> TurnOutcome {
        match result {
            Ok(delivery) => {
                self.summary.artifacts += 1;
                self.summary
                    .artifact_paths
                    .push(delivery.artifact_path.to_string_lossy().to_string());
                self.say("Finished! Your 3D model is ready.");
                TurnOutcome::Delivered(delivery)
            }
            Err(err) => {
                self.summary.pipeline_failures += 1;
                let stage = err.stage();
                let message = err.to_string();
                tracing::error!(stage, error = %err, "pipeline failed");
                self.record(
                    "pipeline_failed",
                    json!({ "stage": stage, "error": message }),
                );
                self.say(format!("Could not create the 3D model: {message}"));
                self.say("Please begin describing a new model.");
                TurnOutcome::Failed(message)
            }
        }
    }

    fn report_recognition_failure(&mut self, failure: &RecognitionFailure) {
        self.summary.recognition_failures += 1;
        self.record("recognition_failed", json!({ "error": failure.to_string() }));
        match failure {
            RecognitionFailure::Unintelligible => {
                self.say("Sorry, I couldn't understand what you said. Try again.");
            }
            RecognitionFailure::ServiceUnavailable(message) => {
                tracing::warn!(error = %message, "speech recognition unavailable");
                self.say(format!(
                    "Error with the speech recognition service: {message}"
                ));
            }
        }
    }

    fn record(&self, event_type: &str, payload: Value) {
        if let Err(err) = self.events.emit_value(event_type, payload) {
            tracing::warn!(error = %err, event_type, "failed to write event");
        }
    }

    fn say(&mut self, line: impl Display) {
        if let Err(err) = writeln!(self.out, "{line}") {
            tracing::warn!(error = %err, "failed to write console output");
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub artifact_path: PathBuf,
    pub receipt_path: Option<PathBuf>,
    pub sha256: String,
}

/// Writes the downloaded bytes under `out_dir` (created on demand) with a
/// JSON receipt next to them. A receipt that cannot be written is logged and
/// skipped; the artifact itself is the failure boundary.
pub fn save_asset(
    out_dir: &Path,
    asset: &GeneratedAsset,
    session_id: &str,
    description: &str,
    request: &PreviewTaskRequest,
    job: &GenerationJob,
) -> Result<SavedArtifact, PipelineError> {
    fs::create_dir_all(out_dir).map_err(|source| PipelineError::Persist {
        path: out_dir.to_path_buf(),
        source,
    })?;
    let artifact_path = out_dir.join(&asset.file_name);
    fs::write(&artifact_path, &asset.bytes).map_err(|source| PipelineError::Persist {
        path: artifact_path.clone(),
        source,
    })?;

    let sha256 = sha256_hex(&asset.bytes);
    let receipt = ArtifactReceipt::new(
        session_id,
        description,
        request,
        job,
        &asset.source_url,
        &artifact_path,
        asset.bytes.len() as u64,
        &sha256,
    );
    let receipt_path = receipt_path_for(&artifact_path);
    let receipt_path = match write_receipt(&receipt_path, &receipt) {
        Ok(()) => Some(receipt_path),
        Err(err) => {
            tracing::warn!(error = %err, path = %receipt_path.display(), "failed to write receipt");
            None
        }
    };
    tracing::info!(path = %artifact_path.display(), bytes = asset.bytes.len(), "artifact saved");
    Ok(SavedArtifact {
        artifact_path,
        receipt_path,
        sha256,
    })
}
