use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use speech2model_contracts::events::EventWriter;
use speech2model_contracts::jobs::{
    JobStatus, PreviewTaskRequest, DEFAULT_ART_STYLE, DEFAULT_NEGATIVE_PROMPT,
};
use speech2model_contracts::prompts::DEFAULT_TEXT_MODEL;
use speech2model_engine::generation::{DEFAULT_POLL_INTERVAL, MIN_POLL_INTERVAL};
use speech2model_engine::{
    save_asset, ConsoleSource, ControllerSettings, GenerationClient, ListenSettings, LoopExit,
    MeshyApi, OllamaClient, PollPolicy, PromptSynthesizer, SessionController, UtteranceSource,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "speech2model",
    version,
    about = "Describe a 3D model out loud and download the generated glb"
)]
struct Cli {
    /// Debug-level logging for speech2model crates.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Listen for a description and generate a model on "create model".
    Listen(ListenArgs),
    /// Turn a description into a modeling prompt and print it.
    Refine(RefineArgs),
    /// Generate a model straight from a modeling prompt.
    Generate(GenerateArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    Console,
    Microphone,
}

#[derive(Debug, Args)]
struct CompletionArgs {
    #[arg(long, default_value = DEFAULT_TEXT_MODEL)]
    text_model: String,
    #[arg(long, env = "OLLAMA_HOST")]
    ollama_url: Option<String>,
}

#[derive(Debug, Args)]
struct GenerationArgs {
    #[arg(long, default_value = DEFAULT_NEGATIVE_PROMPT)]
    negative_prompt: String,
    #[arg(long, default_value = DEFAULT_ART_STYLE)]
    art_style: String,
    #[arg(long)]
    no_remesh: bool,
    /// Seconds between status requests.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs_f64())]
    poll_interval: f64,
    /// Give up polling after this many seconds. Unbounded when omitted.
    #[arg(long)]
    poll_timeout: Option<f64>,
}

impl GenerationArgs {
    fn poll_policy(&self) -> Result<PollPolicy> {
        let interval = seconds("--poll-interval", self.poll_interval)?;
        if interval < MIN_POLL_INTERVAL {
            bail!(
                "--poll-interval must be at least {} seconds",
                MIN_POLL_INTERVAL.as_secs_f64()
            );
        }
        let max_wait = self
            .poll_timeout
            .map(|value| seconds("--poll-timeout", value))
            .transpose()?;
        Ok(PollPolicy { interval, max_wait })
    }
}

#[derive(Debug, Args)]
struct ListenArgs {
    #[arg(long, default_value = ".")]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = SourceKind::Console)]
    source: SourceKind,
    #[command(flatten)]
    completion: CompletionArgs,
    #[command(flatten)]
    generation: GenerationArgs,
    /// Seconds of ambient noise sampled before listening.
    #[arg(long, default_value_t = 4.0)]
    calibration: f64,
    /// Seconds of silence that end an utterance.
    #[arg(long, default_value_t = 0.8)]
    pause_threshold: f64,
    #[arg(long, default_value_t = 0.03)]
    energy_threshold: f32,
    #[arg(long, default_value = "whisper-1")]
    stt_model: String,
    #[arg(long, env = "OPENAI_API_BASE")]
    stt_url: Option<String>,
}

impl ListenArgs {
    fn listen_settings(&self) -> Result<ListenSettings> {
        Ok(ListenSettings {
            calibration: seconds("--calibration", self.calibration)?,
            pause_threshold: seconds("--pause-threshold", self.pause_threshold)?,
            energy_threshold: self.energy_threshold,
            ..ListenSettings::default()
        })
    }
}

#[derive(Debug, Args)]
struct RefineArgs {
    #[arg(long)]
    description: String,
    #[command(flatten)]
    completion: CompletionArgs,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = ".")]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    generation: GenerationArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("speech2model error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Listen(args) => run_listen(args),
        Command::Refine(args) => run_refine(args),
        Command::Generate(args) => run_generate(args),
    }
}

fn log_filter(verbose: bool) -> &'static str {
    if verbose {
        "warn,speech2model=debug"
    } else {
        "warn,speech2model=info"
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_filter(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// First Ctrl-C asks the loop to stop at the next step; a second one exits.
fn install_interrupt() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            eprintln!();
            std::process::exit(130);
        }
        eprintln!("\nStopping after the current step. Press Ctrl-C again to exit now.");
    })
    .context("failed to install Ctrl-C handler")?;
    Ok(flag)
}

fn seconds(flag: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("{flag} must be a non-negative number of seconds"))
}

fn completion_client(args: &CompletionArgs) -> OllamaClient {
    match args.ollama_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => OllamaClient::new(url),
        _ => OllamaClient::from_env(),
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn run_listen(args: ListenArgs) -> Result<i32> {
    let interrupt = install_interrupt()?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let policy = args.generation.poll_policy()?;
    let api = MeshyApi::from_env()?;
    let generator = GenerationClient::new(api)
        .with_policy(policy)
        .with_interrupt(Arc::clone(&interrupt));
    let synthesizer = PromptSynthesizer::new(
        completion_client(&args.completion),
        args.completion.text_model.clone(),
    );
    let source = open_source(&args, Arc::clone(&interrupt))?;

    let settings = ControllerSettings {
        out_dir: args.out.clone(),
        summary_path: Some(args.out.join("summary.json")),
        negative_prompt: args.generation.negative_prompt.clone(),
        art_style: args.generation.art_style.clone(),
        should_remesh: !args.generation.no_remesh,
    };
    let events = EventWriter::new(&events_path, new_session_id());
    let mut controller =
        SessionController::new(source, synthesizer, generator, events, settings, interrupt);
    let exit = controller.run()?;
    tracing::debug!(?exit, events = %events_path.display(), "listen finished");
    Ok(match exit {
        LoopExit::Interrupted => 130,
        LoopExit::SourceExhausted => 0,
    })
}

fn open_source(
    args: &ListenArgs,
    interrupt: Arc<AtomicBool>,
) -> Result<Box<dyn UtteranceSource>> {
    match args.source {
        SourceKind::Console => {
            println!("Type one utterance per line. Ctrl-D ends the session.");
            Ok(Box::new(ConsoleSource::stdin()))
        }
        SourceKind::Microphone => open_microphone(args, interrupt),
    }
}

#[cfg(feature = "microphone")]
fn open_microphone(
    args: &ListenArgs,
    interrupt: Arc<AtomicBool>,
) -> Result<Box<dyn UtteranceSource>> {
    use speech2model_engine::{MicrophoneSource, WhisperTranscriber};

    let transcriber = WhisperTranscriber::from_env(&args.stt_model, args.stt_url.as_deref())?;
    let mut source = MicrophoneSource::open(args.listen_settings()?, transcriber, interrupt)?;
    println!("Adjusting for ambient noise... Please wait.");
    let threshold = source.calibrate();
    tracing::info!(threshold, "microphone calibrated");
    println!("Ready to transcribe. Speak now!");
    Ok(Box::new(source))
}

#[cfg(not(feature = "microphone"))]
fn open_microphone(
    args: &ListenArgs,
    _interrupt: Arc<AtomicBool>,
) -> Result<Box<dyn UtteranceSource>> {
    args.listen_settings()?;
    bail!("microphone input needs a build with `--features microphone`")
}

fn run_refine(args: RefineArgs) -> Result<i32> {
    if args.description.trim().is_empty() {
        bail!("--description must not be empty");
    }
    let synthesizer = PromptSynthesizer::new(
        completion_client(&args.completion),
        args.completion.text_model.clone(),
    );
    let synthesis = synthesizer
        .synthesize(args.description.trim())
        .context("failed to refine description")?;
    println!("{}", synthesis.modeling_prompt);
    Ok(0)
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let prompt = args.prompt.trim();
    if prompt.is_empty() {
        bail!("--prompt must not be empty");
    }
    let interrupt = install_interrupt()?;
    let policy = args.generation.poll_policy()?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let events = EventWriter::new(&events_path, new_session_id());
    let client = GenerationClient::new(MeshyApi::from_env()?)
        .with_policy(policy)
        .with_interrupt(interrupt);

    let request = PreviewTaskRequest::new(
        prompt,
        &args.generation.negative_prompt,
        &args.generation.art_style,
        !args.generation.no_remesh,
    );
    let job = client.submit_request(&request)?;
    println!("Preview task created. Task ID: {}", job.id);
    events.emit_value("job_submitted", json!({ "job_id": job.id }))?;

    let finished = client.poll_until_terminal(&job, |snapshot| {
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
        println!(
            "Preview task status: {} | Progress: {}",
            snapshot.status,
            snapshot.progress.unwrap_or(0)
        );
    })?;
    if finished.status != JobStatus::Succeeded {
        bail!(
            "generation job {} ended with status {}: {}",
            finished.id,
            finished.status,
            finished.failure_message().unwrap_or("no reason given")
        );
    }

    let asset = client.retrieve(&finished)?;
    let saved = save_asset(
        &args.out,
        &asset,
        events.session_id(),
        prompt,
        &request,
        &finished,
    )?;
    events.emit_value(
        "artifact_saved",
        json!({
            "job_id": finished.id,
            "path": saved.artifact_path.to_string_lossy(),
            "bytes": asset.bytes.len(),
            "sha256": saved.sha256,
        }),
    )?;
    println!(
        "Preview model downloaded to: {}",
        saved.artifact_path.display()
    );
    Ok(0)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::{CommandFactory, Parser};

    use super::{log_filter, seconds, Cli, Command, SourceKind};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn listen_defaults() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["speech2model", "listen"])?;
        let Command::Listen(args) = cli.command else {
            anyhow::bail!("expected listen");
        };
        assert_eq!(args.source, SourceKind::Console);
        assert_eq!(args.completion.text_model, "granite3.1-dense");
        assert_eq!(args.generation.art_style, "realistic");
        assert!(!args.generation.no_remesh);

        let policy = args.generation.poll_policy()?;
        assert_eq!(policy.interval, Duration::from_secs(5));
        assert_eq!(policy.max_wait, None);

        let settings = args.listen_settings()?;
        assert_eq!(settings.calibration, Duration::from_secs(4));
        assert_eq!(settings.pause_threshold, Duration::from_millis(800));
        Ok(())
    }

    #[test]
    fn listen_flags_override_defaults() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "speech2model",
            "-v",
            "listen",
            "--source",
            "microphone",
            "--poll-interval",
            "2.5",
            "--poll-timeout",
            "600",
            "--no-remesh",
            "--art-style",
            "cartoon",
        ])?;
        assert!(cli.verbose);
        let Command::Listen(args) = cli.command else {
            anyhow::bail!("expected listen");
        };
        assert_eq!(args.source, SourceKind::Microphone);
        assert!(args.generation.no_remesh);
        let policy = args.generation.poll_policy()?;
        assert_eq!(policy.interval, Duration::from_millis(2500));
        assert_eq!(policy.max_wait, Some(Duration::from_secs(600)));
        Ok(())
    }

    #[test]
    fn negative_seconds_are_rejected() {
        assert!(seconds("--poll-interval", -1.0).is_err());
        assert!(seconds("--poll-interval", 0.0).is_ok());
    }

    #[test]
    fn zero_poll_interval_is_rejected() -> anyhow::Result<()> {
        for value in ["0", "0.05"] {
            let cli = Cli::try_parse_from([
                "speech2model",
                "generate",
                "--prompt",
                "a cup",
                "--poll-interval",
                value,
            ])?;
            let Command::Generate(args) = cli.command else {
                anyhow::bail!("expected generate");
            };
            assert!(args.generation.poll_policy().is_err(), "accepted {value}");
        }
        Ok(())
    }

    #[test]
    fn refine_and_generate_require_text() {
        assert!(Cli::try_parse_from(["speech2model", "refine"]).is_err());
        assert!(Cli::try_parse_from(["speech2model", "generate"]).is_err());
    }

    #[test]
    fn verbose_switches_log_level() {
        assert_eq!(log_filter(false), "warn,speech2model=info");
        assert_eq!(log_filter(true), "warn,speech2model=debug");
    }
}
