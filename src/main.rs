use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use whisperworks::{
    AmplitudeDetector, AudioCaptureSession, Config, ConnectionMonitor, MicrophoneDevice,
    NoHaptics, NullLink, RetryPolicy, TranscriptionRequest, TranscriptionUploadClient,
    TriggerCoordinator, UploadProgress, VoicePipeline,
};

#[derive(Parser)]
#[command(name = "whisperworks", about = "Voice-trigger recording and transcription pipeline")]
struct Cli {
    /// Path to a config file (TOML/YAML), overlaid on built-in defaults
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe the transcription server's health and liveness endpoints
    Health,
    /// Upload a recorded WAV file and print the transcript
    Transcribe {
        file: PathBuf,
        /// Override the configured language
        #[arg(long)]
        language: Option<String>,
    },
    /// Run the voice-trigger pipeline against the default microphone
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Health => health(&config).await,
        Command::Transcribe { file, language } => transcribe(&config, file, language).await,
        Command::Run => run(config).await,
    }
}

async fn health(config: &Config) -> Result<()> {
    let client = TranscriptionUploadClient::with_default_transport(RetryPolicy::default())
        .context("failed to build http client")?;

    let reachable = client.test_connection(&config.server.url).await?;
    println!("server: {}", config.server.url);
    println!("reachable: {}", reachable);

    if reachable {
        let status = client.get_server_status(&config.server.url).await?;
        println!("status: {}", status.status);
        println!("model loaded: {}", status.model_loaded);
        println!("languages: {}", status.supported_languages.join(", "));
        if let Some(version) = status.version {
            println!("version: {}", version);
        }
    }

    Ok(())
}

async fn transcribe(config: &Config, file: PathBuf, language: Option<String>) -> Result<()> {
    let audio = tokio::fs::read(&file)
        .await
        .with_context(|| format!("failed to read {:?}", file))?;

    let client = TranscriptionUploadClient::with_default_transport(RetryPolicy::default())
        .context("failed to build http client")?;

    let request = TranscriptionRequest {
        audio: audio.into(),
        server_url: config.server.url.clone(),
        language: language.unwrap_or_else(|| config.server.language.clone()),
    };

    let mut progress = client.upload(request);
    while let Some(event) = progress.recv().await {
        match event {
            UploadProgress::Started => info!("Upload started"),
            UploadProgress::Uploading(percent) => info!("Uploading: {}%", percent),
            UploadProgress::Processing => info!("Server processing..."),
            UploadProgress::Success(result) => {
                println!("{}", result.full_text);
                if !result.keywords.is_empty() {
                    println!("keywords: {}", result.keywords.join(", "));
                }
                if let Some(confidence) = result.confidence {
                    println!("confidence: {:.2}", confidence);
                }
            }
            UploadProgress::Error(e) => anyhow::bail!("transcription failed: {}", e),
        }
    }

    Ok(())
}

async fn run(config: Config) -> Result<()> {
    info!("WhisperWorks pipeline starting");
    info!("Server: {}", config.server.url);
    info!(
        "Trigger: threshold={}, cooldown={}ms, clips={}s",
        config.trigger.threshold, config.trigger.cooldown_ms, config.trigger.recording_duration_secs
    );

    let detector = Arc::new(AmplitudeDetector::new(
        config.trigger.threshold,
        config.cooldown(),
    ));

    let capture = Arc::new(AudioCaptureSession::new(
        config.capture_config(),
        Box::new(MicrophoneDevice::new(config.capture_device_config())),
        Arc::clone(&detector),
    ));

    let coordinator = Arc::new(TriggerCoordinator::new(
        detector,
        Box::new(MicrophoneDevice::new(config.trigger_device_config())),
        Arc::new(NoHaptics),
    ));

    let link = Arc::new(NullLink);
    let monitor = Arc::new(ConnectionMonitor::new(
        link.clone(),
        whisperworks::link::RECORDING_CAPABILITY,
    ));

    let uploader = Arc::new(
        TranscriptionUploadClient::with_default_transport(RetryPolicy::default())
            .context("failed to build http client")?,
    );

    let pipeline = VoicePipeline::new(config, capture, coordinator, monitor, uploader, link);
    pipeline.start().await.context("failed to start listening")?;

    info!("Listening for voice triggers, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    pipeline.shutdown().await;
    Ok(())
}
