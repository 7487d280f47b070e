//! Command-line harnesses for the voicegate speech sessions.
//!
//! One subcommand per session type: `recognize` and `transcribe` stream a
//! PCM file over the classic dialect, `synthesize` turns text into audio
//! over the streaming-task dialect.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use voicegate_engine::ConnectionConfig;
use voicegate_speech::audio::load_pcm_file;
use voicegate_speech::{
    RecognitionParams, RecognizerCallbacks, SpeechRecognizer, SpeechSynthesizer,
    SpeechTranscriber, SynthesisParams, SynthesizerCallbacks, TranscriberCallbacks,
    TranscriptionParams,
};

/// How long to wait for a start/stop acknowledgment.
const WAIT_BUDGET: Duration = Duration::from_secs(20);

#[derive(Parser)]
#[command(name = "voicegate", version, about = "Streaming speech gateway client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recognize one short utterance from a PCM file.
    Recognize(RecognizeArgs),
    /// Transcribe a longer PCM stream, printing sentence events.
    Transcribe(TranscribeArgs),
    /// Synthesize speech from text and write the audio to a file.
    Synthesize(SynthesizeArgs),
}

#[derive(Args)]
struct GatewayArgs {
    /// Gateway WebSocket URL.
    #[arg(long)]
    url: String,
    /// Application key for classic-dialect sessions (or VOICEGATE_APP_KEY).
    #[arg(long)]
    app_key: Option<String>,
    /// Short-lived access token (or VOICEGATE_TOKEN).
    #[arg(long)]
    token: Option<String>,
    /// API key for the streaming-task dialect (or VOICEGATE_API_KEY).
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(Args)]
struct AudioInputArgs {
    /// 16 kHz mono PCM input file.
    #[arg(long)]
    input: PathBuf,
    /// Bytes per audio chunk.
    #[arg(long, default_value_t = 320)]
    chunk_size: usize,
    /// Pacing between chunks, in milliseconds.
    #[arg(long, default_value_t = 10)]
    interval_ms: u64,
}

#[derive(Args)]
struct RecognizeArgs {
    #[command(flatten)]
    gateway: GatewayArgs,
    #[command(flatten)]
    audio: AudioInputArgs,
}

#[derive(Args)]
struct TranscribeArgs {
    #[command(flatten)]
    gateway: GatewayArgs,
    #[command(flatten)]
    audio: AudioInputArgs,
}

#[derive(Args)]
struct SynthesizeArgs {
    #[command(flatten)]
    gateway: GatewayArgs,
    /// Text to synthesize.
    #[arg(long)]
    text: String,
    /// Voice model to synthesize with.
    #[arg(long)]
    model: String,
    /// Where to write the synthesized audio.
    #[arg(long, default_value = "output.wav")]
    output: PathBuf,
}

fn classic_config(args: &GatewayArgs) -> anyhow::Result<ConnectionConfig> {
    let token = args
        .token
        .clone()
        .or_else(|| std::env::var("VOICEGATE_TOKEN").ok())
        .context("a token is required: pass --token or set VOICEGATE_TOKEN")?;
    let app_key = args
        .app_key
        .clone()
        .or_else(|| std::env::var("VOICEGATE_APP_KEY").ok())
        .context("an app key is required: pass --app-key or set VOICEGATE_APP_KEY")?;
    Ok(ConnectionConfig::with_token(&args.url, app_key, token))
}

fn streaming_config(args: &GatewayArgs) -> anyhow::Result<ConnectionConfig> {
    match &args.api_key {
        Some(api_key) => Ok(ConnectionConfig::with_api_key(&args.url, api_key)),
        None => Ok(ConnectionConfig::api_key_from_env(&args.url)?),
    }
}

async fn recognize(args: RecognizeArgs) -> anyhow::Result<()> {
    let config = classic_config(&args.gateway)?;
    let chunks = load_pcm_file(&args.audio.input, args.audio.chunk_size)
        .with_context(|| format!("failed to read {}", args.audio.input.display()))?;

    let callbacks = RecognizerCallbacks::new()
        .on_started(|text| info!(%text, "recognition started"))
        .on_result_changed(|text| info!(%text, "result changed"))
        .on_completed(|text| info!(%text, "recognition completed"))
        .on_task_failed(|text| error!(%text, "task failed"))
        .on_close(|| info!("connection closed"));
    let recognizer = SpeechRecognizer::new(config, callbacks);

    let ready = recognizer.start(RecognitionParams::default(), None).await?;
    if !ready.wait(WAIT_BUDGET).await? {
        recognizer.shutdown();
        anyhow::bail!("recognition start did not complete");
    }

    let interval = Duration::from_millis(args.audio.interval_ms);
    for chunk in chunks {
        recognizer.send_audio(chunk)?;
        tokio::time::sleep(interval).await;
    }
    info!("audio sent, stopping");

    let done = recognizer.stop()?;
    if !done.wait(WAIT_BUDGET).await? {
        recognizer.shutdown();
        anyhow::bail!("recognition stop did not complete");
    }
    recognizer.shutdown();
    Ok(())
}

async fn transcribe(args: TranscribeArgs) -> anyhow::Result<()> {
    let config = classic_config(&args.gateway)?;
    let chunks = load_pcm_file(&args.audio.input, args.audio.chunk_size)
        .with_context(|| format!("failed to read {}", args.audio.input.display()))?;

    let callbacks = TranscriberCallbacks::new()
        .on_started(|text| info!(%text, "transcription started"))
        .on_sentence_begin(|text| info!(%text, "sentence begin"))
        .on_sentence_end(|text| info!(%text, "sentence end"))
        .on_result_changed(|text| info!(%text, "result changed"))
        .on_completed(|text| info!(%text, "transcription completed"))
        .on_task_failed(|text| error!(%text, "task failed"))
        .on_close(|| info!("connection closed"));
    let transcriber = SpeechTranscriber::new(config, callbacks);

    let ready = transcriber.start(TranscriptionParams::default(), None).await?;
    if !ready.wait(WAIT_BUDGET).await? {
        transcriber.shutdown();
        anyhow::bail!("transcription start did not complete");
    }

    let interval = Duration::from_millis(args.audio.interval_ms);
    for chunk in chunks {
        transcriber.send_audio(chunk)?;
        tokio::time::sleep(interval).await;
    }
    info!("audio sent, stopping");

    let done = transcriber.stop()?;
    if !done.wait(WAIT_BUDGET).await? {
        transcriber.shutdown();
        anyhow::bail!("transcription stop did not complete");
    }
    transcriber.shutdown();
    Ok(())
}

async fn synthesize(args: SynthesizeArgs) -> anyhow::Result<()> {
    let config = streaming_config(&args.gateway)?;
    let audio = Arc::new(Mutex::new(Vec::<u8>::new()));

    let sink = audio.clone();
    let callbacks = SynthesizerCallbacks::new()
        .on_started(|task_id| info!(%task_id, "synthesis started"))
        .on_data(move |data| {
            if let Ok(mut buffer) = sink.lock() {
                buffer.extend_from_slice(data);
            }
        })
        .on_meta_info(|text| info!(%text, "meta info"))
        .on_completed(|text| info!(%text, "synthesis completed"))
        .on_task_failed(|text| error!(%text, "task failed"))
        .on_close(|| info!("connection closed"));
    let synthesizer = SpeechSynthesizer::new(config, callbacks);

    let done = synthesizer
        .start(&args.model, &args.text, SynthesisParams::default(), None)
        .await?;
    let completed = done.wait(WAIT_BUDGET).await?;
    synthesizer.shutdown();
    if !completed {
        anyhow::bail!("synthesis did not complete");
    }

    let buffer = audio.lock().map_err(|_| anyhow::anyhow!("audio buffer poisoned"))?;
    std::fs::write(&args.output, buffer.as_slice())
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!(bytes = buffer.len(), output = %args.output.display(), "audio written");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Recognize(args) => recognize(args).await,
        Command::Transcribe(args) => transcribe(args).await,
        Command::Synthesize(args) => synthesize(args).await,
    }
}
