use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use voxgate::audio::{MicrophoneCapture, WebRtcDetector};
use voxgate::config::PipelineConfig;
use voxgate::kernel::telemetry::Telemetry;
use voxgate::kernel::time::SystemClock;
use voxgate::kernel::DecisionEngine;
use voxgate::services::{DryRunRouter, HttpDecisionRouter, HttpTranscriber, SayCommandSpeaker};
use voxgate::voice::{AudioInput, Collaborators, DecisionRouter, FaultChannel, VoiceLoop};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let mut config = PipelineConfig::load(config_path.as_deref()).context("loading configuration")?;

    let faults = FaultChannel::new();
    let telemetry = Telemetry::new();

    // The stream lives as long as `mic`.
    let (mic, source) = MicrophoneCapture::open(config.capture_stall_timeout(), faults.reporter.clone())
        .context("opening microphone")?;
    config.sample_rate = mic.sample_rate;
    tracing::info!(sample_rate = config.sample_rate, "Microphone ready");

    let transcriber_url = config
        .transcriber_url
        .clone()
        .context("transcriber_url is required (config file or VOXGATE_TRANSCRIBER_URL)")?;
    let transcriber = HttpTranscriber::new(transcriber_url, config.request_timeout())?;

    let router: Arc<dyn DecisionRouter> = match &config.router_url {
        Some(url) => Arc::new(HttpDecisionRouter::new(url.clone(), config.request_timeout())?),
        None => {
            tracing::warn!("No router_url configured, approved actions are only described");
            Arc::new(DryRunRouter)
        }
    };

    let collaborators = Collaborators {
        transcriber: Arc::new(transcriber),
        router,
        speaker: Arc::new(SayCommandSpeaker::new(config.voice.clone())),
    };

    let engine = DecisionEngine::from_config(&config, Arc::new(SystemClock), telemetry.clone(), faults.reporter.clone())?;
    let input = AudioInput {
        source: Box::new(source),
        detector: WebRtcDetector::factory(config.sample_rate, config.vad_aggressiveness),
    };

    let mut voice = VoiceLoop::start(&config, engine, input, collaborators, faults, telemetry)?;
    tracing::info!("Listening. Say \"exit\" or press Ctrl+C to stop.");

    tokio::select! {
        _ = voice.wait() => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
    }

    let snapshot = voice.shutdown().await;
    tracing::info!(
        decisions = snapshot.decision_stats.total(),
        approved = snapshot.decision_stats.approved,
        blocked = snapshot.decision_stats.blocked,
        avg_latency_us = snapshot.decision_stats.avg_latency_us,
        faults = snapshot.faults.values().sum::<u64>(),
        "Session summary"
    );
    Ok(())
}
