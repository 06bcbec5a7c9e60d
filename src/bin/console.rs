//! Typed-input front end: stdin lines go straight to the decision worker.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use voxgate::config::PipelineConfig;
use voxgate::kernel::telemetry::Telemetry;
use voxgate::kernel::time::SystemClock;
use voxgate::kernel::DecisionEngine;
use voxgate::services::{ConsoleSpeaker, DryRunRouter, HttpDecisionRouter};
use voxgate::voice::{Collaborators, DecisionRouter, FaultChannel, Transcriber, VoiceLoop};

/// Never called: typed input skips transcription.
struct NoTranscriber;

#[async_trait::async_trait]
impl Transcriber for NoTranscriber {
    async fn transcribe(&self, _samples: &[i16], _sample_rate: u32) -> Result<String, voxgate::error::TranscriptionError> {
        Ok(String::new())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = PipelineConfig::load(config_path.as_deref()).context("loading configuration")?;

    let faults = FaultChannel::new();
    let telemetry = Telemetry::new();
    let router: Arc<dyn DecisionRouter> = match &config.router_url {
        Some(url) => Arc::new(HttpDecisionRouter::new(url.clone(), config.request_timeout())?),
        None => Arc::new(DryRunRouter),
    };
    let collaborators = Collaborators {
        transcriber: Arc::new(NoTranscriber),
        router,
        speaker: Arc::new(ConsoleSpeaker),
    };

    let engine = DecisionEngine::from_config(&config, Arc::new(SystemClock), telemetry.clone(), faults.reporter.clone())?;
    let (mut voice, text_tx) = VoiceLoop::start_text(&config, engine, collaborators, faults, telemetry);
    let cancel = voice.cancel_token();

    println!("Type a command. \"exit\" quits.");
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line,
                () = cancel.cancelled() => break,
            };
            match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    if text_tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });

    voice.wait().await;
    let snapshot = voice.shutdown().await;
    tracing::info!(decisions = snapshot.decision_stats.total(), "Session summary");
    Ok(())
}
