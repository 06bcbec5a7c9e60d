use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::collaborators::{DecisionRouter, Transcriber};
use super::runtime::RuntimeHandle;
use crate::audio::{AudioSource, DetectorFactory, Segmenter, SegmenterConfig, SpeechSegment};
use crate::error::{CaptureError, RuntimeError};
use crate::kernel::decision::{Decision, DecisionStatus, Outcome};
use crate::kernel::engine::DecisionEngine;
use crate::kernel::intent::normalize::normalize;
use crate::kernel::telemetry::{Fault, FaultReporter, Stage, Telemetry, TelemetryEvent};

const STOP_WORDS: &[&str] = &["stop", "cancel"];
const EXIT_WORDS: &[&str] = &["exit", "quit"];
const GOODBYE: &str = "Goodbye.";
const ROUTER_FAILED: &str = "Sorry, something went wrong.";

/// System-level commands that never reach the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Stop,
    Exit,
}

/// Bare "stop"/"cancel" and "exit"/"quit". "stop dictation" is a normal command.
pub fn classify_interrupt(text: &str) -> Option<Interrupt> {
    let text = normalize(text);
    if STOP_WORDS.contains(&text.as_str()) {
        Some(Interrupt::Stop)
    } else if EXIT_WORDS.contains(&text.as_str()) {
        Some(Interrupt::Exit)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TranscriptionSettings {
    pub queue_timeout: Duration,
    pub speaking_wait: Duration,
    pub speaking_poll: Duration,
    pub min_transcript_chars: usize,
}

/// Capture stage. Runs on its own OS thread because frame reads block.
///
/// Any read failure other than a clean end of input is fatal for the whole runtime.
#[allow(clippy::too_many_arguments)]
pub fn run_capture(
    mut source: Box<dyn AudioSource>,
    detector: DetectorFactory,
    config: SegmenterConfig,
    frame_len: usize,
    audio_tx: mpsc::Sender<SpeechSegment>,
    cancel: CancellationToken,
    faults: FaultReporter,
    telemetry: Telemetry,
) {
    let mut detector = match detector() {
        Ok(detector) => detector,
        Err(e) => {
            faults.report_fatal(Stage::Capture, e.to_string());
            cancel.cancel();
            return;
        }
    };
    info!(sample_rate = source.sample_rate(), frame_len, "Capture worker started");

    let mut segmenter = Segmenter::new(config);
    let mut frame = vec![0i16; frame_len];

    let emit = |segment: SpeechSegment| -> bool {
        debug!(frames = segment.frames, secs = segment.duration().as_secs_f32(), "Speech segment");
        telemetry.record(TelemetryEvent::SegmentEmitted { frames: segment.frames });
        audio_tx.blocking_send(segment).is_ok()
    };

    while !cancel.is_cancelled() {
        match source.read_frame(&mut frame) {
            Ok(()) => {
                let is_speech = detector.is_speech(&frame);
                if let Some(segment) = segmenter.push(&frame, is_speech) {
                    if !emit(segment) {
                        break;
                    }
                }
            }
            Err(CaptureError::Exhausted) => {
                info!("Audio source exhausted");
                if let Some(segment) = segmenter.flush() {
                    emit(segment);
                }
                break;
            }
            Err(e) => {
                faults.report_fatal(Stage::Capture, e.to_string());
                cancel.cancel();
                break;
            }
        }
    }
    debug!("Capture worker stopped");
}

/// Transcription stage: segment in, non-trivial text out. Failures are reported
/// and skipped.
pub async fn run_transcription(
    mut audio_rx: mpsc::Receiver<SpeechSegment>,
    text_tx: mpsc::Sender<String>,
    transcriber: Arc<dyn Transcriber>,
    runtime: RuntimeHandle,
    settings: TranscriptionSettings,
    cancel: CancellationToken,
    faults: FaultReporter,
) {
    while !cancel.is_cancelled() {
        let segment = match timeout(settings.queue_timeout, audio_rx.recv()).await {
            Ok(Some(segment)) => segment,
            Ok(None) => break,
            Err(_) => continue,
        };

        // Keep the assistant from transcribing itself.
        let deadline = Instant::now() + settings.speaking_wait;
        while Instant::now() < deadline {
            match reported(runtime.is_speaking().await, &faults) {
                Some(true) => sleep(settings.speaking_poll).await,
                _ => break,
            }
        }

        let text = match transcriber.transcribe(&segment.samples, segment.sample_rate).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                faults.report(Stage::Transcription, e.to_string());
                continue;
            }
        };

        if text.chars().count() < settings.min_transcript_chars {
            debug!(chars = text.chars().count(), "Discarding short transcript");
            continue;
        }
        if text_tx.send(text).await.is_err() {
            break;
        }
    }
    debug!("Transcription worker stopped");
}

/// Decision stage: interrupts first, then confirmation replies, then fresh commands.
pub async fn run_decisions(
    mut text_rx: mpsc::Receiver<String>,
    mut engine: DecisionEngine,
    router: Arc<dyn DecisionRouter>,
    runtime: RuntimeHandle,
    queue_timeout: Duration,
    cancel: CancellationToken,
    faults: FaultReporter,
) {
    while !cancel.is_cancelled() {
        let text = match timeout(queue_timeout, text_rx.recv()).await {
            Ok(Some(text)) => text,
            Ok(None) => break,
            Err(_) => continue,
        };

        match classify_interrupt(&text) {
            Some(Interrupt::Exit) => {
                info!("Exit requested");
                reported(runtime.speak(GOODBYE).await, &faults);
                reported(runtime.shutdown().await, &faults);
                break;
            }
            Some(Interrupt::Stop) => {
                reported(runtime.interrupt().await, &faults);
                if let Some(decision) = engine.cancel_pending() {
                    respond(&decision, router.as_ref(), &runtime, &faults).await;
                }
                reported(runtime.set_pending(false).await, &faults);
                continue;
            }
            None => {}
        }

        // Any other input ends the interruption.
        if reported(runtime.take_interrupt().await, &faults) == Some(true) {
            debug!("Resuming after interrupt");
        }

        // Without the runtime there is nobody to speak or track confirmations.
        let Some(pending) = reported(runtime.is_pending().await, &faults) else {
            break;
        };
        let decision = if pending {
            // Mirror can lag behind the engine; fall back to a fresh parse.
            match engine.resolve_confirmation(&text) {
                Some(decision) => decision,
                None => engine.process_text(&text),
            }
        } else {
            engine.process_text(&text)
        };

        let now_pending = decision.status() == DecisionStatus::NeedsConfirmation;
        if now_pending != pending {
            reported(runtime.set_pending(now_pending).await, &faults);
        }
        respond(&decision, router.as_ref(), &runtime, &faults).await;
    }
    debug!("Decision worker stopped");
}

/// Speaks the outcome. Approved decisions go to the router first.
async fn respond(decision: &Decision, router: &dyn DecisionRouter, runtime: &RuntimeHandle, faults: &FaultReporter) {
    let spoken = match &decision.outcome {
        Outcome::Approved { .. } => match router.route(&decision.payload()).await {
            Ok(response) => {
                if !response.success {
                    warn!(error_code = ?response.error_code, "Router reported failure");
                }
                response.spoken_message
            }
            Err(e) => {
                faults.report(Stage::Router, e.to_string());
                ROUTER_FAILED.to_string()
            }
        },
        _ if decision.is_silent() => return,
        _ => decision.message().to_string(),
    };

    if !spoken.is_empty() {
        reported(runtime.speak(spoken).await, faults);
    }
}

/// Runtime mailbox failures go to the fault sink.
fn reported<T>(result: Result<T, RuntimeError>, faults: &FaultReporter) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            faults.report(Stage::Runtime, e.to_string());
            None
        }
    }
}

/// Drains the fault sink into telemetry. A fatal fault stops everything.
pub async fn run_faults(mut rx: mpsc::UnboundedReceiver<Fault>, telemetry: Telemetry, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            fault = rx.recv() => match fault {
                Some(fault) => {
                    telemetry.record(TelemetryEvent::Fault {
                        stage: fault.stage,
                        fatal: fault.fatal,
                    });
                    if fault.fatal {
                        cancel.cancel();
                    }
                }
                None => break,
            },
            () = cancel.cancelled() => break,
        }
    }
}
