use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::collaborators::Collaborators;
use super::runtime::{RuntimeActor, RuntimeHandle};
use super::workers::{run_capture, run_decisions, run_faults, run_transcription, TranscriptionSettings};
use crate::audio::{AudioSource, DetectorFactory, SegmenterConfig};
use crate::config::PipelineConfig;
use crate::error::RuntimeError;
use crate::kernel::engine::DecisionEngine;
use crate::kernel::telemetry::{Fault, FaultReporter, Telemetry, TelemetrySnapshot};

/// Where audio comes from and how speech is detected in it.
pub struct AudioInput {
    pub source: Box<dyn AudioSource>,
    pub detector: DetectorFactory,
}

/// The fault sink and the receiving end the loop drains.
pub struct FaultChannel {
    pub reporter: FaultReporter,
    pub receiver: mpsc::UnboundedReceiver<Fault>,
}

impl FaultChannel {
    pub fn new() -> Self {
        let (reporter, receiver) = FaultReporter::channel();
        Self { reporter, receiver }
    }
}

impl Default for FaultChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Running voice pipeline:
/// capture thread -> segments -> transcription -> text -> decisions -> router/speech.
///
/// All stages share one cancellation token. Dropping an input channel ends the
/// stages downstream of it, so a finite source drains the pipeline on its own.
pub struct VoiceLoop {
    runtime: RuntimeHandle,
    cancel: CancellationToken,
    faults: FaultReporter,
    telemetry: Telemetry,
    join_timeout: Duration,
    capture: Option<thread::JoinHandle<()>>,
    decisions: Option<JoinHandle<()>>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl VoiceLoop {
    /// Full audio pipeline. Must be called inside a tokio runtime.
    pub fn start(
        config: &PipelineConfig,
        engine: DecisionEngine,
        input: AudioInput,
        collaborators: Collaborators,
        faults: FaultChannel,
        telemetry: Telemetry,
    ) -> Result<Self, RuntimeError> {
        let (mut pipeline, text_tx) = Self::start_core(config, engine, &collaborators, faults, telemetry);

        let (audio_tx, audio_rx) = mpsc::channel(config.queue_capacity);
        let segmenter = SegmenterConfig::from(config);
        let frame_len = config.frame_len();
        let cancel = pipeline.cancel.clone();
        let faults = pipeline.faults.clone();
        let telemetry = pipeline.telemetry.clone();
        let AudioInput { source, detector } = input;

        let spawned = thread::Builder::new().name("voxgate-capture".into()).spawn(move || {
            run_capture(source, detector, segmenter, frame_len, audio_tx, cancel, faults, telemetry)
        });
        match spawned {
            Ok(handle) => pipeline.capture = Some(handle),
            Err(e) => {
                pipeline.cancel.cancel();
                return Err(RuntimeError::Spawn(e));
            }
        }

        let settings = TranscriptionSettings {
            queue_timeout: config.queue_timeout(),
            speaking_wait: config.speaking_wait(),
            speaking_poll: config.speaking_poll(),
            min_transcript_chars: config.min_transcript_chars,
        };
        let transcription = tokio::spawn(run_transcription(
            audio_rx,
            text_tx,
            collaborators.transcriber.clone(),
            pipeline.runtime.clone(),
            settings,
            pipeline.cancel.clone(),
            pipeline.faults.clone(),
        ));
        pipeline.tasks.push(("transcription", transcription));

        info!("Voice loop started");
        Ok(pipeline)
    }

    /// Decision stage only, fed by the returned sender. Used for typed input.
    pub fn start_text(
        config: &PipelineConfig,
        engine: DecisionEngine,
        collaborators: Collaborators,
        faults: FaultChannel,
        telemetry: Telemetry,
    ) -> (Self, mpsc::Sender<String>) {
        let pipeline = Self::start_core(config, engine, &collaborators, faults, telemetry);
        info!("Text loop started");
        pipeline
    }

    fn start_core(
        config: &PipelineConfig,
        engine: DecisionEngine,
        collaborators: &Collaborators,
        faults: FaultChannel,
        telemetry: Telemetry,
    ) -> (Self, mpsc::Sender<String>) {
        let cancel = CancellationToken::new();
        let FaultChannel { reporter, receiver } = faults;

        let (actor, runtime) = RuntimeActor::new(
            collaborators.speaker.clone(),
            cancel.clone(),
            reporter.clone(),
            telemetry.clone(),
        );
        let actor = tokio::spawn(actor.run());
        let fault_task = tokio::spawn(run_faults(receiver, telemetry.clone(), cancel.clone()));

        let (text_tx, text_rx) = mpsc::channel(config.queue_capacity);
        let decisions = tokio::spawn(run_decisions(
            text_rx,
            engine,
            collaborators.router.clone(),
            runtime.clone(),
            config.queue_timeout(),
            cancel.clone(),
            reporter.clone(),
        ));

        let pipeline = Self {
            runtime,
            cancel,
            faults: reporter,
            telemetry,
            join_timeout: config.join_timeout(),
            capture: None,
            decisions: Some(decisions),
            tasks: vec![("runtime", actor), ("faults", fault_task)],
        };
        (pipeline, text_tx)
    }

    pub fn runtime(&self) -> &RuntimeHandle {
        &self.runtime
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn faults(&self) -> &FaultReporter {
        &self.faults
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    /// Resolves when the decision stage has drained its input or the loop was
    /// cancelled (exit command, fatal fault, external cancel).
    pub async fn wait(&mut self) {
        let Some(task) = self.decisions.as_mut() else {
            return;
        };
        let finished = tokio::select! {
            result = task => {
                if let Err(e) = result {
                    warn!(error = %e, "Decision worker panicked");
                }
                true
            }
            () = self.cancel.cancelled() => false,
        };
        if finished {
            self.decisions = None;
        }
    }

    /// Cancels every stage and joins them, each bounded by the join timeout.
    /// Stragglers are logged and abandoned.
    pub async fn shutdown(mut self) -> TelemetrySnapshot {
        info!("Voice loop shutting down");
        if let Err(e) = self.runtime.stop_speaking().await {
            warn!(error = %e, "Could not stop speech before shutdown");
        }

        // Let the decision stage finish its current item before the actor goes away.
        if let Some(task) = self.decisions.take() {
            self.cancel.cancel();
            join_task("decisions", task, self.join_timeout).await;
        }
        self.cancel.cancel();

        for (name, task) in self.tasks.drain(..) {
            join_task(name, task, self.join_timeout).await;
        }

        if let Some(capture) = self.capture.take() {
            let joined = timeout(self.join_timeout, tokio::task::spawn_blocking(move || capture.join())).await;
            match joined {
                Ok(Ok(Ok(()))) => {}
                Ok(_) => warn!("Capture thread panicked"),
                Err(_) => warn!(timeout_ms = self.join_timeout.as_millis() as u64, "Capture thread did not stop in time"),
            }
        }

        info!("Voice loop stopped");
        self.telemetry.snapshot()
    }
}

async fn join_task(name: &str, task: JoinHandle<()>, limit: Duration) {
    match timeout(limit, task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(worker = name, error = %e, "Worker panicked"),
        Err(_) => warn!(worker = name, "Worker did not stop in time"),
    }
}
