use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use voxgate::audio::{AudioSource, EnergyDetector};
use voxgate::config::PipelineConfig;
use voxgate::error::{CaptureError, RouterError, SpeechError, TranscriptionError};
use voxgate::kernel::decision::{DecisionPayload, RouterResponse};
use voxgate::kernel::telemetry::{Stage, Telemetry};
use voxgate::kernel::time::SystemClock;
use voxgate::kernel::DecisionEngine;
use voxgate::voice::{AudioInput, Collaborators, DecisionRouter, FaultChannel, Speaker, Transcriber, VoiceLoop};

const FRAME: usize = 480;

/// Plays back a fixed frame list, then fails with `end`.
struct ScriptedSource {
    frames: VecDeque<Vec<i16>>,
    end: Option<CaptureError>,
}

impl ScriptedSource {
    /// One utterance per entry: speech frames followed by enough silence to close it.
    fn utterances(count: usize) -> Self {
        let mut frames = VecDeque::new();
        for _ in 0..count {
            frames.extend(std::iter::repeat(vec![8_000i16; FRAME]).take(20));
            frames.extend(std::iter::repeat(vec![0i16; FRAME]).take(25));
        }
        Self { frames, end: None }
    }

    fn failing(error: CaptureError) -> Self {
        Self { frames: VecDeque::new(), end: Some(error) }
    }
}

impl AudioSource for ScriptedSource {
    fn sample_rate(&self) -> u32 {
        16_000
    }

    fn read_frame(&mut self, frame: &mut [i16]) -> Result<(), CaptureError> {
        match self.frames.pop_front() {
            Some(next) => {
                frame.copy_from_slice(&next);
                Ok(())
            }
            None => Err(self.end.take().unwrap_or(CaptureError::Exhausted)),
        }
    }
}

struct CannedTranscriber {
    replies: Mutex<VecDeque<Result<String, TranscriptionError>>>,
    calls: Mutex<Vec<Instant>>,
}

impl CannedTranscriber {
    fn new(replies: Vec<Result<&str, &str>>) -> Arc<Self> {
        let replies = replies
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(|e| TranscriptionError::Unavailable(e.to_string())))
            .collect();
        Arc::new(Self {
            replies: Mutex::new(replies),
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Transcriber for CannedTranscriber {
    async fn transcribe(&self, _samples: &[i16], _sample_rate: u32) -> Result<String, TranscriptionError> {
        self.calls.lock().unwrap().push(Instant::now());
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| Ok(String::new()))
    }
}

#[derive(Default)]
struct RecordingRouter {
    payloads: Mutex<Vec<DecisionPayload>>,
}

#[async_trait]
impl DecisionRouter for RecordingRouter {
    async fn route(&self, payload: &DecisionPayload) -> Result<RouterResponse, RouterError> {
        self.payloads.lock().unwrap().push(payload.clone());
        let target = payload.target.clone().unwrap_or_default();
        Ok(RouterResponse::ok(format!("Done with {target}")))
    }
}

/// Records what it says. Reports itself as speaking until `speaking_until`.
#[derive(Default)]
struct RecordingSpeaker {
    spoken: Mutex<Vec<String>>,
    speaking_until: Option<Instant>,
}

impl Speaker for RecordingSpeaker {
    fn speak(&self, text: &str) -> Result<(), SpeechError> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn is_speaking(&self) -> bool {
        self.speaking_until.is_some_and(|until| Instant::now() < until)
    }

    fn stop(&self) {}
}

struct Harness {
    router: Arc<RecordingRouter>,
    speaker: Arc<RecordingSpeaker>,
}

impl Harness {
    fn new() -> Self {
        Self {
            router: Arc::new(RecordingRouter::default()),
            speaker: Arc::new(RecordingSpeaker::default()),
        }
    }

    fn speaking_until(until: Instant) -> Self {
        Self {
            router: Arc::new(RecordingRouter::default()),
            speaker: Arc::new(RecordingSpeaker {
                speaking_until: Some(until),
                ..RecordingSpeaker::default()
            }),
        }
    }

    fn collaborators(&self, transcriber: Arc<CannedTranscriber>) -> Collaborators {
        Collaborators {
            transcriber,
            router: self.router.clone(),
            speaker: self.speaker.clone(),
        }
    }

    fn start(&self, source: ScriptedSource, transcriber: Arc<CannedTranscriber>) -> VoiceLoop {
        self.start_with(test_config(), source, transcriber)
    }

    fn start_with(&self, config: PipelineConfig, source: ScriptedSource, transcriber: Arc<CannedTranscriber>) -> VoiceLoop {
        let faults = FaultChannel::new();
        let telemetry = Telemetry::new();
        let engine =
            DecisionEngine::from_config(&config, Arc::new(SystemClock), telemetry.clone(), faults.reporter.clone()).unwrap();
        let input = AudioInput {
            source: Box::new(source),
            detector: EnergyDetector::factory(0.03),
        };
        VoiceLoop::start(&config, engine, input, self.collaborators(transcriber), faults, telemetry).unwrap()
    }

    fn spoken(&self) -> Vec<String> {
        self.speaker.spoken.lock().unwrap().clone()
    }

    fn payloads(&self) -> Vec<DecisionPayload> {
        self.router.payloads.lock().unwrap().clone()
    }
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        queue_timeout_ms: 50,
        join_timeout_ms: 1_000,
        ..PipelineConfig::default()
    }
}

async fn run_to_end(mut voice: VoiceLoop) -> voxgate::kernel::telemetry::TelemetrySnapshot {
    tokio::time::timeout(Duration::from_secs(10), voice.wait())
        .await
        .expect("pipeline did not drain");
    voice.shutdown().await
}

#[tokio::test]
async fn test_spoken_confirmation_round_trip() {
    let harness = Harness::new();
    let transcriber = CannedTranscriber::new(vec![Ok("delete report.pdf"), Ok("yes")]);
    let voice = harness.start(ScriptedSource::utterances(2), transcriber);

    let snapshot = run_to_end(voice).await;

    let payloads = harness.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].action.as_deref(), Some("FILE_OPERATION"));
    assert_eq!(payloads[0].target.as_deref(), Some("report.pdf"));
    assert!(payloads[0].confirmed);

    assert_eq!(
        harness.spoken(),
        vec![
            "Do you want me to delete report.pdf? Say yes or no.".to_string(),
            "Done with report.pdf".to_string(),
        ]
    );
    assert_eq!(snapshot.segments_emitted, 2);
    assert_eq!(snapshot.decision_stats.needs_confirmation, 1);
    assert_eq!(snapshot.decision_stats.approved, 1);
}

#[tokio::test]
async fn test_transcription_failure_is_not_fatal() {
    let harness = Harness::new();
    let transcriber = CannedTranscriber::new(vec![Err("model offline"), Ok("open chrome")]);
    let mut voice = harness.start(ScriptedSource::utterances(2), transcriber);

    tokio::time::timeout(Duration::from_secs(10), voice.wait()).await.unwrap();
    assert!(!voice.cancel_token().is_cancelled(), "a failed transcription must not stop the loop");
    let snapshot = voice.shutdown().await;

    let payloads = harness.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].action.as_deref(), Some("OPEN_APP"));
    assert_eq!(snapshot.faults.get(&Stage::Transcription), Some(&1));
    assert_eq!(snapshot.fatal_faults, 0);
}

#[tokio::test]
async fn test_capture_failure_stops_runtime() {
    let harness = Harness::new();
    let transcriber = CannedTranscriber::new(vec![]);
    let mut voice = harness.start(ScriptedSource::failing(CaptureError::Stream("device unplugged".into())), transcriber);
    let cancel = voice.cancel_token();

    tokio::time::timeout(Duration::from_secs(5), cancel.cancelled())
        .await
        .expect("capture failure should cancel the loop");
    voice.wait().await;
    let snapshot = voice.shutdown().await;

    assert_eq!(snapshot.fatal_faults, 1);
    assert_eq!(snapshot.faults.get(&Stage::Capture), Some(&1));
    assert!(harness.payloads().is_empty());
}

#[tokio::test]
async fn test_exit_command_says_goodbye_and_cancels() {
    let harness = Harness::new();
    let transcriber = CannedTranscriber::new(vec![Ok("exit"), Ok("open chrome")]);
    let voice = harness.start(ScriptedSource::utterances(2), transcriber);
    let cancel = voice.cancel_token();

    run_to_end(voice).await;

    assert!(cancel.is_cancelled());
    assert_eq!(harness.spoken().first().map(String::as_str), Some("Goodbye."));
    assert!(harness.payloads().iter().all(|p| p.action.as_deref() != Some("OPEN_APP")));
}

#[tokio::test]
async fn test_text_loop_stop_cancels_pending_confirmation() {
    let harness = Harness::new();
    let config = test_config();
    let faults = FaultChannel::new();
    let telemetry = Telemetry::new();
    let engine =
        DecisionEngine::from_config(&config, Arc::new(SystemClock), telemetry.clone(), faults.reporter.clone()).unwrap();
    let (mut voice, text_tx) = VoiceLoop::start_text(
        &config,
        engine,
        harness.collaborators(CannedTranscriber::new(vec![])),
        faults,
        telemetry,
    );

    for line in ["delete report.pdf", "stop", "yes"] {
        text_tx.send(line.to_string()).await.unwrap();
    }
    drop(text_tx);

    tokio::time::timeout(Duration::from_secs(5), voice.wait()).await.unwrap();
    let status = voice.runtime().status().await.unwrap();
    assert!(!status.pending_confirmation);
    // "yes" after the stop is ordinary input and ends the interruption.
    assert!(!status.interrupted);
    let snapshot = voice.shutdown().await;

    assert!(harness.payloads().is_empty(), "cancelled delete must never reach the router");
    let spoken = harness.spoken();
    assert_eq!(spoken.len(), 2);
    assert_eq!(spoken[1], "Action cancelled");
    assert_eq!(snapshot.interruptions, 1);
}

#[tokio::test]
async fn test_interrupt_flag_clears_on_next_command() {
    let harness = Harness::new();
    let config = test_config();
    let faults = FaultChannel::new();
    let telemetry = Telemetry::new();
    let engine =
        DecisionEngine::from_config(&config, Arc::new(SystemClock), telemetry.clone(), faults.reporter.clone()).unwrap();
    let (mut voice, text_tx) = VoiceLoop::start_text(
        &config,
        engine,
        harness.collaborators(CannedTranscriber::new(vec![])),
        faults,
        telemetry,
    );

    text_tx.send("stop".to_string()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while !voice.runtime().status().await.unwrap().interrupted {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stop should raise the interrupt flag");

    for line in ["open chrome", "what time is it"] {
        text_tx.send(line.to_string()).await.unwrap();
    }
    drop(text_tx);

    tokio::time::timeout(Duration::from_secs(5), voice.wait()).await.unwrap();
    assert!(!voice.runtime().status().await.unwrap().interrupted);
    let snapshot = voice.shutdown().await;

    assert_eq!(snapshot.interruptions, 1);
    assert_eq!(harness.payloads().len(), 2);
}

#[tokio::test]
async fn test_transcription_waits_for_speech_to_end() {
    let started = Instant::now();
    let harness = Harness::speaking_until(started + Duration::from_millis(400));
    let transcriber = CannedTranscriber::new(vec![Ok("open chrome")]);
    let config = PipelineConfig {
        speaking_wait_ms: 5_000,
        speaking_poll_ms: 20,
        ..test_config()
    };
    let voice = harness.start_with(config, ScriptedSource::utterances(1), transcriber.clone());

    run_to_end(voice).await;

    let calls = transcriber.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    let waited = calls[0] - started;
    assert!(waited >= Duration::from_millis(400), "transcribed while still speaking: {waited:?}");
    assert!(waited < Duration::from_secs(4), "kept waiting after speech ended: {waited:?}");
    assert_eq!(harness.payloads().len(), 1);
}

#[tokio::test]
async fn test_speaking_wait_is_bounded() {
    let started = Instant::now();
    let harness = Harness::speaking_until(started + Duration::from_secs(3_600));
    let transcriber = CannedTranscriber::new(vec![Ok("open chrome")]);
    let config = PipelineConfig {
        speaking_wait_ms: 300,
        speaking_poll_ms: 20,
        ..test_config()
    };
    let voice = harness.start_with(config, ScriptedSource::utterances(1), transcriber.clone());

    run_to_end(voice).await;

    let calls = transcriber.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1, "transcription must proceed once the wait runs out");
    assert!(calls[0] - started >= Duration::from_millis(300));
    assert_eq!(harness.payloads().len(), 1);
}
