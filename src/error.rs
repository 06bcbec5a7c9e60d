use thiserror::Error;

use crate::kernel::mode::Mode;

/// Construction-time invariant violations on the intent schema.
/// These are programming errors, never a runtime condition to recover from.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("confidence must be between 0.0 and 1.0, got {0}")]
    ConfidenceOutOfRange(f32),
    #[error("risk level must be between 0 and 9, got {0}")]
    RiskOutOfRange(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("already in {0:?} mode")]
    SelfTransition(Mode),
    #[error("no transition from {from:?} to {to:?}")]
    InvalidTransition { from: Mode, to: Mode },
}

/// Returned by mode-change callbacks. Reported to the fault sink, never propagated.
#[derive(Debug, Clone, Error)]
#[error("mode callback failed: {0}")]
pub struct CallbackError(pub String);

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device available")]
    NoInputDevice,
    #[error("unsupported sample rate {0} Hz (VAD needs 8k, 16k, 32k or 48k)")]
    UnsupportedSampleRate(u32),
    #[error("unsupported sample format")]
    UnsupportedFormat,
    #[error("audio stream failed: {0}")]
    Stream(String),
    #[error("audio source exhausted")]
    Exhausted,
    #[error("audio device error: {0}")]
    Device(String),
}

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("transcription request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("could not encode audio: {0}")]
    Encode(#[from] hound::Error),
    #[error("transcriber returned {0}")]
    Status(reqwest::StatusCode),
    #[error("transcriber unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("router request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("router returned {0}")]
    Status(reqwest::StatusCode),
    #[error("router unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("failed to spawn speech process: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {key}: {value}")]
    Env { key: String, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("invalid danger pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime actor is gone")]
    ActorClosed,
    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),
}
