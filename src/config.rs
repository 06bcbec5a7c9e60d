use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::audio::capture::VAD_RATES;
use crate::error::ConfigError;
use crate::kernel::intent::types::RiskLevel;
use crate::kernel::safety::DEFAULT_DANGER_PATTERNS;

const ENV_PREFIX: &str = "VOXGATE_";

/// Every tunable of the pipeline. Missing fields fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // Decision core
    pub confirmation_timeout_secs: u64,
    pub low_confidence_threshold: f32,
    pub confirm_risk_threshold: u8,
    pub block_risk_threshold: u8,
    pub max_history: usize,
    pub danger_patterns: Vec<String>,

    // Endpointing
    pub sample_rate: u32,
    pub frame_duration_ms: u32,
    pub vad_aggressiveness: u8,
    pub max_silence_frames: usize,
    pub min_speech_frames: usize,
    /// Hard cap on one utterance, in frames.
    pub max_segment_frames: usize,
    /// How long a microphone read may wait for samples before it counts as stalled.
    pub capture_stall_ms: u64,

    // Workers
    pub queue_capacity: usize,
    pub queue_timeout_ms: u64,
    pub speaking_wait_ms: u64,
    pub speaking_poll_ms: u64,
    pub min_transcript_chars: usize,
    pub join_timeout_ms: u64,

    // Collaborators
    pub router_url: Option<String>,
    pub transcriber_url: Option<String>,
    pub request_timeout_secs: u64,
    /// Voice passed to `say -v`.
    pub voice: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: 10,
            low_confidence_threshold: 0.4,
            confirm_risk_threshold: 6,
            block_risk_threshold: 9,
            max_history: 20,
            danger_patterns: DEFAULT_DANGER_PATTERNS.iter().map(|p| p.to_string()).collect(),
            sample_rate: 16_000,
            frame_duration_ms: 30,
            vad_aggressiveness: 2,
            max_silence_frames: 20,
            min_speech_frames: 8,
            max_segment_frames: 200,
            capture_stall_ms: 2_000,
            queue_capacity: 32,
            queue_timeout_ms: 500,
            speaking_wait_ms: 2_000,
            speaking_poll_ms: 100,
            min_transcript_chars: 2,
            join_timeout_ms: 2_000,
            router_url: None,
            transcriber_url: None,
            request_timeout_secs: 10,
            voice: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults, then the optional JSON file, then `VOXGATE_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                info!(path = %path.display(), "Loading config file");
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from `lookup`, keyed by the upper-cased field name with the
    /// `VOXGATE_` prefix (`VOXGATE_MAX_SILENCE_FRAMES`). `VOXGATE_DANGER_PATTERNS`
    /// takes a JSON array of regexes.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|value| (key, value))
        };

        override_parsed(get("CONFIRMATION_TIMEOUT_SECS"), &mut self.confirmation_timeout_secs)?;
        override_parsed(get("LOW_CONFIDENCE_THRESHOLD"), &mut self.low_confidence_threshold)?;
        override_parsed(get("CONFIRM_RISK_THRESHOLD"), &mut self.confirm_risk_threshold)?;
        override_parsed(get("BLOCK_RISK_THRESHOLD"), &mut self.block_risk_threshold)?;
        override_parsed(get("MAX_HISTORY"), &mut self.max_history)?;
        override_parsed(get("SAMPLE_RATE"), &mut self.sample_rate)?;
        override_parsed(get("FRAME_DURATION_MS"), &mut self.frame_duration_ms)?;
        override_parsed(get("VAD_AGGRESSIVENESS"), &mut self.vad_aggressiveness)?;
        override_parsed(get("MAX_SILENCE_FRAMES"), &mut self.max_silence_frames)?;
        override_parsed(get("MIN_SPEECH_FRAMES"), &mut self.min_speech_frames)?;
        override_parsed(get("MAX_SEGMENT_FRAMES"), &mut self.max_segment_frames)?;
        override_parsed(get("CAPTURE_STALL_MS"), &mut self.capture_stall_ms)?;
        override_parsed(get("QUEUE_CAPACITY"), &mut self.queue_capacity)?;
        override_parsed(get("QUEUE_TIMEOUT_MS"), &mut self.queue_timeout_ms)?;
        override_parsed(get("SPEAKING_WAIT_MS"), &mut self.speaking_wait_ms)?;
        override_parsed(get("SPEAKING_POLL_MS"), &mut self.speaking_poll_ms)?;
        override_parsed(get("MIN_TRANSCRIPT_CHARS"), &mut self.min_transcript_chars)?;
        override_parsed(get("JOIN_TIMEOUT_MS"), &mut self.join_timeout_ms)?;
        override_parsed(get("REQUEST_TIMEOUT_SECS"), &mut self.request_timeout_secs)?;

        if let Some((key, value)) = get("DANGER_PATTERNS") {
            debug!(key = %key, "Config override from environment");
            self.danger_patterns = serde_json::from_str(&value).map_err(|_| ConfigError::Env { key, value })?;
        }

        for (name, slot) in [
            ("ROUTER_URL", &mut self.router_url),
            ("TRANSCRIBER_URL", &mut self.transcriber_url),
            ("VOICE", &mut self.voice),
        ] {
            if let Some((key, value)) = get(name) {
                debug!(key = %key, "Config override from environment");
                *slot = Some(value).filter(|v| !v.is_empty());
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VAD_RATES.contains(&self.sample_rate) {
            return invalid(format!(
                "sample_rate must be 8000, 16000, 32000 or 48000, got {}",
                self.sample_rate
            ));
        }
        if ![10, 20, 30].contains(&self.frame_duration_ms) {
            return invalid(format!("frame_duration_ms must be 10, 20 or 30, got {}", self.frame_duration_ms));
        }
        if !(0.0..=1.0).contains(&self.low_confidence_threshold) {
            return invalid(format!(
                "low_confidence_threshold must be within 0.0-1.0, got {}",
                self.low_confidence_threshold
            ));
        }
        if self.block_risk_threshold > RiskLevel::MAX.value() {
            return invalid(format!("block_risk_threshold must be at most 9, got {}", self.block_risk_threshold));
        }
        if self.confirm_risk_threshold >= self.block_risk_threshold {
            return invalid("confirm_risk_threshold must be below block_risk_threshold".to_string());
        }
        if self.vad_aggressiveness > 3 {
            return invalid(format!("vad_aggressiveness must be 0-3, got {}", self.vad_aggressiveness));
        }
        if self.queue_capacity == 0 || self.max_history == 0 || self.max_segment_frames == 0 {
            return invalid("queue_capacity, max_history and max_segment_frames must be non-zero".to_string());
        }
        if self.max_segment_frames < self.min_speech_frames {
            return invalid("max_segment_frames must be at least min_speech_frames".to_string());
        }
        Ok(())
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    pub fn speaking_wait(&self) -> Duration {
        Duration::from_millis(self.speaking_wait_ms)
    }

    pub fn speaking_poll(&self) -> Duration {
        Duration::from_millis(self.speaking_poll_ms.max(1))
    }

    pub fn capture_stall_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_stall_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Samples in one VAD frame.
    pub fn frame_len(&self) -> usize {
        (self.sample_rate as usize * self.frame_duration_ms as usize) / 1000
    }

    pub fn confirm_threshold(&self) -> RiskLevel {
        RiskLevel::clamped(self.confirm_risk_threshold)
    }

    pub fn block_threshold(&self) -> RiskLevel {
        RiskLevel::clamped(self.block_risk_threshold)
    }
}

fn override_parsed<T: FromStr>(entry: Option<(String, String)>, slot: &mut T) -> Result<(), ConfigError> {
    let Some((key, value)) = entry else {
        return Ok(());
    };
    debug!(key = %key, "Config override from environment");
    *slot = value.trim().parse().map_err(|_| ConfigError::Env { key, value })?;
    Ok(())
}

fn invalid(message: String) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.frame_len(), 480);
        assert_eq!(config.confirmation_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"max_silence_frames": 12}"#).unwrap();
        assert_eq!(config.max_silence_frames, 12);
        assert_eq!(config.min_speech_frames, 8);
    }

    #[test]
    fn env_overrides_and_rejects_garbage() {
        let vars: HashMap<&str, &str> = [
            ("VOXGATE_MAX_SILENCE_FRAMES", "15"),
            ("VOXGATE_ROUTER_URL", "http://localhost:9000/route"),
        ]
        .into_iter()
        .collect();
        let mut config = PipelineConfig::default();
        config.apply_env(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.max_silence_frames, 15);
        assert_eq!(config.router_url.as_deref(), Some("http://localhost:9000/route"));

        let err = config
            .apply_env(|k| (k == "VOXGATE_QUEUE_CAPACITY").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn env_covers_polling_stall_and_danger_patterns() {
        let vars: HashMap<&str, &str> = [
            ("VOXGATE_SPEAKING_POLL_MS", "25"),
            ("VOXGATE_CAPTURE_STALL_MS", "750"),
            ("VOXGATE_DANGER_PATTERNS", r#"["\\bnuke\\b", "\\bdrop table\\b"]"#),
        ]
        .into_iter()
        .collect();
        let mut config = PipelineConfig::default();
        config.apply_env(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.speaking_poll(), Duration::from_millis(25));
        assert_eq!(config.capture_stall_timeout(), Duration::from_millis(750));
        assert_eq!(config.danger_patterns, vec![r"\bnuke\b".to_string(), r"\bdrop table\b".to_string()]);

        let err = config
            .apply_env(|k| (k == "VOXGATE_DANGER_PATTERNS").then(|| "wipe".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn validate_rejects_rates_the_detector_cannot_use() {
        let config = PipelineConfig {
            sample_rate: 44_100,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        for sample_rate in VAD_RATES {
            let config = PipelineConfig {
                sample_rate,
                ..PipelineConfig::default()
            };
            config.validate().unwrap();
        }
    }

    #[test]
    fn validate_rejects_inverted_thresholds() {
        let config = PipelineConfig {
            confirm_risk_threshold: 9,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            frame_duration_ms: 25,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
