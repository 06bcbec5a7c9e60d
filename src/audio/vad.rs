use tracing::debug;
use webrtc_vad::{SampleRate, Vad, VadMode};

use crate::error::CaptureError;

/// Per-frame speech/non-speech classifier.
pub trait VoiceDetector {
    fn is_speech(&mut self, frame: &[i16]) -> bool;
}

/// Builds the detector on the capture thread. The webrtc handle is not `Send`, so
/// it has to be created where it is used.
pub type DetectorFactory = Box<dyn FnOnce() -> Result<Box<dyn VoiceDetector>, CaptureError> + Send>;

pub struct WebRtcDetector {
    vad: Vad,
}

impl WebRtcDetector {
    pub fn new(sample_rate: u32, aggressiveness: u8) -> Result<Self, CaptureError> {
        let rate = match sample_rate {
            8000 => SampleRate::Rate8kHz,
            16000 => SampleRate::Rate16kHz,
            32000 => SampleRate::Rate32kHz,
            48000 => SampleRate::Rate48kHz,
            other => return Err(CaptureError::UnsupportedSampleRate(other)),
        };
        let mode = match aggressiveness {
            0 => VadMode::Quality,
            1 => VadMode::LowBitrate,
            2 => VadMode::Aggressive,
            _ => VadMode::VeryAggressive,
        };
        Ok(Self {
            vad: Vad::new_with_rate_and_mode(rate, mode),
        })
    }

    pub fn factory(sample_rate: u32, aggressiveness: u8) -> DetectorFactory {
        Box::new(move || {
            let detector = Self::new(sample_rate, aggressiveness)?;
            Ok(Box::new(detector) as Box<dyn VoiceDetector>)
        })
    }
}

impl VoiceDetector for WebRtcDetector {
    fn is_speech(&mut self, frame: &[i16]) -> bool {
        match self.vad.is_voice_segment(frame) {
            Ok(speech) => speech,
            Err(()) => {
                // Wrong frame length for the configured rate.
                debug!(len = frame.len(), "VAD rejected frame");
                false
            }
        }
    }
}

/// RMS threshold detector. Works at any sample rate; used when webrtc is not an option.
#[derive(Debug, Clone)]
pub struct EnergyDetector {
    threshold_rms: f32,
}

impl Default for EnergyDetector {
    fn default() -> Self {
        Self { threshold_rms: 0.03 }
    }
}

impl EnergyDetector {
    pub fn new(threshold_rms: f32) -> Self {
        Self { threshold_rms }
    }

    pub fn factory(threshold_rms: f32) -> DetectorFactory {
        Box::new(move || Ok(Box::new(Self::new(threshold_rms)) as Box<dyn VoiceDetector>))
    }
}

impl VoiceDetector for EnergyDetector {
    fn is_speech(&mut self, frame: &[i16]) -> bool {
        if frame.is_empty() {
            return false;
        }
        let sq_sum: f32 = frame
            .iter()
            .map(|&s| {
                let x = s as f32 / i16::MAX as f32;
                x * x
            })
            .sum();
        let rms = (sq_sum / frame.len() as f32).sqrt();
        rms > self.threshold_rms
    }
}
