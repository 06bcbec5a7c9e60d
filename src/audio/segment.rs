use std::time::Duration;
use uuid::Uuid;

/// One endpointed utterance: the speech frames between two silences, joined.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechSegment {
    pub id: Uuid,
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    /// Speech frames that went into the segment.
    pub frames: usize,
}

impl SpeechSegment {
    pub fn new(samples: Vec<i16>, sample_rate: u32, frames: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            samples,
            sample_rate,
            frames,
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}
