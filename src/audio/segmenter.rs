use tracing::debug;

use super::segment::SpeechSegment;
use crate::config::PipelineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmenterConfig {
    pub sample_rate: u32,
    /// Silence run that ends an utterance (strictly more than this many frames).
    pub max_silence_frames: usize,
    /// Utterances with this many speech frames or fewer are dropped as noise.
    pub min_speech_frames: usize,
    /// Utterance is cut here even if the speaker keeps going.
    pub max_segment_frames: usize,
}

impl From<&PipelineConfig> for SegmenterConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            max_silence_frames: config.max_silence_frames,
            min_speech_frames: config.min_speech_frames,
            max_segment_frames: config.max_segment_frames,
        }
    }
}

/// VAD endpointing over a stream of classified frames.
///
/// Speech frames are buffered; silence frames only advance the silence counter.
/// Pure state machine: no I/O, no clock.
#[derive(Debug)]
pub struct Segmenter {
    config: SegmenterConfig,
    buffer: Vec<i16>,
    speech_frames: usize,
    silence_frames: usize,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            buffer: Vec::new(),
            speech_frames: 0,
            silence_frames: 0,
        }
    }

    pub fn push(&mut self, frame: &[i16], is_speech: bool) -> Option<SpeechSegment> {
        if is_speech {
            self.buffer.extend_from_slice(frame);
            self.speech_frames += 1;
            self.silence_frames = 0;

            if self.speech_frames >= self.config.max_segment_frames {
                debug!(frames = self.speech_frames, "Segment hit length cap");
                return self.emit();
            }
            return None;
        }

        self.silence_frames += 1;
        if self.silence_frames <= self.config.max_silence_frames || self.speech_frames == 0 {
            return None;
        }

        if self.speech_frames > self.config.min_speech_frames {
            self.emit()
        } else {
            debug!(frames = self.speech_frames, "Discarding short burst");
            self.reset();
            None
        }
    }

    /// Emits whatever is buffered if it clears the speech floor. Used when input ends.
    pub fn flush(&mut self) -> Option<SpeechSegment> {
        if self.speech_frames > self.config.min_speech_frames {
            self.emit()
        } else {
            self.reset();
            None
        }
    }

    pub fn buffered_frames(&self) -> usize {
        self.speech_frames
    }

    fn emit(&mut self) -> Option<SpeechSegment> {
        let samples = std::mem::take(&mut self.buffer);
        let segment = SpeechSegment::new(samples, self.config.sample_rate, self.speech_frames);
        self.reset();
        Some(segment)
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.speech_frames = 0;
        self.silence_frames = 0;
    }
}
