pub mod capture;
pub mod segment;
pub mod segmenter;
pub mod vad;

pub use capture::{AudioSource, MicrophoneCapture, RingBufferSource};
pub use segment::SpeechSegment;
pub use segmenter::{Segmenter, SegmenterConfig};
pub use vad::{DetectorFactory, EnergyDetector, VoiceDetector, WebRtcDetector};
