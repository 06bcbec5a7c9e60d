//! Concrete collaborators: HTTP transcription and routing, `say` for speech.

pub mod router;
pub mod speaker;
pub mod transcriber;

pub use router::{DryRunRouter, HttpDecisionRouter};
pub use speaker::{ConsoleSpeaker, SayCommandSpeaker};
pub use transcriber::{encode_wav, HttpTranscriber};
