//! The live voice loop: staged workers around the decision engine, plus the
//! runtime actor that owns speech and session flags.

pub mod collaborators;
pub mod pipeline;
pub mod runtime;
pub mod workers;

pub use collaborators::{Collaborators, DecisionRouter, Speaker, Transcriber};
pub use pipeline::{AudioInput, FaultChannel, VoiceLoop};
pub use runtime::{RuntimeActor, RuntimeHandle, RuntimeStatus};
pub use workers::{classify_interrupt, Interrupt};
