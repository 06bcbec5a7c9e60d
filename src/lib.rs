pub mod audio;
pub mod config;
pub mod error;
pub mod kernel;
pub mod services;
pub mod voice;

pub use config::PipelineConfig;
pub use kernel::{Decision, DecisionEngine, DecisionPayload, DecisionStatus, Outcome};
pub use voice::VoiceLoop;
