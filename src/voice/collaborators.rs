use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{RouterError, SpeechError, TranscriptionError};
use crate::kernel::decision::{DecisionPayload, RouterResponse};

/// Speech-to-text. An empty string means nothing worth keeping was heard.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, samples: &[i16], sample_rate: u32) -> Result<String, TranscriptionError>;
}

/// Executes approved decisions (apps, files, vision, knowledge) and says what happened.
#[async_trait]
pub trait DecisionRouter: Send + Sync {
    async fn route(&self, payload: &DecisionPayload) -> Result<RouterResponse, RouterError>;
}

/// Text-to-speech. `speak` returns as soon as playback has started.
pub trait Speaker: Send + Sync {
    fn speak(&self, text: &str) -> Result<(), SpeechError>;
    fn is_speaking(&self) -> bool;
    /// Best-effort interruption of the current utterance.
    fn stop(&self);
}

/// The external pieces the voice loop drives.
#[derive(Clone)]
pub struct Collaborators {
    pub transcriber: Arc<dyn Transcriber>,
    pub router: Arc<dyn DecisionRouter>,
    pub speaker: Arc<dyn Speaker>,
}
