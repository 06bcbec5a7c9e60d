use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::SpeechError;
use crate::voice::Speaker;

/// Speaks through the macOS `say` command, one utterance at a time.
///
/// A new utterance kills the previous one. Must be used inside a tokio runtime.
pub struct SayCommandSpeaker {
    program: String,
    voice: Option<String>,
    speaking: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    current: Mutex<Option<oneshot::Sender<()>>>,
}

impl SayCommandSpeaker {
    pub fn new(voice: Option<String>) -> Self {
        Self::with_program("say", voice)
    }

    pub fn with_program(program: impl Into<String>, voice: Option<String>) -> Self {
        Self {
            program: program.into(),
            voice,
            speaking: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            current: Mutex::new(None),
        }
    }
}

impl Speaker for SayCommandSpeaker {
    fn speak(&self, text: &str) -> Result<(), SpeechError> {
        self.stop();

        let mut command = Command::new(&self.program);
        if let Some(voice) = &self.voice {
            command.arg("-v").arg(voice);
        }
        let mut child = command.arg(text).kill_on_drop(true).spawn()?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.speaking.store(true, Ordering::SeqCst);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(stop_tx);

        let speaking = self.speaking.clone();
        let latest = self.generation.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = child.wait() => {}
                _ = &mut stop_rx => {
                    let _ = child.kill().await;
                }
            }
            // A newer utterance owns the flag now.
            if latest.load(Ordering::SeqCst) == generation {
                speaking.store(false, Ordering::SeqCst);
            }
            debug!(generation, "Utterance finished");
        });
        Ok(())
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        if let Some(stop_tx) = self.current.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = stop_tx.send(());
        }
        self.speaking.store(false, Ordering::SeqCst);
    }
}

/// Prints instead of speaking. Never reports itself as speaking.
#[derive(Debug, Clone, Default)]
pub struct ConsoleSpeaker;

impl Speaker for ConsoleSpeaker {
    fn speak(&self, text: &str) -> Result<(), SpeechError> {
        println!("voxgate> {text}");
        Ok(())
    }

    fn is_speaking(&self) -> bool {
        false
    }

    fn stop(&self) {}
}
