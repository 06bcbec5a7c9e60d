use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::collaborators::Speaker;
use crate::error::RuntimeError;
use crate::kernel::telemetry::{FaultReporter, Stage, Telemetry, TelemetryEvent};

const MAILBOX_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeStatus {
    pub running: bool,
    pub speaking: bool,
    pub pending_confirmation: bool,
    pub interrupted: bool,
}

enum Command {
    Speak(String),
    StopSpeaking,
    IsSpeaking(oneshot::Sender<bool>),
    SetPending(bool),
    IsPending(oneshot::Sender<bool>),
    Interrupt,
    TakeInterrupt(oneshot::Sender<bool>),
    Status(oneshot::Sender<RuntimeStatus>),
    Shutdown,
}

/// Sole owner of the live session state: speech output, the pending-confirmation
/// mirror and the interrupt flag. Workers reach it only through [`RuntimeHandle`].
pub struct RuntimeActor {
    rx: mpsc::Receiver<Command>,
    speaker: Arc<dyn Speaker>,
    cancel: CancellationToken,
    faults: FaultReporter,
    telemetry: Telemetry,
    running: bool,
    pending: bool,
    interrupted: bool,
}

impl RuntimeActor {
    pub fn new(
        speaker: Arc<dyn Speaker>,
        cancel: CancellationToken,
        faults: FaultReporter,
        telemetry: Telemetry,
    ) -> (Self, RuntimeHandle) {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let actor = Self {
            rx,
            speaker,
            cancel,
            faults,
            telemetry,
            running: true,
            pending: false,
            interrupted: false,
        };
        (actor, RuntimeHandle { tx })
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                () = self.cancel.cancelled() => break,
            }
        }
        self.running = false;
        debug!("Runtime actor stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Speak(text) => {
                if let Err(e) = self.speaker.speak(&text) {
                    self.faults.report(Stage::Speech, e.to_string());
                }
            }
            Command::StopSpeaking => self.speaker.stop(),
            Command::IsSpeaking(reply) => {
                let _ = reply.send(self.speaker.is_speaking());
            }
            Command::SetPending(pending) => self.pending = pending,
            Command::IsPending(reply) => {
                let _ = reply.send(self.pending);
            }
            Command::Interrupt => {
                self.interrupted = true;
                self.speaker.stop();
                self.telemetry.record(TelemetryEvent::Interruption);
                info!("Speech interrupted");
            }
            Command::TakeInterrupt(reply) => {
                let _ = reply.send(std::mem::take(&mut self.interrupted));
            }
            Command::Status(reply) => {
                let _ = reply.send(RuntimeStatus {
                    running: self.running,
                    speaking: self.speaker.is_speaking(),
                    pending_confirmation: self.pending,
                    interrupted: self.interrupted,
                });
            }
            Command::Shutdown => {
                info!("Runtime shutdown requested");
                self.running = false;
                self.cancel.cancel();
            }
        }
    }
}

/// Cloneable mailbox address of the [`RuntimeActor`].
#[derive(Clone)]
pub struct RuntimeHandle {
    tx: mpsc::Sender<Command>,
}

impl RuntimeHandle {
    async fn send(&self, command: Command) -> Result<(), RuntimeError> {
        self.tx.send(command).await.map_err(|_| RuntimeError::ActorClosed)
    }

    async fn ask<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, RuntimeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(command(reply_tx)).await?;
        reply_rx.await.map_err(|_| RuntimeError::ActorClosed)
    }

    pub async fn speak(&self, text: impl Into<String>) -> Result<(), RuntimeError> {
        self.send(Command::Speak(text.into())).await
    }

    pub async fn stop_speaking(&self) -> Result<(), RuntimeError> {
        self.send(Command::StopSpeaking).await
    }

    pub async fn is_speaking(&self) -> Result<bool, RuntimeError> {
        self.ask(Command::IsSpeaking).await
    }

    pub async fn set_pending(&self, pending: bool) -> Result<(), RuntimeError> {
        self.send(Command::SetPending(pending)).await
    }

    pub async fn is_pending(&self) -> Result<bool, RuntimeError> {
        self.ask(Command::IsPending).await
    }

    /// Stops current speech and raises the interrupt flag.
    pub async fn interrupt(&self) -> Result<(), RuntimeError> {
        self.send(Command::Interrupt).await
    }

    /// Reads and clears the interrupt flag.
    pub async fn take_interrupt(&self) -> Result<bool, RuntimeError> {
        self.ask(Command::TakeInterrupt).await
    }

    pub async fn status(&self) -> Result<RuntimeStatus, RuntimeError> {
        self.ask(Command::Status).await
    }

    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.send(Command::Shutdown).await
    }
}
