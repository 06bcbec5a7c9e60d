use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Where in the pipeline a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Capture,
    Transcription,
    Decision,
    Router,
    Speech,
    ModeCallback,
    Runtime,
}

#[derive(Debug, Clone)]
pub struct Fault {
    pub stage: Stage,
    pub error: String,
    /// Fatal faults stop the whole runtime.
    pub fatal: bool,
}

/// The single error-reporting sink.
///
/// Every reported fault is logged immediately. When connected, it is also forwarded
/// to whoever owns the receiving end (the voice loop's fault task).
#[derive(Debug, Clone, Default)]
pub struct FaultReporter {
    tx: Option<mpsc::UnboundedSender<Fault>>,
}

impl FaultReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Fault>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Log-only reporter.
    pub fn detached() -> Self {
        Self { tx: None }
    }

    pub fn report(&self, stage: Stage, error: impl Into<String>) {
        self.send(Fault { stage, error: error.into(), fatal: false });
    }

    pub fn report_fatal(&self, stage: Stage, error: impl Into<String>) {
        self.send(Fault { stage, error: error.into(), fatal: true });
    }

    fn send(&self, fault: Fault) {
        if fault.fatal {
            error!(stage = ?fault.stage, error = %fault.error, "Fatal pipeline fault");
        } else {
            warn!(stage = ?fault.stage, error = %fault.error, "Pipeline fault");
        }
        if let Some(tx) = &self.tx {
            // Receiver gone means we are shutting down; the log line above is enough.
            let _ = tx.send(fault);
        }
    }
}
