use serde::{Deserialize, Serialize};

use crate::kernel::decision::DecisionStatus;
use crate::kernel::mode::Mode;
use super::fault::Stage;

// Allowed: enums, durations, counts
// Forbidden: utterance text, targets, audio frames

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TelemetryEvent {
    Decision {
        status: DecisionStatus,
        latency_us: u64,
        /// Produced by resolving a pending confirmation rather than a fresh parse.
        from_confirmation: bool,
    },

    ModeTransition {
        from: Mode,
        to: Mode,
    },

    Confirmation(ConfirmationEvent),

    SegmentEmitted {
        frames: usize,
    },

    Interruption,

    Fault {
        stage: Stage,
        fatal: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationEvent {
    Requested,
    Approved,
    Denied,
    Reprompted,
    Expired,
    /// A new request replaced one that was still pending.
    Superseded,
}
