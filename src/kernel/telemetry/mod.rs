//! Decision-pipeline telemetry and the fault sink.
//!
//! # PRIVACY INVARIANT
//! Telemetry events must **NEVER** contain user content (utterance text, targets, audio).
//! Only enums, counts and durations are allowed.
//!
//! Telemetry is a read-only side channel. Decision logic never reads it back.

pub mod event;
pub mod fault;
pub mod metrics;
pub mod recorder;

pub use event::TelemetryEvent;
pub use fault::{Fault, FaultReporter, Stage};
pub use metrics::TelemetrySnapshot;
pub use recorder::{Telemetry, TelemetryRecorder};
