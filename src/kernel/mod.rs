pub mod confirmation;
pub mod decision;
pub mod engine;
pub mod intent;
pub mod memory;
pub mod mode;
pub mod safety;
pub mod telemetry;
pub mod time;

pub use decision::{Decision, DecisionPayload, DecisionStatus, Outcome, RouterResponse};
pub use engine::{DecisionEngine, EngineParts};
pub use mode::{Mode, ModeManager};
