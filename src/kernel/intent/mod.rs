pub mod normalize;
pub mod parser;
pub mod types;

pub use parser::IntentParser;
pub use types::{Confidence, ConfidenceSource, Entity, EntityKind, Intent, IntentCategory, IntentType, RiskLevel};
