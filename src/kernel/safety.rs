use regex::Regex;
use tracing::{debug, warn};

use crate::kernel::intent::types::{Intent, IntentType, RiskLevel};
use crate::kernel::mode::Mode;

pub const DISABLED_REASON: &str = "Assistant is disabled";
pub const EXTREME_RISK_REASON: &str = "Operation blocked due to extreme risk";

/// Risk assigned when a danger pattern fires.
const ESCALATED_RISK: RiskLevel = RiskLevel::clamped(8);

pub const DEFAULT_DANGER_PATTERNS: &[&str] = &[
    r"\bdelete all\b",
    r"\bformat\b",
    r"\bremove system\b",
    r"\bshut ?down now\b",
    r"\bwipe\b",
    r"\ball files\b",
];

/// Baseline risk per intent type. Anything not listed is low risk.
pub fn policy_risk(intent_type: IntentType) -> RiskLevel {
    let risk = match intent_type {
        IntentType::FileOperation => 7,
        IntentType::SystemControl => 8,
        IntentType::CloseApp => 3,
        IntentType::OpenFile | IntentType::TypeText => 2,
        _ => 1,
    };
    RiskLevel::clamped(risk)
}

/// Risk scoring with a block/confirm policy.
///
/// `evaluate` only ever raises risk, so running it twice on the same intent
/// changes nothing the second time.
#[derive(Debug, Clone)]
pub struct SafetyEngine {
    confirm_threshold: RiskLevel,
    block_threshold: RiskLevel,
    danger_patterns: Vec<Regex>,
}

impl SafetyEngine {
    pub fn new<S: AsRef<str>>(
        confirm_threshold: RiskLevel,
        block_threshold: RiskLevel,
        danger_patterns: &[S],
    ) -> Result<Self, regex::Error> {
        let danger_patterns = danger_patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            confirm_threshold,
            block_threshold,
            danger_patterns,
        })
    }

    pub fn with_defaults() -> Result<Self, regex::Error> {
        Self::new(RiskLevel::clamped(6), RiskLevel::MAX, DEFAULT_DANGER_PATTERNS)
    }

    pub fn evaluate(&self, mut intent: Intent, current_mode: Mode) -> Intent {
        if current_mode == Mode::Disabled {
            intent.risk_level = RiskLevel::MAX;
            intent.blocked_reason = Some(DISABLED_REASON.to_string());
            return intent;
        }

        intent.risk_level = intent.risk_level.max(policy_risk(intent.intent_type));

        let utterance = intent.text.to_lowercase();
        let fired: Vec<&str> = self
            .danger_patterns
            .iter()
            .filter(|re| re.is_match(&utterance))
            .map(Regex::as_str)
            .collect();
        if !fired.is_empty() {
            intent.risk_level = intent.risk_level.max(ESCALATED_RISK);
            debug!(patterns = fired.len(), "Danger pattern escalation");
            intent.annotate("danger_patterns", fired);
        }

        if intent.risk_level >= self.block_threshold {
            warn!(risk = intent.risk_level.value(), action = %intent.action, "Blocking high-risk intent");
            if intent.blocked_reason.is_none() {
                intent.blocked_reason = Some(EXTREME_RISK_REASON.to_string());
            }
            intent.requires_confirmation = false;
            return intent;
        }

        if intent.risk_level >= self.confirm_threshold {
            intent.requires_confirmation = true;
        }

        intent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SafetyEngine {
        SafetyEngine::with_defaults().unwrap()
    }

    #[test]
    fn disabled_short_circuits() {
        let intent = engine().evaluate(Intent::new(IntentType::Search, "search cats"), Mode::Disabled);
        assert_eq!(intent.risk_level, RiskLevel::MAX);
        assert_eq!(intent.blocked_reason.as_deref(), Some(DISABLED_REASON));
    }

    #[test]
    fn never_lowers_parser_risk() {
        let intent = Intent::new(IntentType::OpenApp, "open x").with_risk(RiskLevel::clamped(5));
        let intent = engine().evaluate(intent, Mode::Listening);
        assert_eq!(intent.risk_level.value(), 5);
        assert!(!intent.requires_confirmation);
    }

    #[test]
    fn danger_pattern_escalates_to_confirmation() {
        let intent = engine().evaluate(Intent::new(IntentType::Unknown, "copy all files somewhere"), Mode::Command);
        assert_eq!(intent.risk_level.value(), 8);
        assert!(intent.requires_confirmation);
        assert!(intent.context.contains_key("danger_patterns"));
    }

    #[test]
    fn block_clears_confirmation() {
        let mut intent = Intent::new(IntentType::FileOperation, "delete all").with_risk(RiskLevel::MAX);
        intent.requires_confirmation = true;
        let intent = engine().evaluate(intent, Mode::Listening);
        assert!(intent.is_blocked());
        assert!(!intent.requires_confirmation);
    }

    #[test]
    fn bad_pattern_is_an_error() {
        assert!(SafetyEngine::new(RiskLevel::clamped(6), RiskLevel::MAX, &["(unclosed"]).is_err());
    }
}
