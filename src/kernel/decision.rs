use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::kernel::intent::types::Intent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    Approved,
    Blocked,
    NeedsConfirmation,
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DecisionStatus::Approved => "APPROVED",
            DecisionStatus::Blocked => "BLOCKED",
            DecisionStatus::NeedsConfirmation => "NEEDS_CONFIRMATION",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// Set by the safety engine (disabled assistant, extreme risk).
    Policy(String),
    LowConfidence,
    Denied,
    TimedOut,
}

impl BlockReason {
    pub fn message(&self) -> &str {
        match self {
            BlockReason::Policy(reason) => reason,
            BlockReason::LowConfidence => "Low confidence input",
            BlockReason::Denied => "Action cancelled",
            BlockReason::TimedOut => "Confirmation timed out",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Approved { intent: Intent, confirmed: bool },
    Blocked { reason: BlockReason, intent: Option<Intent> },
    NeedsConfirmation { intent: Intent, prompt: String },
}

/// The verdict on one utterance, or on one confirmation reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub outcome: Outcome,
    pub latency: Duration,
}

impl Decision {
    pub fn status(&self) -> DecisionStatus {
        match self.outcome {
            Outcome::Approved { .. } => DecisionStatus::Approved,
            Outcome::Blocked { .. } => DecisionStatus::Blocked,
            Outcome::NeedsConfirmation { .. } => DecisionStatus::NeedsConfirmation,
        }
    }

    pub fn intent(&self) -> Option<&Intent> {
        match &self.outcome {
            Outcome::Approved { intent, .. } | Outcome::NeedsConfirmation { intent, .. } => Some(intent),
            Outcome::Blocked { intent, .. } => intent.as_ref(),
        }
    }

    /// Human-readable reason or prompt.
    pub fn message(&self) -> &str {
        match &self.outcome {
            Outcome::Approved { .. } => "Action approved",
            Outcome::Blocked { reason, .. } => reason.message(),
            Outcome::NeedsConfirmation { prompt, .. } => prompt,
        }
    }

    /// Low-confidence noise is dropped without a word.
    pub fn is_silent(&self) -> bool {
        matches!(
            self.outcome,
            Outcome::Blocked {
                reason: BlockReason::LowConfidence,
                ..
            }
        )
    }

    pub fn payload(&self) -> DecisionPayload {
        let intent = self.intent();
        DecisionPayload {
            status: self.status(),
            action: intent.map(|i| i.action.clone()),
            target: intent.and_then(|i| i.target.clone()),
            parameters: intent.map(|i| i.parameters.clone()).unwrap_or_default(),
            risk_level: intent.map(|i| i.risk_level.value()),
            requires_confirmation: intent.map(|i| i.requires_confirmation),
            blocked_reason: match &self.outcome {
                Outcome::Blocked { reason, .. } => Some(reason.message().to_string()),
                _ => None,
            },
            confirmed: matches!(self.outcome, Outcome::Approved { confirmed: true, .. }),
        }
    }
}

/// What the decision router receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionPayload {
    pub status: DecisionStatus,
    pub action: Option<String>,
    pub target: Option<String>,
    pub parameters: HashMap<String, String>,
    pub risk_level: Option<u8>,
    pub requires_confirmation: Option<bool>,
    pub blocked_reason: Option<String>,
    pub confirmed: bool,
}

/// What the decision router answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterResponse {
    pub success: bool,
    #[serde(default)]
    pub spoken_message: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl RouterResponse {
    pub fn ok(spoken_message: impl Into<String>) -> Self {
        Self {
            success: true,
            spoken_message: spoken_message.into(),
            error_code: None,
            category: None,
        }
    }

    pub fn failed(error_code: &str, spoken_message: impl Into<String>) -> Self {
        Self {
            success: false,
            spoken_message: spoken_message.into(),
            error_code: Some(error_code.to_string()),
            category: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::intent::types::IntentType;

    #[test]
    fn payload_marks_confirmed_approvals() {
        let intent = Intent::new(IntentType::FileOperation, "delete a.txt")
            .with_target(Some("a.txt".into()))
            .with_param("operation", "delete");
        let decision = Decision {
            outcome: Outcome::Approved { intent, confirmed: true },
            latency: Duration::from_millis(3),
        };
        let payload = decision.payload();
        assert_eq!(payload.status, DecisionStatus::Approved);
        assert_eq!(payload.action.as_deref(), Some("FILE_OPERATION"));
        assert!(payload.confirmed);
        assert_eq!(payload.blocked_reason, None);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "APPROVED");
        assert_eq!(json["parameters"]["operation"], "delete");
    }

    #[test]
    fn low_confidence_is_silent() {
        let decision = Decision {
            outcome: Outcome::Blocked { reason: BlockReason::LowConfidence, intent: None },
            latency: Duration::ZERO,
        };
        assert!(decision.is_silent());
        assert_eq!(decision.message(), "Low confidence input");
        assert_eq!(decision.payload().action, None);
    }

    #[test]
    fn router_response_tolerates_missing_fields() {
        let response: RouterResponse = serde_json::from_str(r#"{"success": false, "error_code": "E_APP"}"#).unwrap();
        assert!(!response.success);
        assert_eq!(response.spoken_message, "");
        assert_eq!(response.error_code.as_deref(), Some("E_APP"));
    }
}
