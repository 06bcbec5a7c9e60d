use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::SchemaError;
use crate::kernel::mode::Mode;

/// Closed set of things an utterance can mean.
/// The wire name (SCREAMING_SNAKE_CASE) doubles as the router action for most types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentType {
    OpenApp,
    CloseApp,
    OpenFile,
    Search,
    TypeText,
    FileOperation,
    SystemControl,
    Vision,
    UiAutomation,
    GetTime,
    Question,
    Dictation,
    Control,
    Unknown,
}

impl IntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::OpenApp => "OPEN_APP",
            IntentType::CloseApp => "CLOSE_APP",
            IntentType::OpenFile => "OPEN_FILE",
            IntentType::Search => "SEARCH",
            IntentType::TypeText => "TYPE_TEXT",
            IntentType::FileOperation => "FILE_OPERATION",
            IntentType::SystemControl => "SYSTEM_CONTROL",
            IntentType::Vision => "VISION",
            IntentType::UiAutomation => "UI_AUTOMATION",
            IntentType::GetTime => "GET_TIME",
            IntentType::Question => "QUESTION",
            IntentType::Dictation => "DICTATION",
            IntentType::Control => "CONTROL",
            IntentType::Unknown => "UNKNOWN",
        }
    }

    /// Coarse category used by the mode permission table.
    pub fn category(&self) -> IntentCategory {
        match self {
            IntentType::Control => IntentCategory::Control,
            IntentType::Dictation => IntentCategory::Dictation,
            IntentType::Question | IntentType::GetTime | IntentType::Unknown => IntentCategory::Question,
            _ => IntentCategory::Command,
        }
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentCategory {
    Command,
    Control,
    Dictation,
    Question,
}

/// Which parser layer produced the classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceSource {
    Keyword,
    Regex,
    Fallback,
    Context,
}

/// Certainty of a classification. Always within 0.0 - 1.0.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Confidence(f32);

impl Confidence {
    pub fn new(value: f32) -> Result<Self, SchemaError> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(SchemaError::ConfidenceOutOfRange(value))
        }
    }

    /// Clamps into range. NaN collapses to zero.
    pub fn saturating(value: f32) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

impl TryFrom<f32> for Confidence {
    type Error = SchemaError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f32 {
    fn from(c: Confidence) -> Self {
        c.0
    }
}

/// Severity score driving the block/confirm policy. Bounded to 0 - 9 everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct RiskLevel(u8);

impl RiskLevel {
    pub const NONE: RiskLevel = RiskLevel(0);
    pub const LOW: RiskLevel = RiskLevel(1);
    pub const MAX: RiskLevel = RiskLevel(9);

    pub fn new(value: u8) -> Result<Self, SchemaError> {
        if value <= Self::MAX.0 {
            Ok(Self(value))
        } else {
            Err(SchemaError::RiskOutOfRange(value))
        }
    }

    pub const fn clamped(value: u8) -> Self {
        if value > Self::MAX.0 {
            Self::MAX
        } else {
            Self(value)
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for RiskLevel {
    type Error = SchemaError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RiskLevel> for u8 {
    fn from(r: RiskLevel) -> Self {
        r.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Keyword,
    Regex,
    Context,
}

/// A sub-value pulled out of the utterance (app name, file, index...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub value: String,
    pub confidence: Confidence,
    pub entity_type: EntityKind,
}

impl Entity {
    pub fn new(name: &str, value: &str, confidence: Confidence, entity_type: EntityKind) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            confidence,
            entity_type,
        }
    }
}

/// The parsed meaning of one utterance.
///
/// Built once by the parser, then enriched by context memory and scored by the
/// safety engine as it moves down the pipeline. Confidence and risk are range-checked
/// by their newtypes, so a constructed `Intent` always satisfies the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub intent_type: IntentType,
    pub text: String,
    pub action: String,
    pub target: Option<String>,
    pub parameters: HashMap<String, String>,
    pub confidence: Confidence,
    pub confidence_source: ConfidenceSource,
    pub entities: HashMap<String, Entity>,
    pub context: HashMap<String, serde_json::Value>,
    pub mode: Mode,
    pub requires_confirmation: bool,
    pub risk_level: RiskLevel,
    pub blocked_reason: Option<String>,
    /// Milliseconds since the unix epoch.
    pub timestamp: u64,
    pub session_id: String,
}

impl Intent {
    pub fn new(intent_type: IntentType, text: &str) -> Self {
        Self {
            intent_type,
            text: text.to_string(),
            action: intent_type.as_str().to_string(),
            target: None,
            parameters: HashMap::new(),
            confidence: Confidence::saturating(0.5),
            confidence_source: ConfidenceSource::Fallback,
            entities: HashMap::new(),
            context: HashMap::new(),
            mode: Mode::Listening,
            requires_confirmation: false,
            risk_level: RiskLevel::NONE,
            blocked_reason: None,
            timestamp: now_millis(),
            session_id: String::new(),
        }
    }

    /// Checked constructor for raw numeric confidence/risk.
    pub fn try_new(intent_type: IntentType, text: &str, confidence: f32, risk: u8) -> Result<Self, SchemaError> {
        let mut intent = Self::new(intent_type, text);
        intent.confidence = Confidence::new(confidence)?;
        intent.risk_level = RiskLevel::new(risk)?;
        Ok(intent)
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.action = action.to_string();
        self
    }

    pub fn with_target(mut self, target: Option<String>) -> Self {
        self.target = target.filter(|t| !t.is_empty());
        self
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence, source: ConfidenceSource) -> Self {
        self.confidence = confidence;
        self.confidence_source = source;
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = risk;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_reason.is_some()
    }

    pub fn operation(&self) -> Option<&str> {
        self.parameters.get("operation").map(String::as_str)
    }

    /// A FILE_OPERATION whose operation is a delete.
    pub fn is_delete(&self) -> bool {
        self.intent_type == IntentType::FileOperation && self.operation() == Some("delete")
    }

    pub fn annotate(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.context.insert(key.to_string(), value.into());
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_rejects_out_of_range() {
        assert!(Confidence::new(1.01).is_err());
        assert!(Confidence::new(-0.1).is_err());
        assert_eq!(Confidence::new(0.4).unwrap().value(), 0.4);
        assert_eq!(Confidence::saturating(f32::NAN).value(), 0.0);
        assert_eq!(Confidence::saturating(3.0).value(), 1.0);
    }

    #[test]
    fn risk_is_bounded_to_nine() {
        assert_eq!(RiskLevel::new(10), Err(SchemaError::RiskOutOfRange(10)));
        assert_eq!(RiskLevel::clamped(42), RiskLevel::MAX);
        assert!(Intent::try_new(IntentType::Search, "x", 0.5, 12).is_err());
    }

    #[test]
    fn deserializing_checks_schema() {
        let mut value = serde_json::to_value(Intent::new(IntentType::Search, "search cats")).unwrap();
        value["risk_level"] = serde_json::json!(11);
        assert!(serde_json::from_value::<Intent>(value).is_err());
    }

    #[test]
    fn action_mirrors_type_by_default() {
        let intent = Intent::new(IntentType::FileOperation, "delete notes.txt").with_param("operation", "delete");
        assert_eq!(intent.action, "FILE_OPERATION");
        assert!(intent.is_delete());
    }
}
