use tracing::debug;

use super::normalize::{contains_phrase, find_phrase, normalize, starts_with_phrase};
use super::types::{Confidence, ConfidenceSource, Entity, EntityKind, Intent, IntentType, RiskLevel};
use crate::kernel::mode::Mode;

/// Risk at or above which a keyword command asks for confirmation.
const KEYWORD_CONFIRM_RISK: u8 = 7;

const FILLER_WORDS: &[&str] = &[
    "a", "an", "the", "please", "for", "my", "me", "can", "could", "would", "you", "to", "now", "kindly", "just",
];

/// Router action names that differ from the intent type's wire name.
pub mod actions {
    pub const ENTER_DICTATION: &str = "ENTER_DICTATION";
    pub const EXIT_DICTATION: &str = "EXIT_DICTATION";
    pub const DISABLE: &str = "DISABLE";
    pub const ENABLE: &str = "ENABLE";
    pub const UI_CLICK: &str = "UI_CLICK";
    pub const VISION: &str = "VISION";
    pub const KNOWLEDGE_QUERY: &str = "KNOWLEDGE_QUERY";
    pub const SMALL_TALK: &str = "SMALL_TALK";
}

#[derive(Debug, Clone, Copy)]
struct KeywordRule {
    phrase: &'static str,
    intent_type: IntentType,
    risk: u8,
    operation: Option<&'static str>,
}

const fn rule(phrase: &'static str, intent_type: IntentType, risk: u8, operation: Option<&'static str>) -> KeywordRule {
    KeywordRule { phrase, intent_type, risk, operation }
}

/// Generic command vocabulary. The phrase that starts earliest in the utterance wins;
/// phrases starting at the same word fall back to table order, so the
/// bulk-destruction phrases sit ahead of their milder forms.
const KEYWORD_TABLE: &[KeywordRule] = &[
    rule("delete all", IntentType::FileOperation, 9, Some("delete")),
    rule("wipe", IntentType::FileOperation, 9, Some("delete")),
    rule("format", IntentType::SystemControl, 9, None),
    rule("remove user", IntentType::SystemControl, 9, None),
    rule("shutdown", IntentType::SystemControl, 8, None),
    rule("restart", IntentType::SystemControl, 8, None),
    rule("reboot", IntentType::SystemControl, 8, None),
    rule("logoff", IntentType::SystemControl, 7, None),
    rule("delete", IntentType::FileOperation, 7, Some("delete")),
    rule("remove", IntentType::FileOperation, 7, Some("delete")),
    rule("erase", IntentType::FileOperation, 7, Some("delete")),
    rule("rename", IntentType::FileOperation, 7, Some("rename")),
    rule("move file", IntentType::FileOperation, 7, Some("move")),
    rule("copy file", IntentType::FileOperation, 7, Some("copy")),
    rule("create file", IntentType::FileOperation, 7, Some("create")),
    rule("create folder", IntentType::FileOperation, 7, Some("create")),
    rule("close", IntentType::CloseApp, 3, None),
    rule("open", IntentType::OpenApp, 1, None),
    rule("launch", IntentType::OpenApp, 1, None),
    rule("start", IntentType::OpenApp, 1, None),
    rule("run", IntentType::OpenApp, 1, None),
    rule("search", IntentType::Search, 1, None),
    rule("google", IntentType::Search, 1, None),
    rule("lookup", IntentType::Search, 1, None),
    rule("type", IntentType::TypeText, 2, None),
    rule("write", IntentType::TypeText, 2, None),
];

const CONTROL_PHRASES: &[(&str, &str)] = &[
    ("enter dictation", actions::ENTER_DICTATION),
    ("start dictation", actions::ENTER_DICTATION),
    ("dictation mode", actions::ENTER_DICTATION),
    ("exit dictation", actions::EXIT_DICTATION),
    ("stop dictation", actions::EXIT_DICTATION),
    ("end dictation", actions::EXIT_DICTATION),
    ("disable assistant", actions::DISABLE),
    ("go to sleep", actions::DISABLE),
    ("enable assistant", actions::ENABLE),
    ("wake up", actions::ENABLE),
];

const CAMERA_PHRASES: &[(&str, &str)] = &[
    ("start camera", "start_camera"),
    ("open camera", "start_camera"),
    ("turn on camera", "start_camera"),
    ("turn on the camera", "start_camera"),
    ("stop camera", "stop_camera"),
    ("close camera", "stop_camera"),
    ("turn off camera", "stop_camera"),
    ("turn off the camera", "stop_camera"),
];

const SCREEN_PHRASES: &[(&str, &str)] = &[
    ("read screen", "read_text"),
    ("read the screen", "read_text"),
    ("read my screen", "read_text"),
    ("look at screen", "describe"),
    ("look at the screen", "describe"),
    ("look at my screen", "describe"),
    ("describe screen", "describe"),
    ("describe the screen", "describe"),
];

const TIME_PHRASES: &[&str] = &["what time is it", "what is the time", "tell me the time", "current time"];

const SCENE_PHRASES: &[&str] = &["what do you see", "what can you see", "describe the scene", "look around"];

const HOW_MANY_TAILS: &[&str] = &["are there", "do you see", "can you see", "are visible", "are in the room"];

const KNOWLEDGE_PREFIXES: &[&str] = &["who is", "who are", "what is", "what are", "tell me about"];

const OPEN_QUESTION_PREFIXES: &[&str] = &["why", "when", "explain", "how do", "how does", "how to", "how can"];

const SMALL_TALK: &[(&str, &str)] = &[
    ("good morning", "Good morning."),
    ("good evening", "Good evening."),
    ("how are you", "I'm doing well, thanks for asking."),
    ("thank you", "You're welcome."),
    ("thanks", "You're welcome."),
    ("hello", "Hello."),
    ("hey", "Hey there."),
    ("hi", "Hi."),
];

const NUMBER_WORDS: &[(&str, u32)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
];

/// Layered text classifier.
///
/// Layers run in strict precedence and the first match wins:
/// mode override, fixed phrases, question patterns, keyword table, small talk,
/// then the unknown fallback. Parsing never fails.
///
/// Inside the keyword layer the leftmost command word decides ("search for delete
/// tips" is a search); ties go to keyword table order.
#[derive(Debug, Clone, Default)]
pub struct IntentParser;

impl IntentParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, text: &str, mode: Mode) -> Intent {
        let normalized = normalize(text);
        let intent = if normalized.is_empty() {
            None
        } else {
            self.match_mode_override(text, &normalized, mode)
                .or_else(|| self.match_fixed_phrase(text, &normalized))
                .or_else(|| self.match_question(text, &normalized))
                .or_else(|| self.match_keyword(text, &normalized))
                .or_else(|| self.match_small_talk(text, &normalized))
        };

        let intent = intent.unwrap_or_else(|| {
            Intent::new(IntentType::Unknown, text).with_confidence(Confidence::saturating(0.3), ConfidenceSource::Fallback)
        });
        debug!(intent_type = %intent.intent_type, action = %intent.action, risk = intent.risk_level.value(), "Parsed intent");
        intent.with_mode(mode)
    }

    /// Layer 1. In dictation everything is typed out, except the way back out.
    fn match_mode_override(&self, text: &str, normalized: &str, mode: Mode) -> Option<Intent> {
        if mode != Mode::Dictation {
            return None;
        }
        if let Some(control) = match_control(text, normalized) {
            if control.action == actions::EXIT_DICTATION {
                return Some(control);
            }
        }
        Some(
            Intent::new(IntentType::Dictation, text)
                .with_action(IntentType::TypeText.as_str())
                .with_target(Some(normalized.to_string()))
                .with_confidence(Confidence::saturating(0.95), ConfidenceSource::Context)
                .with_risk(RiskLevel::LOW),
        )
    }

    /// Layer 2. Phrases that the generic keyword table would otherwise swallow
    /// ("start camera" is not an app launch).
    fn match_fixed_phrase(&self, text: &str, normalized: &str) -> Option<Intent> {
        if let Some(control) = match_control(text, normalized) {
            return Some(control);
        }

        if let Some((_, task)) = CAMERA_PHRASES.iter().find(|(p, _)| contains_phrase(normalized, p)) {
            return Some(vision(text, task).with_target(Some("camera".into())));
        }

        if let Some(intent) = match_click(text, normalized) {
            return Some(intent);
        }

        if let Some((_, task)) = SCREEN_PHRASES.iter().find(|(p, _)| contains_phrase(normalized, p)) {
            return Some(vision(text, task).with_target(Some("screen".into())));
        }

        if TIME_PHRASES.iter().any(|p| contains_phrase(normalized, p)) {
            return Some(
                Intent::new(IntentType::GetTime, text)
                    .with_confidence(Confidence::saturating(0.95), ConfidenceSource::Regex)
                    .with_risk(RiskLevel::LOW),
            );
        }

        None
    }

    /// Layer 3. Vision and knowledge questions.
    fn match_question(&self, text: &str, normalized: &str) -> Option<Intent> {
        if SCENE_PHRASES.iter().any(|p| contains_phrase(normalized, p)) {
            return Some(question(text, actions::VISION, "describe_scene", None));
        }

        for prefix in ["where is", "where are", "where did i put"] {
            if let Some(rest) = after_prefix(normalized, prefix) {
                return Some(question(text, actions::VISION, "locate", strip_fillers(rest)));
            }
        }

        if let Some(rest) = after_prefix(normalized, "how many") {
            let mut subject = rest;
            for tail in HOW_MANY_TAILS {
                if let Some(trimmed) = subject.strip_suffix(tail) {
                    subject = trimmed.trim_end();
                    break;
                }
            }
            return Some(question(text, actions::VISION, "count", strip_fillers(subject)));
        }

        for prefix in KNOWLEDGE_PREFIXES {
            if let Some(rest) = after_prefix(normalized, prefix) {
                let topic = strip_fillers(rest);
                let mut intent = question(text, actions::KNOWLEDGE_QUERY, "knowledge", topic.clone());
                if let Some(topic) = topic {
                    intent = intent.with_param("topic", &topic);
                }
                return Some(intent);
            }
        }

        if OPEN_QUESTION_PREFIXES.iter().any(|p| starts_with_phrase(normalized, p)) {
            return Some(
                question(text, actions::KNOWLEDGE_QUERY, "knowledge", None)
                    .with_confidence(Confidence::saturating(0.7), ConfidenceSource::Keyword),
            );
        }

        None
    }

    /// Layer 4. Leftmost table phrase in the text.
    fn match_keyword(&self, text: &str, normalized: &str) -> Option<Intent> {
        let (rule, offset) = KEYWORD_TABLE
            .iter()
            .filter_map(|rule| find_phrase(normalized, rule.phrase).map(|at| (rule, at)))
            .min_by_key(|(_, at)| *at)?;

        // `find_phrase` reports the offset in the space-padded text.
        let after = normalized.get(offset + rule.phrase.len()..).unwrap_or("");
        let mut target = strip_fillers(after);

        let mut intent_type = rule.intent_type;
        let mut risk = rule.risk;
        if intent_type == IntentType::OpenApp && target.as_deref().is_some_and(looks_like_file) {
            intent_type = IntentType::OpenFile;
            risk = risk.max(2);
            // "open file report.pdf"
            target = target.map(|t| t.strip_prefix("file ").map(str::to_string).unwrap_or(t));
        }

        let confidence = if target.is_some() { 0.9 } else { 0.7 };
        let mut intent = Intent::new(intent_type, text)
            .with_target(target.clone())
            .with_confidence(Confidence::saturating(confidence), ConfidenceSource::Keyword)
            .with_risk(RiskLevel::clamped(risk))
            .with_param("keyword", rule.phrase);
        intent.requires_confirmation = risk >= KEYWORD_CONFIRM_RISK;

        if let Some(operation) = rule.operation {
            intent = intent.with_param("operation", operation);
        }
        if let Some(target) = target {
            intent = intent.with_entity(Entity::new("target", &target, Confidence::saturating(confidence), EntityKind::Keyword));
        }
        Some(intent)
    }

    /// Layer 5. Greetings and thanks get a canned reply, nothing else.
    fn match_small_talk(&self, text: &str, normalized: &str) -> Option<Intent> {
        let (_, reply) = SMALL_TALK.iter().find(|(p, _)| contains_phrase(normalized, p))?;
        Some(
            Intent::new(IntentType::Unknown, text)
                .with_action(actions::SMALL_TALK)
                .with_param("reply", reply)
                .with_confidence(Confidence::saturating(0.35), ConfidenceSource::Keyword),
        )
    }
}

fn match_control(text: &str, normalized: &str) -> Option<Intent> {
    let (_, action) = CONTROL_PHRASES.iter().find(|(p, _)| contains_phrase(normalized, p))?;
    Some(
        Intent::new(IntentType::Control, text)
            .with_action(action)
            .with_confidence(Confidence::saturating(0.95), ConfidenceSource::Keyword)
            .with_risk(RiskLevel::LOW),
    )
}

fn match_click(text: &str, normalized: &str) -> Option<Intent> {
    let rest = after_prefix(normalized, "click")?;
    let rest = rest.strip_prefix("on ").unwrap_or(rest).trim();
    let rest = rest.strip_prefix("number ").unwrap_or(rest);

    let intent = Intent::new(IntentType::UiAutomation, text)
        .with_action(actions::UI_CLICK)
        .with_confidence(Confidence::saturating(0.9), ConfidenceSource::Regex)
        .with_risk(RiskLevel::LOW);

    if let Some(index) = parse_index(rest) {
        let value = index.to_string();
        return Some(
            intent
                .with_param("index", &value)
                .with_entity(Entity::new("index", &value, Confidence::saturating(0.9), EntityKind::Regex)),
        );
    }

    let name = strip_fillers(rest)?;
    Some(
        intent
            .with_target(Some(name.clone()))
            .with_param("name", &name)
            .with_entity(Entity::new("name", &name, Confidence::saturating(0.85), EntityKind::Regex)),
    )
}

fn parse_index(word: &str) -> Option<u32> {
    let word = word.trim();
    word.parse::<u32>()
        .ok()
        .or_else(|| NUMBER_WORDS.iter().find(|(w, _)| *w == word).map(|(_, n)| *n))
}

fn vision(text: &str, task: &str) -> Intent {
    Intent::new(IntentType::Vision, text)
        .with_param("task", task)
        .with_confidence(Confidence::saturating(0.95), ConfidenceSource::Regex)
        .with_risk(RiskLevel::LOW)
}

fn question(text: &str, action: &str, query_type: &str, target: Option<String>) -> Intent {
    Intent::new(IntentType::Question, text)
        .with_action(action)
        .with_target(target)
        .with_param("query_type", query_type)
        .with_confidence(Confidence::saturating(0.8), ConfidenceSource::Regex)
        .with_risk(RiskLevel::LOW)
}

/// Remainder after a whole-word prefix, or `None` when the prefix is absent.
fn after_prefix<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if !starts_with_phrase(text, prefix) {
        return None;
    }
    Some(text[prefix.len()..].trim_start())
}

/// Drops filler words from both ends; interior words are part of the target.
fn strip_fillers(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.iter().position(|w| !FILLER_WORDS.contains(w))?;
    let end = words.iter().rposition(|w| !FILLER_WORDS.contains(w))?;
    Some(words[start..=end].join(" "))
}

/// `report.pdf`, `notes.v2.txt`: a dot with something on both sides.
fn looks_like_file(target: &str) -> bool {
    target
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Intent {
        IntentParser::new().parse(text, Mode::Listening)
    }

    #[test]
    fn keyword_target_strips_fillers() {
        let intent = parse("Please open the Chrome");
        assert_eq!(intent.intent_type, IntentType::OpenApp);
        assert_eq!(intent.target.as_deref(), Some("chrome"));
        assert_eq!(intent.risk_level, RiskLevel::LOW);
        assert!(!intent.requires_confirmation);
    }

    #[test]
    fn delete_needs_confirmation_and_keeps_file_name() {
        let intent = parse("delete report.pdf");
        assert_eq!(intent.intent_type, IntentType::FileOperation);
        assert_eq!(intent.operation(), Some("delete"));
        assert_eq!(intent.target.as_deref(), Some("report.pdf"));
        assert_eq!(intent.risk_level.value(), 7);
        assert!(intent.requires_confirmation);
    }

    #[test]
    fn bulk_delete_outranks_plain_delete() {
        let intent = parse("delete all files in system");
        assert_eq!(intent.risk_level, RiskLevel::MAX);
        assert_eq!(intent.target.as_deref(), Some("files in system"));
    }

    #[test]
    fn open_with_extension_is_open_file() {
        let intent = parse("open budget.xlsx");
        assert_eq!(intent.intent_type, IntentType::OpenFile);
        assert_eq!(intent.risk_level.value(), 2);
    }

    #[test]
    fn leftmost_command_word_wins() {
        let intent = parse("search for delete tips");
        assert_eq!(intent.intent_type, IntentType::Search);
        assert_eq!(intent.target.as_deref(), Some("delete tips"));
        assert!(!intent.requires_confirmation);

        let intent = parse("please delete the old notes and open chrome");
        assert_eq!(intent.intent_type, IntentType::FileOperation);
    }

    #[test]
    fn open_file_drops_the_file_word() {
        let intent = parse("open file report.pdf");
        assert_eq!(intent.intent_type, IntentType::OpenFile);
        assert_eq!(intent.target.as_deref(), Some("report.pdf"));
    }

    #[test]
    fn fixed_phrases_beat_keywords() {
        let intent = parse("start camera");
        assert_eq!(intent.intent_type, IntentType::Vision);
        assert_eq!(intent.parameters.get("task").map(String::as_str), Some("start_camera"));

        let intent = parse("start dictation");
        assert_eq!(intent.intent_type, IntentType::Control);
        assert_eq!(intent.action, actions::ENTER_DICTATION);
    }

    #[test]
    fn click_by_index_and_by_name() {
        let intent = parse("click 3");
        assert_eq!(intent.action, actions::UI_CLICK);
        assert_eq!(intent.parameters.get("index").map(String::as_str), Some("3"));

        let intent = parse("click number two");
        assert_eq!(intent.parameters.get("index").map(String::as_str), Some("2"));

        let intent = parse("click on the submit button");
        assert_eq!(intent.parameters.get("name").map(String::as_str), Some("submit button"));
    }

    #[test]
    fn time_query_is_not_a_knowledge_question() {
        assert_eq!(parse("What's the time?").intent_type, IntentType::GetTime);
    }

    #[test]
    fn questions_carry_query_type() {
        let intent = parse("where is my phone");
        assert_eq!(intent.intent_type, IntentType::Question);
        assert_eq!(intent.action, actions::VISION);
        assert_eq!(intent.target.as_deref(), Some("phone"));
        assert_eq!(intent.parameters.get("query_type").map(String::as_str), Some("locate"));

        let intent = parse("how many people are there");
        assert_eq!(intent.target.as_deref(), Some("people"));
        assert_eq!(intent.parameters.get("query_type").map(String::as_str), Some("count"));

        let intent = parse("who is Ada Lovelace");
        assert_eq!(intent.action, actions::KNOWLEDGE_QUERY);
        assert_eq!(intent.parameters.get("topic").map(String::as_str), Some("ada lovelace"));
    }

    #[test]
    fn dictation_mode_types_everything_but_exit() {
        let parser = IntentParser::new();
        let intent = parser.parse("delete everything", Mode::Dictation);
        assert_eq!(intent.intent_type, IntentType::Dictation);
        assert_eq!(intent.target.as_deref(), Some("delete everything"));
        assert_eq!(intent.mode, Mode::Dictation);

        let intent = parser.parse("stop dictation", Mode::Dictation);
        assert_eq!(intent.intent_type, IntentType::Control);
        assert_eq!(intent.action, actions::EXIT_DICTATION);
    }

    #[test]
    fn word_boundaries_prevent_partial_matches() {
        // "reopen" and "typewriter" contain keywords but are not commands
        assert_eq!(parse("reopened typewriters").intent_type, IntentType::Unknown);
    }

    #[test]
    fn small_talk_and_fallback() {
        let intent = parse("hello there");
        assert_eq!(intent.action, actions::SMALL_TALK);
        assert_eq!(intent.confidence.value(), 0.35);
        assert!(intent.parameters.contains_key("reply"));

        let intent = parse("   ");
        assert_eq!(intent.intent_type, IntentType::Unknown);
        assert_eq!(intent.action, "UNKNOWN");
        assert_eq!(intent.confidence.value(), 0.3);
    }
}
