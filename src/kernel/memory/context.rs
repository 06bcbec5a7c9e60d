use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

use crate::kernel::intent::types::{Confidence, ConfidenceSource, Entity, EntityKind, Intent, IntentType};

const PRONOUNS: &[&str] = &["it", "that", "this"];

#[derive(Debug, Default)]
struct MemoryState {
    history: VecDeque<Intent>,
    last_app: Option<String>,
    last_file: Option<String>,
    last_topic: Option<String>,
}

/// Debug view of the memory. Carries targets, so it stays out of telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemorySnapshot {
    pub session_id: String,
    pub last_app: Option<String>,
    pub last_file: Option<String>,
    pub last_topic: Option<String>,
    pub history_size: usize,
}

/// Short-term conversational memory for one session.
///
/// All reads and writes go through one lock; there is no other way to reach the
/// `last_*` slots.
#[derive(Debug)]
pub struct ContextMemory {
    session_id: String,
    max_history: usize,
    state: Mutex<MemoryState>,
}

impl ContextMemory {
    pub fn new(max_history: usize) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            max_history: max_history.max(1),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fills in what the utterance left implicit: pronoun targets, missing targets
    /// for search and delete, and the running topic for follow-up questions.
    pub fn enrich(&self, mut intent: Intent) -> Intent {
        let state = self.lock();
        intent.session_id = self.session_id.clone();

        let is_pronoun = intent.target.as_deref().is_some_and(|t| PRONOUNS.contains(&t));
        if is_pronoun {
            if let Some(resolved) = state.last_app.as_ref().or(state.last_file.as_ref()) {
                debug!("Resolved pronoun target from context");
                intent.target = Some(resolved.clone());
                intent.confidence_source = ConfidenceSource::Context;
                intent.annotate("reference_resolved", true);
            }
        }

        if intent.target.is_none() {
            let inferred = if intent.intent_type == IntentType::Search {
                state.last_app.as_ref().map(|app| (app.clone(), "last_app", 0.85))
            } else if intent.is_delete() {
                state.last_file.as_ref().map(|file| (file.clone(), "last_file", 0.80))
            } else {
                None
            };

            if let Some((target, source, confidence)) = inferred {
                intent.entities.insert(
                    "target".into(),
                    Entity::new("target", &target, Confidence::saturating(confidence), EntityKind::Context),
                );
                intent.target = Some(target);
                intent.confidence_source = ConfidenceSource::Context;
                intent.annotate("inferred_from", source);
                intent.annotate("inference_confidence", confidence);
            }
        }

        if intent.intent_type == IntentType::Question && !intent.parameters.contains_key("topic") {
            if let Some(topic) = &state.last_topic {
                intent.annotate("previous_topic", topic.clone());
            }
        }

        intent
    }

    /// Records a processed intent and moves the `last_*` slots forward.
    pub fn update(&self, intent: &Intent) {
        let mut state = self.lock();

        if state.history.len() >= self.max_history {
            state.history.pop_front();
        }
        state.history.push_back(intent.clone());

        match (intent.intent_type, intent.target.as_ref()) {
            (IntentType::OpenApp, Some(app)) => state.last_app = Some(app.clone()),
            (IntentType::CloseApp | IntentType::SystemControl, Some(app)) if state.last_app.as_ref() == Some(app) => {
                state.last_app = None;
            }
            (IntentType::OpenFile, Some(file)) => state.last_file = Some(file.clone()),
            (IntentType::FileOperation, Some(file)) if intent.is_delete() => state.last_file = Some(file.clone()),
            _ => {}
        }

        if intent.intent_type == IntentType::Question {
            state.last_topic = Some(intent.text.clone());
        }
    }

    pub fn last_intent(&self) -> Option<Intent> {
        self.lock().history.back().cloned()
    }

    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        *state = MemoryState::default();
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        let state = self.lock();
        MemorySnapshot {
            session_id: self.session_id.clone(),
            last_app: state.last_app.clone(),
            last_file: state.last_file.clone(),
            last_topic: state.last_topic.clone(),
            history_size: state.history.len(),
        }
    }
}
