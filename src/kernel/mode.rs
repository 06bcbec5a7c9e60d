use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::info;

use crate::error::{CallbackError, ModeError};
use crate::kernel::intent::types::IntentCategory;
use crate::kernel::telemetry::{FaultReporter, Stage};

const MAX_TRANSITION_HISTORY: usize = 100;

/// The assistant's operating modes. Exactly one is current at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    /// Idle hub. Waiting for input.
    Listening,
    Command,
    /// Everything heard is typed out.
    Dictation,
    Question,
    /// Assistant switched off. Only "enable" gets it back.
    Disabled,
}

impl Mode {
    pub const ALL: [Mode; 5] = [Mode::Listening, Mode::Command, Mode::Dictation, Mode::Question, Mode::Disabled];
}

impl Default for Mode {
    fn default() -> Self {
        Self::Listening
    }
}

/// The fixed edge list. No wildcards: anything not listed is rejected.
const TRANSITIONS: &[(Mode, Mode)] = &[
    // From Listening
    (Mode::Listening, Mode::Command),
    (Mode::Listening, Mode::Question),
    (Mode::Listening, Mode::Dictation),
    (Mode::Listening, Mode::Disabled),
    // From Command
    (Mode::Command, Mode::Listening),
    (Mode::Command, Mode::Dictation),
    (Mode::Command, Mode::Disabled),
    // From Dictation
    (Mode::Dictation, Mode::Listening),
    (Mode::Dictation, Mode::Command),
    (Mode::Dictation, Mode::Disabled),
    // From Question
    (Mode::Question, Mode::Listening),
    (Mode::Question, Mode::Command),
    (Mode::Question, Mode::Disabled),
    // From Disabled
    (Mode::Disabled, Mode::Listening),
];

/// Pure edge check: (from, to) -> allowed?
pub fn can_transition(from: Mode, to: Mode) -> bool {
    from != to && TRANSITIONS.contains(&(from, to))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeTransition {
    pub from: Mode,
    pub to: Mode,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeDescription {
    pub name: Mode,
    pub active: bool,
    pub allows: &'static [&'static str],
    pub requires_confirmation: bool,
}

pub type ModeCallback = Box<dyn Fn(Mode) -> Result<(), CallbackError> + Send + Sync>;

/// Finite-state machine over [`Mode`].
///
/// Commits are recorded in a bounded audit history and fan out to the callbacks
/// registered for the destination mode. A failing callback never undoes the
/// transition; its error goes to the fault sink.
pub struct ModeManager {
    current: Mode,
    previous: Mode,
    history: VecDeque<ModeTransition>,
    callbacks: HashMap<Mode, Vec<ModeCallback>>,
    faults: FaultReporter,
}

impl ModeManager {
    pub fn new(faults: FaultReporter) -> Self {
        Self {
            current: Mode::Listening,
            previous: Mode::Listening,
            history: VecDeque::with_capacity(MAX_TRANSITION_HISTORY),
            callbacks: HashMap::new(),
            faults,
        }
    }

    pub fn mode(&self) -> Mode {
        self.current
    }

    pub fn previous_mode(&self) -> Mode {
        self.previous
    }

    pub fn set_mode(&mut self, new_mode: Mode, reason: &str) -> Result<ModeTransition, ModeError> {
        if new_mode == self.current {
            return Err(ModeError::SelfTransition(new_mode));
        }
        if !can_transition(self.current, new_mode) {
            return Err(ModeError::InvalidTransition { from: self.current, to: new_mode });
        }

        let transition = ModeTransition {
            from: self.current,
            to: new_mode,
            reason: reason.to_string(),
        };
        self.previous = self.current;
        self.current = new_mode;

        if self.history.len() >= MAX_TRANSITION_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(transition.clone());

        if let Some(callbacks) = self.callbacks.get(&new_mode) {
            for callback in callbacks {
                if let Err(e) = callback(new_mode) {
                    self.faults.report(Stage::ModeCallback, e.to_string());
                }
            }
        }

        info!(from = ?transition.from, to = ?transition.to, reason, "Mode changed");
        Ok(transition)
    }

    pub fn on_mode_change(&mut self, mode: Mode, callback: ModeCallback) {
        self.callbacks.entry(mode).or_default().push(callback);
    }

    pub fn is_enabled(&self) -> bool {
        self.current != Mode::Disabled
    }

    pub fn can_execute(&self, category: IntentCategory) -> bool {
        allowed_categories(self.current).contains(&category)
    }

    /// Most recent transitions, oldest first.
    pub fn transition_history(&self, limit: usize) -> Vec<ModeTransition> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).cloned().collect()
    }

    pub fn describe(&self) -> ModeDescription {
        let (allows, requires_confirmation): (&'static [&'static str], bool) = match self.current {
            Mode::Listening => (&["await input"], false),
            Mode::Command => (&["open apps", "delete files", "control system"], true),
            Mode::Dictation => (&["type text", "write"], false),
            Mode::Question => (&["answer questions", "provide info"], false),
            Mode::Disabled => (&[], false),
        };
        ModeDescription {
            name: self.current,
            active: self.is_enabled(),
            allows,
            requires_confirmation,
        }
    }
}

fn allowed_categories(mode: Mode) -> &'static [IntentCategory] {
    use IntentCategory::*;
    match mode {
        Mode::Listening => &[Command, Control, Question],
        Mode::Command => &[Command, Control],
        Mode::Dictation => &[Dictation],
        Mode::Question => &[Question, Control],
        Mode::Disabled => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn starts_listening() {
        let manager = ModeManager::new(FaultReporter::detached());
        assert_eq!(manager.mode(), Mode::Listening);
        assert!(manager.is_enabled());
    }

    #[test]
    fn history_is_bounded() {
        let mut manager = ModeManager::new(FaultReporter::detached());
        for _ in 0..80 {
            manager.set_mode(Mode::Command, "cmd").unwrap();
            manager.set_mode(Mode::Listening, "done").unwrap();
        }
        assert_eq!(manager.transition_history(usize::MAX).len(), MAX_TRANSITION_HISTORY);
        let last = manager.transition_history(1);
        assert_eq!(last[0].to, Mode::Listening);
        assert_eq!(last[0].reason, "done");
    }

    #[test]
    fn failing_callback_still_commits() {
        let (reporter, mut faults) = FaultReporter::channel();
        let mut manager = ModeManager::new(reporter);
        let calls = Arc::new(AtomicUsize::new(0));

        manager.on_mode_change(Mode::Dictation, Box::new(|_| Err(CallbackError("boom".into()))));
        let seen = calls.clone();
        manager.on_mode_change(
            Mode::Dictation,
            Box::new(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        assert!(manager.set_mode(Mode::Dictation, "enter dictation").is_ok());
        assert_eq!(manager.mode(), Mode::Dictation);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let fault = faults.try_recv().unwrap();
        assert_eq!(fault.stage, Stage::ModeCallback);
    }

    #[test]
    fn dictation_only_allows_dictation() {
        let mut manager = ModeManager::new(FaultReporter::detached());
        manager.set_mode(Mode::Dictation, "test").unwrap();
        assert!(manager.can_execute(IntentCategory::Dictation));
        assert!(!manager.can_execute(IntentCategory::Command));
        assert!(!manager.describe().requires_confirmation);
    }
}
