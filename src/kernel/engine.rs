use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::kernel::confirmation::{classify_reply, ConfirmationGate, Reply};
use crate::kernel::decision::{BlockReason, Decision, Outcome};
use crate::kernel::intent::parser::actions;
use crate::kernel::intent::types::{Intent, IntentType};
use crate::kernel::intent::IntentParser;
use crate::kernel::memory::ContextMemory;
use crate::kernel::mode::{Mode, ModeManager};
use crate::kernel::safety::SafetyEngine;
use crate::kernel::telemetry::event::ConfirmationEvent;
use crate::kernel::telemetry::{FaultReporter, Telemetry, TelemetryEvent};
use crate::kernel::time::Clock;

const REPROMPT: &str = "Please say yes or no.";
const SUPERSEDED_NOTE: &str = "Your earlier request was dropped.";

/// The collaborators the engine orchestrates, built once at startup.
pub struct EngineParts {
    pub parser: IntentParser,
    pub modes: ModeManager,
    pub memory: ContextMemory,
    pub safety: SafetyEngine,
}

impl EngineParts {
    pub fn from_config(config: &PipelineConfig, faults: FaultReporter) -> Result<Self, ConfigError> {
        Ok(Self {
            parser: IntentParser::new(),
            modes: ModeManager::new(faults),
            memory: ContextMemory::new(config.max_history),
            safety: SafetyEngine::new(config.confirm_threshold(), config.block_threshold(), &config.danger_patterns)?,
        })
    }
}

/// Turns text into a [`Decision`] and owns the confirmation handshake.
///
/// Per call: a pending confirmation is resolved first (or expires); otherwise the
/// text is parsed, mode control is applied, context fills in references, the
/// safety engine scores it and the result is approved, blocked or parked.
pub struct DecisionEngine {
    parser: IntentParser,
    modes: ModeManager,
    memory: ContextMemory,
    safety: SafetyEngine,
    gate: ConfirmationGate,
    low_confidence_threshold: f32,
    clock: Arc<dyn Clock>,
    telemetry: Telemetry,
}

impl DecisionEngine {
    pub fn new(
        parts: EngineParts,
        confirmation_timeout: Duration,
        low_confidence_threshold: f32,
        clock: Arc<dyn Clock>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            parser: parts.parser,
            modes: parts.modes,
            memory: parts.memory,
            safety: parts.safety,
            gate: ConfirmationGate::new(confirmation_timeout),
            low_confidence_threshold,
            clock,
            telemetry,
        }
    }

    pub fn from_config(
        config: &PipelineConfig,
        clock: Arc<dyn Clock>,
        telemetry: Telemetry,
        faults: FaultReporter,
    ) -> Result<Self, ConfigError> {
        let parts = EngineParts::from_config(config, faults)?;
        Ok(Self::new(
            parts,
            config.confirmation_timeout(),
            config.low_confidence_threshold,
            clock,
            telemetry,
        ))
    }

    pub fn mode(&self) -> Mode {
        self.modes.mode()
    }

    pub fn modes(&self) -> &ModeManager {
        &self.modes
    }

    /// For registering mode callbacks.
    pub fn modes_mut(&mut self) -> &mut ModeManager {
        &mut self.modes
    }

    pub fn memory(&self) -> &ContextMemory {
        &self.memory
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn pending_confirmation(&self) -> Option<&Intent> {
        self.gate.pending()
    }

    pub fn process_text(&mut self, text: &str) -> Decision {
        let started = Instant::now();
        if let Some(decision) = self.resolve_pending(text, started) {
            return decision;
        }
        self.decide(text, started)
    }

    /// Treats `reply` as the answer to the pending confirmation.
    /// `None` when nothing is pending.
    pub fn resolve_confirmation(&mut self, reply: &str) -> Option<Decision> {
        self.resolve_pending(reply, Instant::now())
    }

    /// Drops the pending confirmation as if the user said no.
    pub fn cancel_pending(&mut self) -> Option<Decision> {
        let started = Instant::now();
        let intent = self.gate.take()?;
        info!("Pending confirmation cancelled");
        self.telemetry.record(TelemetryEvent::Confirmation(ConfirmationEvent::Denied));
        Some(self.finish(
            Outcome::Blocked {
                reason: BlockReason::Denied,
                intent: Some(intent),
            },
            started,
            true,
        ))
    }

    fn resolve_pending(&mut self, text: &str, started: Instant) -> Option<Decision> {
        if !self.gate.is_pending() {
            return None;
        }

        if self.gate.is_expired(self.clock.now()) {
            let intent = self.gate.take();
            info!(timeout_s = self.gate.timeout().as_secs(), "Confirmation timed out");
            self.telemetry.record(TelemetryEvent::Confirmation(ConfirmationEvent::Expired));
            return Some(self.finish(
                Outcome::Blocked {
                    reason: BlockReason::TimedOut,
                    intent,
                },
                started,
                true,
            ));
        }

        let outcome = match classify_reply(text) {
            Reply::Confirm => {
                let intent = self.gate.take()?;
                self.telemetry.record(TelemetryEvent::Confirmation(ConfirmationEvent::Approved));
                Outcome::Approved { intent, confirmed: true }
            }
            Reply::Deny => {
                let intent = self.gate.take();
                self.telemetry.record(TelemetryEvent::Confirmation(ConfirmationEvent::Denied));
                Outcome::Blocked {
                    reason: BlockReason::Denied,
                    intent,
                }
            }
            Reply::Unclear if self.is_confirmable_command(text) => {
                debug!("Confirmable command arrived while another is pending");
                return None;
            }
            Reply::Unclear => {
                let intent = self.gate.pending()?.clone();
                self.telemetry.record(TelemetryEvent::Confirmation(ConfirmationEvent::Reprompted));
                Outcome::NeedsConfirmation {
                    intent,
                    prompt: REPROMPT.to_string(),
                }
            }
        };
        Some(self.finish(outcome, started, true))
    }

    /// True when `text` is a fresh command that would itself be parked for
    /// confirmation. Such a command replaces the pending one in [`Self::decide`]
    /// instead of being read as an unclear reply.
    fn is_confirmable_command(&self, text: &str) -> bool {
        let mode = self.modes.mode();
        let intent = self.safety.evaluate(self.parser.parse(text, mode), mode);
        intent.requires_confirmation && intent.blocked_reason.is_none()
    }

    fn decide(&mut self, text: &str, started: Instant) -> Decision {
        let mut intent = self.parser.parse(text, self.modes.mode());

        if intent.intent_type == IntentType::Control {
            self.apply_control(&mut intent);
        }

        let intent = self.memory.enrich(intent);
        self.memory.update(&intent);
        let intent = self.safety.evaluate(intent, self.modes.mode());

        if let Some(reason) = intent.blocked_reason.clone() {
            return self.finish(
                Outcome::Blocked {
                    reason: BlockReason::Policy(reason),
                    intent: Some(intent),
                },
                started,
                false,
            );
        }

        if intent.confidence.value() < self.low_confidence_threshold && intent.action == IntentType::Unknown.as_str() {
            debug!("Dropping low-confidence input");
            return self.finish(
                Outcome::Blocked {
                    reason: BlockReason::LowConfidence,
                    intent: Some(intent),
                },
                started,
                false,
            );
        }

        if intent.requires_confirmation {
            let mut prompt = confirmation_prompt(&intent);
            if self.gate.request(intent.clone(), self.clock.now()).is_some() {
                warn!("New confirmation request replaced a pending one");
                self.telemetry.record(TelemetryEvent::Confirmation(ConfirmationEvent::Superseded));
                prompt = format!("{SUPERSEDED_NOTE} {prompt}");
            }
            self.telemetry.record(TelemetryEvent::Confirmation(ConfirmationEvent::Requested));
            return self.finish(Outcome::NeedsConfirmation { intent, prompt }, started, false);
        }

        self.finish(Outcome::Approved { intent, confirmed: false }, started, false)
    }

    /// Mode side effect of a CONTROL phrase. A rejected transition is not an error
    /// here; the intent still flows on and is annotated with the result.
    fn apply_control(&mut self, intent: &mut Intent) {
        let target = match intent.action.as_str() {
            actions::ENTER_DICTATION => Mode::Dictation,
            actions::EXIT_DICTATION => Mode::Command,
            actions::DISABLE => Mode::Disabled,
            actions::ENABLE => Mode::Listening,
            _ => return,
        };

        match self.modes.set_mode(target, &intent.action.to_lowercase()) {
            Ok(transition) => {
                self.telemetry.record(TelemetryEvent::ModeTransition {
                    from: transition.from,
                    to: transition.to,
                });
                intent.annotate("mode_changed", true);
            }
            Err(e) => {
                debug!(error = %e, "Mode change rejected");
                intent.annotate("mode_changed", false);
            }
        }
    }

    fn finish(&self, outcome: Outcome, started: Instant, from_confirmation: bool) -> Decision {
        let decision = Decision {
            outcome,
            latency: started.elapsed(),
        };
        self.telemetry.record(TelemetryEvent::Decision {
            status: decision.status(),
            latency_us: decision.latency.as_micros() as u64,
            from_confirmation,
        });
        info!(
            status = %decision.status(),
            latency_ms = decision.latency.as_secs_f64() * 1000.0,
            "Decision"
        );
        decision
    }
}

fn confirmation_prompt(intent: &Intent) -> String {
    let verb = intent.operation().unwrap_or(intent.action.as_str()).to_lowercase().replace('_', " ");
    match &intent.target {
        Some(target) => format!("Do you want me to {verb} {target}? Say yes or no."),
        None => format!("Do you want me to {verb}? Say yes or no."),
    }
}
