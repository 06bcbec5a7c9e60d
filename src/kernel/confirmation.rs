use std::time::{Duration, Instant};

use crate::kernel::intent::normalize::{normalize, starts_with_phrase};
use crate::kernel::intent::types::Intent;

const CONFIRM_WORDS: &[&str] = &["yes", "yeah", "yep", "confirm", "proceed", "do it", "okay", "ok"];
const DENY_WORDS: &[&str] = &["no", "nope", "cancel", "stop", "abort"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Confirm,
    Deny,
    Unclear,
}

/// Whole-word prefix match of a reply against the confirm and deny vocabularies.
pub fn classify_reply(text: &str) -> Reply {
    let text = normalize(text);
    if CONFIRM_WORDS.iter().any(|w| starts_with_phrase(&text, w)) {
        Reply::Confirm
    } else if DENY_WORDS.iter().any(|w| starts_with_phrase(&text, w)) {
        Reply::Deny
    } else {
        Reply::Unclear
    }
}

#[derive(Debug, Clone)]
struct Pending {
    intent: Intent,
    requested_at: Instant,
}

/// Holds at most one intent waiting for a yes/no.
#[derive(Debug, Clone)]
pub struct ConfirmationGate {
    pending: Option<Pending>,
    timeout: Duration,
}

impl ConfirmationGate {
    pub fn new(timeout: Duration) -> Self {
        Self { pending: None, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&Intent> {
        self.pending.as_ref().map(|p| &p.intent)
    }

    /// Parks `intent`. Returns whatever was already parked, which is dropped.
    pub fn request(&mut self, intent: Intent, now: Instant) -> Option<Intent> {
        self.pending
            .replace(Pending { intent, requested_at: now })
            .map(|p| p.intent)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|p| now.saturating_duration_since(p.requested_at) > self.timeout)
    }

    pub fn take(&mut self) -> Option<Intent> {
        self.pending.take().map(|p| p.intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::intent::types::IntentType;

    #[test]
    fn replies_match_on_word_prefix() {
        assert_eq!(classify_reply("Yes, please."), Reply::Confirm);
        assert_eq!(classify_reply("do it now"), Reply::Confirm);
        assert_eq!(classify_reply("No thanks"), Reply::Deny);
        assert_eq!(classify_reply("stop"), Reply::Deny);
        assert_eq!(classify_reply("yesterday"), Reply::Unclear);
        assert_eq!(classify_reply("maybe later"), Reply::Unclear);
        assert_eq!(classify_reply(""), Reply::Unclear);
    }

    #[test]
    fn request_returns_the_superseded_intent() {
        let now = Instant::now();
        let mut gate = ConfirmationGate::new(Duration::from_secs(10));
        assert!(gate.request(Intent::new(IntentType::FileOperation, "delete a"), now).is_none());
        let dropped = gate.request(Intent::new(IntentType::SystemControl, "shutdown"), now);
        assert_eq!(dropped.map(|i| i.text), Some("delete a".to_string()));
        assert_eq!(gate.pending().map(|i| i.intent_type), Some(IntentType::SystemControl));
    }

    #[test]
    fn expiry_is_strictly_after_timeout() {
        let now = Instant::now();
        let mut gate = ConfirmationGate::new(Duration::from_secs(10));
        gate.request(Intent::new(IntentType::FileOperation, "delete a"), now);
        assert!(!gate.is_expired(now + Duration::from_secs(10)));
        assert!(gate.is_expired(now + Duration::from_millis(10_001)));
        assert!(gate.take().is_some());
        assert!(!gate.is_pending());
    }
}
