use std::collections::{HashMap, VecDeque};

use super::event::{ConfirmationEvent, TelemetryEvent};
use super::fault::Stage;
use crate::kernel::decision::DecisionStatus;

#[derive(Debug, Clone, Default)]
pub struct TelemetrySnapshot {
    pub decision_stats: DecisionStats,
    pub confirmation_stats: ConfirmationStats,
    pub mode_transitions: u64,
    pub segments_emitted: u64,
    pub interruptions: u64,
    pub faults: HashMap<Stage, u64>,
    pub fatal_faults: u64,
}

#[derive(Debug, Clone, Default)]
pub struct DecisionStats {
    pub approved: u64,
    pub blocked: u64,
    pub needs_confirmation: u64,
    pub avg_latency_us: f64,
    pub max_latency_us: u64,
}

impl DecisionStats {
    pub fn total(&self) -> u64 {
        self.approved + self.blocked + self.needs_confirmation
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfirmationStats {
    pub requested: u64,
    pub approved: u64,
    pub denied: u64,
    pub reprompted: u64,
    pub expired: u64,
    pub superseded: u64,
}

pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();
    let mut total_latency_us: u64 = 0;

    for event in events {
        match event {
            TelemetryEvent::Decision { status, latency_us, .. } => {
                match status {
                    DecisionStatus::Approved => snap.decision_stats.approved += 1,
                    DecisionStatus::Blocked => snap.decision_stats.blocked += 1,
                    DecisionStatus::NeedsConfirmation => snap.decision_stats.needs_confirmation += 1,
                }
                total_latency_us += latency_us;
                snap.decision_stats.max_latency_us = snap.decision_stats.max_latency_us.max(*latency_us);
            }
            TelemetryEvent::ModeTransition { .. } => snap.mode_transitions += 1,
            TelemetryEvent::Confirmation(kind) => {
                let stats = &mut snap.confirmation_stats;
                match kind {
                    ConfirmationEvent::Requested => stats.requested += 1,
                    ConfirmationEvent::Approved => stats.approved += 1,
                    ConfirmationEvent::Denied => stats.denied += 1,
                    ConfirmationEvent::Reprompted => stats.reprompted += 1,
                    ConfirmationEvent::Expired => stats.expired += 1,
                    ConfirmationEvent::Superseded => stats.superseded += 1,
                }
            }
            TelemetryEvent::SegmentEmitted { .. } => snap.segments_emitted += 1,
            TelemetryEvent::Interruption => snap.interruptions += 1,
            TelemetryEvent::Fault { stage, fatal } => {
                *snap.faults.entry(*stage).or_insert(0) += 1;
                if *fatal {
                    snap.fatal_faults += 1;
                }
            }
        }
    }

    let decisions = snap.decision_stats.total();
    if decisions > 0 {
        snap.decision_stats.avg_latency_us = total_latency_us as f64 / decisions as f64;
    }

    snap
}
