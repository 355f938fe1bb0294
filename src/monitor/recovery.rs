//! Recovery controller
//!
//! Two-state machine, `NORMAL` and `RECOVERY`. Entering recovery sweeps the
//! attack history into the blacklist and clears it; leaving recovery only
//! flips the mode back. Both commands are idempotent.
//!
//! The controller does not lock anything itself. The monitor calls it with
//! the engine write lock held, so a sweep and a concurrent append never
//! interleave.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

use crate::monitor::blacklist::BlacklistStore;
use crate::monitor::history::AttackHistory;
use crate::monitor::hub::{MonitorEvent, NotificationHub};
use crate::monitor::types::{Finding, RecoveryMode, RecoveryState, Severity};

/// Result of a trigger or exit command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryOutcome {
    pub state: RecoveryState,
    /// False when the command was a no-op
    pub changed: bool,
    /// Findings swept out of the history by this transition
    pub neutralized: usize,
    /// Addresses newly blacklisted by the sweep, in sweep order
    pub blacklisted: Vec<String>,
}

#[derive(Debug, Default)]
pub struct RecoveryController {
    state: RecoveryState,
    active_threats: usize,
    active_critical: usize,
}

impl RecoveryController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &RecoveryState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.mode == RecoveryMode::Recovery
    }

    pub fn active_threats(&self) -> usize {
        self.active_threats
    }

    pub fn active_critical(&self) -> usize {
        self.active_critical
    }

    /// Count a new finding as an active threat
    pub fn record_threat(&mut self, severity: Severity) {
        self.active_threats += 1;
        if severity == Severity::Critical {
            self.active_critical += 1;
        }
    }

    /// Stop counting a finding the history evicted. Active threats always
    /// match what a sweep would clear.
    pub fn retire_threat(&mut self, severity: Severity) {
        self.active_threats = self.active_threats.saturating_sub(1);
        if severity == Severity::Critical {
            self.active_critical = self.active_critical.saturating_sub(1);
        }
    }

    /// Enter recovery. No-op when already active.
    pub fn trigger(
        &mut self,
        history: &mut AttackHistory,
        blacklist: &BlacklistStore,
        hub: &NotificationHub,
        now: DateTime<Utc>,
    ) -> RecoveryOutcome {
        if self.is_active() {
            return self.unchanged();
        }

        let today = now.date_naive();
        let mut blacklisted = Vec::new();
        for (address, reason) in sweep_targets(history) {
            if blacklist.add(&address, &reason, today) {
                blacklisted.push(address);
            }
        }
        let neutralized = history.clear();
        self.active_threats = 0;
        self.active_critical = 0;
        self.transition(RecoveryMode::Recovery, now);

        info!(
            neutralized,
            blacklisted = blacklisted.len(),
            transition = self.state.transition_count,
            "Recovery mode entered"
        );

        hub.publish(MonitorEvent::RecoveryChanged {
            active: true,
            neutralized,
            state: self.state.clone(),
        });

        RecoveryOutcome {
            state: self.state.clone(),
            changed: true,
            neutralized,
            blacklisted,
        }
    }

    /// Leave recovery. No-op when already normal. The blacklist and the
    /// cleared history are not restored.
    pub fn exit(&mut self, hub: &NotificationHub, now: DateTime<Utc>) -> RecoveryOutcome {
        if !self.is_active() {
            return self.unchanged();
        }

        self.transition(RecoveryMode::Normal, now);
        info!(transition = self.state.transition_count, "Recovery mode exited");

        hub.publish(MonitorEvent::RecoveryChanged {
            active: false,
            neutralized: 0,
            state: self.state.clone(),
        });

        RecoveryOutcome {
            state: self.state.clone(),
            changed: true,
            neutralized: 0,
            blacklisted: Vec::new(),
        }
    }

    fn transition(&mut self, mode: RecoveryMode, now: DateTime<Utc>) {
        self.state.mode = mode;
        self.state.transition_count += 1;
        self.state.last_transition_at = Some(now);
    }

    fn unchanged(&self) -> RecoveryOutcome {
        RecoveryOutcome {
            state: self.state.clone(),
            changed: false,
            neutralized: 0,
            blacklisted: Vec::new(),
        }
    }
}

/// Distinct addresses in order of first appearance, each with the label of
/// its most severe finding (latest wins on ties)
fn sweep_targets(history: &AttackHistory) -> Vec<(String, String)> {
    let mut order: Vec<&str> = Vec::new();
    let mut worst: HashMap<&str, &Finding> = HashMap::new();

    for finding in history.iter() {
        let address = finding.address.as_str();
        let replace = match worst.get(address) {
            None => {
                order.push(address);
                true
            }
            Some(current) => finding.severity >= current.severity,
        };
        if replace {
            worst.insert(address, finding);
        }
    }

    order
        .into_iter()
        .filter_map(|address| {
            worst
                .get(address)
                .map(|finding| (address.to_string(), finding.finding_type.label().to_string()))
        })
        .collect()
}
