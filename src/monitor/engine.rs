//! Monitor facade
//!
//! Composes the detector bank, blacklist, histories, recovery controller,
//! hub and metrics behind one ingestion entry point and a small
//! query/command surface. Construct it once and share it by `Arc`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::monitor::blacklist::BlacklistStore;
use crate::monitor::config::MonitorConfig;
use crate::monitor::detectors::{ConfidenceScorer, DetectorBank};
use crate::monitor::errors::Result;
use crate::monitor::history::{AttackHistory, MlDetectionLog};
use crate::monitor::hub::{MonitorEvent, NotificationHub, Subscription, Topic};
use crate::monitor::metrics::MonitorMetrics;
use crate::monitor::recovery::{RecoveryController, RecoveryOutcome};
use crate::monitor::types::{
    ActivityEvent, BlacklistEntry, Finding, FindingType, MlDetectionRecord, RawActivity,
    RecoveryMode, RecoveryState, Severity,
};

/// Address used when a simulation names none
pub const SIMULATED_ATTACKER: &str = "0xSimulatedAttacker";

/// Detector name recorded on simulated findings
pub const SIMULATION_DETECTOR: &str = "simulation";

/// What happened to one ingested event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub address: String,
    /// Sender was already blacklisted; the event was not scored
    pub blocked: bool,
    pub findings: Vec<Finding>,
    /// Addresses blacklisted while committing this event
    pub blacklisted: Vec<String>,
    pub detector_failures: Vec<String>,
    pub recovery_triggered: bool,
}

/// Point-in-time view of the monitor
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub mode: RecoveryMode,
    pub recovery: RecoveryState,
    pub active_threats: usize,
    pub active_critical: usize,
    pub blacklist_size: usize,
    pub history_len: usize,
    pub ml_detections: usize,
    pub findings_total: u64,
    pub events_ingested: u64,
    pub events_blocked: u64,
    pub events_rejected: u64,
    pub detectors: Vec<String>,
    pub subscribers: usize,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
}

/// Mutable state guarded by the engine lock
struct EngineState {
    history: AttackHistory,
    ml_log: MlDetectionLog,
    recovery: RecoveryController,
    findings_total: u64,
}

struct CommitOutcome {
    blacklisted: Vec<String>,
    recovery_triggered: bool,
}

pub struct Monitor {
    config: MonitorConfig,
    bank: DetectorBank,
    blacklist: BlacklistStore,
    hub: NotificationHub,
    metrics: MonitorMetrics,
    state: RwLock<EngineState>,
    started_at: DateTime<Utc>,
}

impl Monitor {
    /// Monitor with the built-in detectors and default scorer
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let bank = DetectorBank::from_config(&config);
        Self::with_detector_bank(config, bank)
    }

    /// Monitor with the built-in detectors and a custom confidence scorer
    pub fn with_scorer(config: MonitorConfig, scorer: Arc<dyn ConfidenceScorer>) -> Result<Self> {
        let bank = DetectorBank::with_scorer(&config, scorer);
        Self::with_detector_bank(config, bank)
    }

    pub fn with_detector_bank(config: MonitorConfig, bank: DetectorBank) -> Result<Self> {
        config.validate()?;
        let metrics = MonitorMetrics::new()?;
        let started_at = Utc::now();

        let blacklist = BlacklistStore::new();
        let today = started_at.date_naive();
        for seed in &config.recovery.seed_blacklist {
            blacklist.add(&seed.address, &seed.reason, today);
        }
        metrics.set_blacklist_size(blacklist.len());

        let state = EngineState {
            history: AttackHistory::new(config.history.attack_capacity),
            ml_log: MlDetectionLog::new(config.history.ml_capacity),
            recovery: RecoveryController::new(),
            findings_total: 0,
        };

        info!(
            detectors = ?bank.names(),
            history_capacity = config.history.attack_capacity,
            blacklist_policy = %config.recovery.blacklist_policy,
            seeded = blacklist.len(),
            "Monitor initialized"
        );

        Ok(Self {
            hub: NotificationHub::new(config.hub.channel_capacity),
            config,
            bank,
            blacklist,
            metrics,
            state: RwLock::new(state),
            started_at,
        })
    }

    /// Score one event and commit whatever it produced
    pub fn ingest(&self, event: ActivityEvent) -> Result<IngestReport> {
        if let Err(err) = event.validate() {
            self.metrics.events_rejected.inc();
            debug!(error = %err, "Event rejected");
            return Err(err);
        }

        if self.blacklist.contains(&event.address) {
            self.metrics.events_blocked.inc();
            debug!(
                address = %event.address,
                kind = %event.kind,
                "Event from blacklisted address blocked"
            );
            return Ok(IngestReport {
                address: event.address,
                blocked: true,
                findings: Vec::new(),
                blacklisted: Vec::new(),
                detector_failures: Vec::new(),
                recovery_triggered: false,
            });
        }

        let timer = self.metrics.ingest_duration.start_timer();
        let evaluation = self.bank.evaluate(&event);
        let detector_failures = evaluation.failed_detectors();
        for detector in &detector_failures {
            self.metrics.record_detector_failure(detector);
        }

        let outcome = self.commit(&evaluation.findings, event.timestamp);
        self.metrics.events_ingested.inc();
        timer.observe_duration();

        debug!(
            address = %event.address,
            kind = %event.kind,
            findings = evaluation.findings.len(),
            "Event scored"
        );

        Ok(IngestReport {
            address: event.address,
            blocked: false,
            findings: evaluation.findings,
            blacklisted: outcome.blacklisted,
            detector_failures,
            recovery_triggered: outcome.recovery_triggered,
        })
    }

    /// Normalize a wire record, then ingest it
    pub fn ingest_raw(&self, raw: RawActivity) -> Result<IngestReport> {
        match ActivityEvent::try_from(raw) {
            Ok(event) => self.ingest(event),
            Err(err) => {
                self.metrics.events_rejected.inc();
                debug!(error = %err, "Wire record rejected");
                Err(err)
            }
        }
    }

    /// Record a finding without running detectors. Blank inputs fall back to
    /// `Unknown Attack` from `0xSimulatedAttacker`.
    pub fn simulate(&self, attack_type: &str, address: &str) -> Finding {
        let address = match address.trim() {
            "" => SIMULATED_ATTACKER,
            trimmed => trimmed,
        };
        let finding = Finding::new(
            FindingType::parse_label(attack_type),
            address,
            Utc::now(),
            SIMULATION_DETECTOR,
        )
        .with_details("simulated attack");

        info!(
            attack_type = %finding.finding_type,
            address = %finding.address,
            severity = %finding.severity,
            "Simulating attack"
        );
        self.commit(std::slice::from_ref(&finding), finding.timestamp);
        finding
    }

    /// Append, classify side effects and publish, all under the engine lock
    fn commit(&self, findings: &[Finding], at: DateTime<Utc>) -> CommitOutcome {
        let mut outcome = CommitOutcome {
            blacklisted: Vec::new(),
            recovery_triggered: false,
        };
        if findings.is_empty() {
            return outcome;
        }

        let mut guard = self.state.write();
        let state = &mut *guard;
        let policy = self.config.recovery.blacklist_policy;
        let today = at.date_naive();

        for finding in findings {
            warn!(
                attack_type = %finding.finding_type,
                address = %finding.address,
                severity = %finding.severity,
                detector = %finding.detector,
                details = %finding.details,
                "Attack detected"
            );

            state.recovery.record_threat(finding.severity);
            if let Some(evicted) = state.history.append(finding.clone()) {
                state.recovery.retire_threat(evicted.severity);
            }
            if let Some(record) = MlDetectionRecord::from_finding(finding) {
                state.ml_log.append(record);
            }
            state.findings_total += 1;
            self.metrics.record_finding(finding.severity);

            let containment = state.recovery.is_active() && finding.severity >= Severity::Medium;
            if (containment || policy.auto_blacklists(finding.severity))
                && self
                    .blacklist
                    .add(&finding.address, finding.finding_type.label(), today)
            {
                info!(
                    address = %finding.address,
                    reason = %finding.finding_type,
                    "Address blacklisted"
                );
                outcome.blacklisted.push(finding.address.clone());
            }

            self.hub.publish(MonitorEvent::FindingCreated(finding.clone()));
        }

        if let Some(limit) = self.config.recovery.auto_trigger_critical {
            let limit = limit as usize;
            if !state.recovery.is_active() && state.recovery.active_critical() >= limit {
                info!(
                    active_critical = state.recovery.active_critical(),
                    limit,
                    "Auto-triggering recovery"
                );
                let triggered =
                    state
                        .recovery
                        .trigger(&mut state.history, &self.blacklist, &self.hub, Utc::now());
                if triggered.changed {
                    self.metrics.record_recovery_transition(true);
                    outcome.blacklisted.extend(triggered.blacklisted);
                    outcome.recovery_triggered = true;
                }
            }
        }

        self.metrics.set_blacklist_size(self.blacklist.len());
        outcome
    }

    /// Enter recovery mode
    pub fn trigger_recovery(&self) -> RecoveryOutcome {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let outcome = state
            .recovery
            .trigger(&mut state.history, &self.blacklist, &self.hub, Utc::now());
        if outcome.changed {
            self.metrics.record_recovery_transition(true);
            self.metrics.set_blacklist_size(self.blacklist.len());
        } else {
            debug!("Recovery already active");
        }
        outcome
    }

    /// Leave recovery mode
    pub fn exit_recovery(&self) -> RecoveryOutcome {
        let mut guard = self.state.write();
        let outcome = guard.recovery.exit(&self.hub, Utc::now());
        if outcome.changed {
            self.metrics.record_recovery_transition(false);
        } else {
            debug!("Recovery not active");
        }
        outcome
    }

    pub fn status(&self) -> StatusSummary {
        let state = self.state.read();
        let now = Utc::now();
        StatusSummary {
            mode: state.recovery.state().mode,
            recovery: state.recovery.state().clone(),
            active_threats: state.recovery.active_threats(),
            active_critical: state.recovery.active_critical(),
            blacklist_size: self.blacklist.len(),
            history_len: state.history.len(),
            ml_detections: state.ml_log.len(),
            findings_total: state.findings_total,
            events_ingested: self.metrics.events_ingested.get(),
            events_blocked: self.metrics.events_blocked.get(),
            events_rejected: self.metrics.events_rejected.get(),
            detectors: self.bank.names(),
            subscribers: self.hub.subscriber_count(),
            started_at: self.started_at,
            uptime_secs: (now - self.started_at).num_seconds(),
        }
    }

    pub fn blacklist(&self) -> Vec<BlacklistEntry> {
        self.blacklist.list()
    }

    pub fn is_blacklisted(&self, address: &str) -> bool {
        self.blacklist.contains(address)
    }

    /// Up to `k` findings, newest first
    pub fn recent_attacks(&self, k: usize) -> Vec<Finding> {
        self.state.read().history.recent(k)
    }

    /// Up to `k` ML detections, newest first
    pub fn recent_ml_detections(&self, k: usize) -> Vec<MlDetectionRecord> {
        self.state.read().ml_log.recent(k)
    }

    pub fn recovery_state(&self) -> RecoveryState {
        self.state.read().recovery.state().clone()
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.hub.subscribe(topic)
    }

    pub fn metrics(&self) -> &MonitorMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }
}
