use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tracing::debug;

use crate::monitor::errors::{MonitorError, Result};
use crate::monitor::types::Severity;

/// Prometheus metrics owned by one monitor instance
pub struct MonitorMetrics {
    registry: Registry,

    // Ingestion
    pub events_ingested: IntCounter,
    pub events_rejected: IntCounter,
    pub events_blocked: IntCounter,
    pub ingest_duration: Histogram,

    // Detection
    pub findings: IntCounterVec,
    pub detector_failures: IntCounterVec,

    // Containment
    pub blacklist_size: IntGauge,
    pub recovery_transitions: IntCounter,
    pub recovery_active: IntGauge,
}

impl MonitorMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let events_ingested =
            IntCounter::new("monitor_events_ingested_total", "Total number of events scored")?;
        let events_rejected = IntCounter::new(
            "monitor_events_rejected_total",
            "Total number of events rejected at the ingestion boundary",
        )?;
        let events_blocked = IntCounter::new(
            "monitor_events_blocked_total",
            "Total number of events from blacklisted addresses",
        )?;
        let ingest_duration = Histogram::with_opts(HistogramOpts::new(
            "monitor_ingest_duration_seconds",
            "Time spent scoring one event",
        ))?;

        let findings = IntCounterVec::new(
            Opts::new("monitor_findings_total", "Findings produced, by severity"),
            &["severity"],
        )?;
        let detector_failures = IntCounterVec::new(
            Opts::new("monitor_detector_failures_total", "Isolated detector failures"),
            &["detector"],
        )?;

        let blacklist_size =
            IntGauge::new("monitor_blacklist_size", "Number of blacklisted addresses")?;
        let recovery_transitions = IntCounter::new(
            "monitor_recovery_transitions_total",
            "Total number of recovery mode transitions",
        )?;
        let recovery_active =
            IntGauge::new("monitor_recovery_active", "1 while recovery mode is active")?;

        registry.register(Box::new(events_ingested.clone()))?;
        registry.register(Box::new(events_rejected.clone()))?;
        registry.register(Box::new(events_blocked.clone()))?;
        registry.register(Box::new(ingest_duration.clone()))?;
        registry.register(Box::new(findings.clone()))?;
        registry.register(Box::new(detector_failures.clone()))?;
        registry.register(Box::new(blacklist_size.clone()))?;
        registry.register(Box::new(recovery_transitions.clone()))?;
        registry.register(Box::new(recovery_active.clone()))?;

        debug!("Monitor metrics initialized");

        Ok(Self {
            registry,
            events_ingested,
            events_rejected,
            events_blocked,
            ingest_duration,
            findings,
            detector_failures,
            blacklist_size,
            recovery_transitions,
            recovery_active,
        })
    }

    /// Prometheus text exposition
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MonitorError::Serialization(e.to_string()))
    }

    pub fn record_finding(&self, severity: Severity) {
        self.findings.with_label_values(&[severity.as_str()]).inc();
    }

    pub fn record_detector_failure(&self, detector: &str) {
        self.detector_failures.with_label_values(&[detector]).inc();
    }

    pub fn record_recovery_transition(&self, active: bool) {
        self.recovery_transitions.inc();
        self.recovery_active.set(i64::from(active));
    }

    pub fn set_blacklist_size(&self, size: usize) {
        self.blacklist_size.set(size as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_contains_recorded_values() {
        let metrics = MonitorMetrics::new().unwrap();
        metrics.events_ingested.inc();
        metrics.record_finding(Severity::Critical);
        metrics.record_detector_failure("gas");
        metrics.record_recovery_transition(true);
        metrics.set_blacklist_size(3);

        let text = metrics.export().unwrap();
        assert!(text.contains("monitor_events_ingested_total 1"));
        assert!(text.contains("monitor_findings_total{severity=\"critical\"} 1"));
        assert!(text.contains("monitor_detector_failures_total{detector=\"gas\"} 1"));
        assert!(text.contains("monitor_recovery_active 1"));
        assert!(text.contains("monitor_blacklist_size 3"));
    }

    #[test]
    fn test_instances_do_not_share_registry() {
        let a = MonitorMetrics::new().unwrap();
        let b = MonitorMetrics::new().unwrap();
        a.events_blocked.inc();
        assert_eq!(a.events_blocked.get(), 1);
        assert_eq!(b.events_blocked.get(), 0);
    }
}
