//! Frequency / DDoS detector
//!
//! Two sliding windows per address over event timestamps: a short burst
//! window that flags DDoS-style floods and a longer window that flags
//! sustained high-frequency activity.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use super::window::TimeWindow;
use super::Detector;
use crate::monitor::config::FrequencyConfig;
use crate::monitor::errors::Result;
use crate::monitor::types::{ActivityEvent, Finding, FindingType};

#[derive(Debug, Default)]
struct AddressWindow {
    burst: TimeWindow,
    sustained: TimeWindow,
    /// High-frequency reporting is muted until this instant
    quiet_until: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
}

pub struct FrequencyDetector {
    config: FrequencyConfig,
    windows: Mutex<HashMap<String, AddressWindow>>,
}

impl FrequencyDetector {
    pub fn new(config: FrequencyConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn tracked_addresses(&self) -> usize {
        self.windows.lock().len()
    }

    /// Drop addresses idle for a whole sustained window; if that frees
    /// nothing, drop the least recently seen one.
    fn evict(&self, windows: &mut HashMap<String, AddressWindow>, now: DateTime<Utc>) {
        let cutoff = now - self.config.sustained_window();
        windows.retain(|_, w| w.last_seen.map_or(false, |seen| seen > cutoff));

        if windows.len() >= self.config.max_tracked_addresses {
            let stalest = windows
                .iter()
                .min_by_key(|(_, w)| w.last_seen)
                .map(|(address, _)| address.clone());
            if let Some(address) = stalest {
                windows.remove(&address);
            }
        }
    }
}

impl Detector for FrequencyDetector {
    fn name(&self) -> &str {
        "frequency"
    }

    fn evaluate(&self, event: &ActivityEvent) -> Result<Option<Finding>> {
        let now = event.timestamp;
        let mut windows = self.windows.lock();

        if windows.len() >= self.config.max_tracked_addresses
            && !windows.contains_key(&event.address)
        {
            self.evict(&mut windows, now);
        }

        let window = windows.entry(event.address.clone()).or_default();
        window.last_seen = Some(window.last_seen.map_or(now, |seen| seen.max(now)));

        let burst = window.burst.record(now, self.config.ddos_window());
        let sustained = window.sustained.record(now, self.config.sustained_window());

        if burst >= self.config.ddos_threshold {
            window.burst.clear();
            window.quiet_until = Some(now + self.config.sustained_window());
            let details = format!("{} events within {}s", burst, self.config.ddos_window_secs);
            let finding =
                Finding::new(FindingType::DdosAttack, event.address.clone(), now, self.name())
                    .with_details(details);
            return Ok(Some(finding));
        }

        let muted = window.quiet_until.map_or(false, |until| now < until);
        if sustained >= self.config.sustained_threshold && !muted {
            window.quiet_until = Some(now + self.config.sustained_window());
            let details = format!(
                "{} events within {}s",
                sustained, self.config.sustained_window_secs
            );
            let finding =
                Finding::new(FindingType::HighFrequency, event.address.clone(), now, self.name())
                    .with_details(details);
            return Ok(Some(finding));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::{EventKind, Severity};
    use chrono::{Duration, TimeZone};

    fn at(address: &str, secs: i64) -> ActivityEvent {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ActivityEvent::new(address, EventKind::Transfer, 1.0).at(base + Duration::seconds(secs))
    }

    #[test]
    fn test_burst_fires_once() {
        let detector = FrequencyDetector::new(FrequencyConfig::default());

        assert!(detector.evaluate(&at("A", 0)).unwrap().is_none());
        assert!(detector.evaluate(&at("A", 1)).unwrap().is_none());
        let finding = detector.evaluate(&at("A", 2)).unwrap().unwrap();
        assert_eq!(finding.finding_type, FindingType::DdosAttack);
        assert_eq!(finding.severity, Severity::Critical);

        // window was reset
        assert!(detector.evaluate(&at("A", 3)).unwrap().is_none());
    }

    #[test]
    fn test_spread_out_events_do_not_fire() {
        let detector = FrequencyDetector::new(FrequencyConfig::default());
        for i in 0..5 {
            assert!(detector.evaluate(&at("A", i * 11)).unwrap().is_none());
        }
    }

    #[test]
    fn test_addresses_are_independent() {
        let detector = FrequencyDetector::new(FrequencyConfig::default());
        detector.evaluate(&at("A", 0)).unwrap();
        detector.evaluate(&at("B", 0)).unwrap();
        detector.evaluate(&at("A", 1)).unwrap();
        assert!(detector.evaluate(&at("B", 1)).unwrap().is_none());
    }

    #[test]
    fn test_sustained_activity_is_high_frequency() {
        let config = FrequencyConfig {
            sustained_threshold: 5,
            ..FrequencyConfig::default()
        };
        let detector = FrequencyDetector::new(config);

        // two events every 10s never make a burst of three
        let mut fired = Vec::new();
        for i in 0..8 {
            if let Some(finding) = detector.evaluate(&at("A", i * 6)).unwrap() {
                fired.push(finding.finding_type);
            }
        }
        assert_eq!(fired, vec![FindingType::HighFrequency]);
    }

    #[test]
    fn test_late_events_do_not_make_a_burst() {
        let detector = FrequencyDetector::new(FrequencyConfig::default());
        assert!(detector.evaluate(&at("A", 100)).unwrap().is_none());
        assert!(detector.evaluate(&at("A", 0)).unwrap().is_none());
        assert!(detector.evaluate(&at("A", 1)).unwrap().is_none());
    }

    #[test]
    fn test_reordered_burst_still_fires() {
        let detector = FrequencyDetector::new(FrequencyConfig::default());
        assert!(detector.evaluate(&at("A", 5)).unwrap().is_none());
        assert!(detector.evaluate(&at("A", 3)).unwrap().is_none());
        let finding = detector.evaluate(&at("A", 4)).unwrap().unwrap();
        assert_eq!(finding.finding_type, FindingType::DdosAttack);
        assert!(finding.details.starts_with("3 events"));
    }

    #[test]
    fn test_tracked_addresses_stay_bounded() {
        let config = FrequencyConfig {
            max_tracked_addresses: 4,
            ..FrequencyConfig::default()
        };
        let detector = FrequencyDetector::new(config);
        for i in 0..20 {
            detector.evaluate(&at(&format!("0x{}", i), i)).unwrap();
        }
        assert!(detector.tracked_addresses() <= 4);
    }
}
