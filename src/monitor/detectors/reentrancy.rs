//! Reentrancy detector
//!
//! Flags contract calls that nest too deep, or a burst of calls re-entering
//! through the same transaction lineage.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use super::window::TimeWindow;
use super::Detector;
use crate::monitor::config::ReentrancyConfig;
use crate::monitor::errors::Result;
use crate::monitor::types::{ActivityEvent, EventKind, Finding, FindingType};

pub struct ReentrancyDetector {
    config: ReentrancyConfig,
    lineages: Mutex<HashMap<String, TimeWindow>>,
}

impl ReentrancyDetector {
    pub fn new(config: ReentrancyConfig) -> Self {
        Self {
            config,
            lineages: Mutex::new(HashMap::new()),
        }
    }

    /// Record a call for `lineage`; returns the burst size when it trips
    fn record_call(&self, lineage: &str, now: DateTime<Utc>) -> Option<usize> {
        let span = self.config.lineage_window();
        let cutoff = now - span;
        let mut lineages = self.lineages.lock();

        if lineages.len() >= self.config.max_tracked_lineages && !lineages.contains_key(lineage) {
            lineages.retain(|_, calls| calls.newest().map_or(false, |ts| ts > cutoff));
            if lineages.len() >= self.config.max_tracked_lineages {
                lineages.clear();
            }
        }

        let count = lineages
            .entry(lineage.to_string())
            .or_default()
            .record(now, span);

        if count >= self.config.lineage_burst {
            lineages.remove(lineage);
            Some(count)
        } else {
            None
        }
    }
}

impl Detector for ReentrancyDetector {
    fn name(&self) -> &str {
        "reentrancy"
    }

    fn evaluate(&self, event: &ActivityEvent) -> Result<Option<Finding>> {
        if event.kind != EventKind::ContractCall {
            return Ok(None);
        }

        let burst = event
            .lineage
            .as_deref()
            .and_then(|lineage| self.record_call(lineage, event.timestamp));

        let details = match (event.call_depth, burst) {
            (Some(depth), _) if depth >= self.config.max_call_depth => {
                format!("call depth {} reached limit {}", depth, self.config.max_call_depth)
            }
            (_, Some(count)) => format!(
                "{} calls in one lineage within {}s",
                count, self.config.lineage_window_secs
            ),
            _ => return Ok(None),
        };

        Ok(Some(
            Finding::new(
                FindingType::Reentrancy,
                event.address.clone(),
                event.timestamp,
                self.name(),
            )
            .with_details(details),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn call(depth: Option<u32>, lineage: Option<&str>, offset_ms: i64) -> ActivityEvent {
        let mut event = ActivityEvent::new("0xcontract", EventKind::ContractCall, 0.0)
            .at(Utc::now() + Duration::milliseconds(offset_ms));
        event.call_depth = depth;
        event.lineage = lineage.map(str::to_string);
        event
    }

    #[test]
    fn test_deep_call_fires() {
        let detector = ReentrancyDetector::new(ReentrancyConfig::default());
        assert!(detector.evaluate(&call(Some(3), None, 0)).unwrap().is_none());
        let finding = detector.evaluate(&call(Some(4), None, 0)).unwrap().unwrap();
        assert_eq!(finding.finding_type, FindingType::Reentrancy);
        assert!(finding.details.contains("call depth 4"));
    }

    #[test]
    fn test_lineage_burst_fires_once() {
        let detector = ReentrancyDetector::new(ReentrancyConfig::default());
        let mut fired = 0;
        for i in 0..9 {
            if detector
                .evaluate(&call(Some(1), Some("0xtxhash"), i * 100))
                .unwrap()
                .is_some()
            {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_lineage_burst_ignores_stale_late_calls() {
        let detector = ReentrancyDetector::new(ReentrancyConfig::default());
        // one fresh call, then four that arrive late from a minute earlier
        assert!(detector
            .evaluate(&call(Some(1), Some("0xtx"), 60_000))
            .unwrap()
            .is_none());
        for i in 0..4 {
            assert!(detector
                .evaluate(&call(Some(1), Some("0xtx"), i * 100))
                .unwrap()
                .is_none());
        }
    }

    #[test]
    fn test_reordered_lineage_burst_fires() {
        let detector = ReentrancyDetector::new(ReentrancyConfig::default());
        let offsets = [400, 0, 300, 100, 200];
        let fired: Vec<bool> = offsets
            .iter()
            .map(|offset| {
                detector
                    .evaluate(&call(Some(1), Some("0xtx"), *offset))
                    .unwrap()
                    .is_some()
            })
            .collect();
        assert_eq!(fired, vec![false, false, false, false, true]);
    }

    #[test]
    fn test_non_contract_events_ignored() {
        let detector = ReentrancyDetector::new(ReentrancyConfig::default());
        let event = ActivityEvent::new("0xabc", EventKind::Transfer, 1.0).with_call_depth(10);
        assert!(detector.evaluate(&event).unwrap().is_none());
    }
}
