//! Double-spend detector
//!
//! Keeps each address's recent transfers and flags a transfer that reuses a
//! nonce for a different payment, or that pushes the total spent against one
//! balance snapshot past that balance. Exact replays of the same transfer are
//! not a conflict.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use super::Detector;
use crate::monitor::config::DoubleSpendConfig;
use crate::monitor::errors::Result;
use crate::monitor::types::{ActivityEvent, EventKind, Finding, FindingType};

const AMOUNT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
struct TransferRecord {
    timestamp: DateTime<Utc>,
    nonce: Option<u64>,
    counterparty: Option<String>,
    amount: f64,
    balance: Option<f64>,
}

impl TransferRecord {
    fn from_event(event: &ActivityEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            nonce: event.nonce,
            counterparty: event.counterparty.clone(),
            amount: event.magnitude,
            balance: event.balance,
        }
    }

    fn same_payment(&self, other: &TransferRecord) -> bool {
        self.counterparty == other.counterparty
            && (self.amount - other.amount).abs() <= AMOUNT_EPSILON
    }

    fn is_replay_of(&self, other: &TransferRecord) -> bool {
        self.nonce.is_some() && self.nonce == other.nonce && self.same_payment(other)
    }
}

fn same_snapshot(a: f64, b: f64) -> bool {
    (a - b).abs() <= AMOUNT_EPSILON
}

pub struct DoubleSpendDetector {
    config: DoubleSpendConfig,
    transfers: Mutex<HashMap<String, VecDeque<TransferRecord>>>,
}

impl DoubleSpendDetector {
    pub fn new(config: DoubleSpendConfig) -> Self {
        Self {
            config,
            transfers: Mutex::new(HashMap::new()),
        }
    }

    fn conflict(&self, current: &TransferRecord, recent: &[&TransferRecord]) -> Option<String> {
        if let Some(nonce) = current.nonce {
            let reused = recent
                .iter()
                .any(|prior| prior.nonce == Some(nonce) && !prior.same_payment(current));
            if reused {
                return Some(format!("nonce {} reused for a different transfer", nonce));
            }
        }

        if let Some(balance) = current.balance {
            let spent: f64 = recent
                .iter()
                .filter(|prior| prior.balance.map_or(false, |b| same_snapshot(b, balance)))
                .filter(|prior| !current.is_replay_of(prior))
                .map(|prior| prior.amount)
                .sum::<f64>()
                + current.amount;
            if spent > balance + AMOUNT_EPSILON {
                return Some(format!(
                    "{:.4} spent against a balance snapshot of {:.4}",
                    spent, balance
                ));
            }
        }

        None
    }
}

impl Detector for DoubleSpendDetector {
    fn name(&self) -> &str {
        "double-spend"
    }

    fn evaluate(&self, event: &ActivityEvent) -> Result<Option<Finding>> {
        if event.kind != EventKind::Transfer {
            return Ok(None);
        }

        let now = event.timestamp;
        let span = self.config.window();
        let cutoff = now - span;
        let mut transfers = self.transfers.lock();

        if transfers.len() >= self.config.max_tracked_addresses
            && !transfers.contains_key(&event.address)
        {
            transfers.retain(|_, recent| recent.back().map_or(false, |r| r.timestamp > cutoff));
            if transfers.len() >= self.config.max_tracked_addresses {
                transfers.clear();
            }
        }

        let recent = transfers.entry(event.address.clone()).or_default();
        let newest = recent.iter().map(|r| r.timestamp).fold(now, |a, b| a.max(b));
        recent.retain(|r| r.timestamp > newest - span);

        // late events are only compared with transfers within the window on either side
        let nearby: Vec<&TransferRecord> = recent
            .iter()
            .filter(|r| (r.timestamp - now).abs() < span)
            .collect();

        let current = TransferRecord::from_event(event);
        match self.conflict(&current, &nearby) {
            Some(details) => {
                recent.clear();
                Ok(Some(
                    Finding::new(FindingType::DoubleSpend, event.address.clone(), now, self.name())
                        .with_details(details),
                ))
            }
            None => {
                recent.push_back(current);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::Severity;
    use chrono::Duration;

    fn transfer(amount: f64) -> ActivityEvent {
        ActivityEvent::new("0xspender", EventKind::Transfer, amount)
    }

    #[test]
    fn test_nonce_reuse_with_new_counterparty() {
        let detector = DoubleSpendDetector::new(DoubleSpendConfig::default());
        let first = transfer(5.0).with_nonce(7).with_counterparty("0xmerchant");
        let second = transfer(5.0).with_nonce(7).with_counterparty("0xattacker");

        assert!(detector.evaluate(&first).unwrap().is_none());
        let finding = detector.evaluate(&second).unwrap().unwrap();
        assert_eq!(finding.finding_type, FindingType::DoubleSpend);
        assert_eq!(finding.severity, Severity::Critical);
        assert!(finding.details.contains("nonce 7"));
    }

    #[test]
    fn test_exact_replay_is_not_flagged() {
        let detector = DoubleSpendDetector::new(DoubleSpendConfig::default());
        let tx = transfer(5.0)
            .with_nonce(1)
            .with_counterparty("0xmerchant")
            .with_balance(6.0);

        assert!(detector.evaluate(&tx).unwrap().is_none());
        assert!(detector.evaluate(&tx).unwrap().is_none());
    }

    #[test]
    fn test_balance_overdraw() {
        let detector = DoubleSpendDetector::new(DoubleSpendConfig::default());
        let a = transfer(6.0).with_counterparty("0xa").with_balance(10.0);
        let b = transfer(6.0).with_counterparty("0xb").with_balance(10.0);

        assert!(detector.evaluate(&a).unwrap().is_none());
        assert!(detector.evaluate(&b).unwrap().is_some());
    }

    #[test]
    fn test_window_expiry() {
        let detector = DoubleSpendDetector::new(DoubleSpendConfig::default());
        let first = transfer(5.0).with_nonce(3).with_counterparty("0xa");
        let later = transfer(5.0)
            .with_nonce(3)
            .with_counterparty("0xb")
            .at(first.timestamp + Duration::seconds(31));

        detector.evaluate(&first).unwrap();
        assert!(detector.evaluate(&later).unwrap().is_none());
    }

    #[test]
    fn test_late_transfer_outside_window_not_compared() {
        let detector = DoubleSpendDetector::new(DoubleSpendConfig::default());
        let recent = transfer(5.0).with_nonce(9).with_counterparty("0xa");
        let stale = transfer(5.0)
            .with_nonce(9)
            .with_counterparty("0xb")
            .at(recent.timestamp - Duration::seconds(120));

        assert!(detector.evaluate(&recent).unwrap().is_none());
        assert!(detector.evaluate(&stale).unwrap().is_none());
    }

    #[test]
    fn test_late_transfer_inside_window_conflicts() {
        let detector = DoubleSpendDetector::new(DoubleSpendConfig::default());
        let recent = transfer(5.0).with_nonce(4).with_counterparty("0xa");
        let late = transfer(5.0)
            .with_nonce(4)
            .with_counterparty("0xb")
            .at(recent.timestamp - Duration::seconds(10));

        assert!(detector.evaluate(&recent).unwrap().is_none());
        assert!(detector.evaluate(&late).unwrap().is_some());
    }

    #[test]
    fn test_other_kinds_ignored() {
        let detector = DoubleSpendDetector::new(DoubleSpendConfig::default());
        let event = ActivityEvent::new("0xspender", EventKind::GasSpend, 21_000.0).with_nonce(1);
        assert!(detector.evaluate(&event).unwrap().is_none());
        assert!(detector.evaluate(&event).unwrap().is_none());
    }
}
