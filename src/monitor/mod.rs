//! Self-healing attack monitor
//!
//! Ingests abstract chain activity events, scores them with a bank of
//! independent detectors, and drives a two-state recovery mode.
//!
//! ## Components
//! - detector bank: frequency/DDoS, reentrancy, double-spend, gas anomaly, ML confidence
//! - severity classifier: finding type to `low | medium | critical`
//! - blacklist store and bounded attack / ML detection histories
//! - recovery controller: `NORMAL` / `RECOVERY` with sweep on entry
//! - notification hub: broadcast of findings and recovery transitions
//! - feed driver and prometheus metrics

pub mod blacklist;
pub mod config;
pub mod detectors;
pub mod engine;
pub mod errors;
pub mod feed;
pub mod history;
pub mod hub;
pub mod metrics;
pub mod recovery;
pub mod severity;
pub mod types;

pub use blacklist::BlacklistStore;
pub use config::{BlacklistPolicy, MonitorConfig};
pub use detectors::{ConfidenceScorer, Detector, DetectorBank, MlScore};
pub use engine::{IngestReport, Monitor, StatusSummary, SIMULATED_ATTACKER};
pub use errors::{MonitorError, Result};
pub use feed::{spawn_feed, FeedHandle, FeedStats};
pub use history::{AttackHistory, BoundedHistory, MlDetectionLog};
pub use hub::{MonitorEvent, NotificationHub, Subscription, Topic};
pub use metrics::MonitorMetrics;
pub use recovery::{RecoveryController, RecoveryOutcome};
pub use severity::classify;
pub use types::{
    ActivityEvent, BlacklistEntry, ConfidenceTier, EventKind, Finding, FindingType,
    MlDetectionRecord, RawActivity, RecoveryMode, RecoveryState, Severity,
};
