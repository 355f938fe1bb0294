//! Core value types: activity events, findings, blacklist entries, recovery state

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::monitor::errors::{MonitorError, Result};
use crate::monitor::severity::classify;

/// Kind of on-chain activity carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Transfer,
    ContractCall,
    GasSpend,
    Other,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Transfer => "transfer",
            EventKind::ContractCall => "contract-call",
            EventKind::GasSpend => "gas-spend",
            EventKind::Other => "other",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "transfer" => Ok(EventKind::Transfer),
            "contract-call" | "contractcall" | "call" => Ok(EventKind::ContractCall),
            "gas-spend" | "gasspend" | "gas" => Ok(EventKind::GasSpend),
            "other" => Ok(EventKind::Other),
            other => Err(MonitorError::invalid_event(format!("unknown event kind '{}'", other))),
        }
    }
}

/// Normalized activity event handed to the engine by a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Acting address
    pub address: String,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    /// Amount for transfers, gas units for gas-spend, rate for anything else
    pub magnitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    /// Balance snapshot the transfer was built against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_depth: Option<u32>,
    /// Transaction hash grouping nested calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage: Option<String>,
}

impl ActivityEvent {
    pub fn new(address: impl Into<String>, kind: EventKind, magnitude: f64) -> Self {
        Self {
            address: address.into(),
            kind,
            timestamp: Utc::now(),
            magnitude,
            counterparty: None,
            nonce: None,
            balance: None,
            call_depth: None,
            lineage: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = Some(counterparty.into());
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_balance(mut self, balance: f64) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn with_call_depth(mut self, depth: u32) -> Self {
        self.call_depth = Some(depth);
        self
    }

    pub fn with_lineage(mut self, lineage: impl Into<String>) -> Self {
        self.lineage = Some(lineage.into());
        self
    }

    /// Reject events the detectors cannot reason about
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(MonitorError::invalid_event("missing address"));
        }
        if !self.magnitude.is_finite() {
            return Err(MonitorError::invalid_event(format!(
                "magnitude must be finite, got {}",
                self.magnitude
            )));
        }
        if let Some(balance) = self.balance {
            if !balance.is_finite() {
                return Err(MonitorError::invalid_event("balance must be finite"));
            }
        }
        Ok(())
    }
}

/// Wire form of an activity event as pushed by a feed or the HTTP relay.
/// Every field is optional here; `ActivityEvent::try_from` enforces the schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawActivity {
    pub address: Option<String>,
    pub kind: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(alias = "rate", alias = "amount")]
    pub magnitude: Option<f64>,
    pub counterparty: Option<String>,
    pub nonce: Option<u64>,
    pub balance: Option<f64>,
    pub call_depth: Option<u32>,
    pub lineage: Option<String>,
}

impl TryFrom<RawActivity> for ActivityEvent {
    type Error = MonitorError;

    fn try_from(raw: RawActivity) -> Result<Self> {
        let address = raw
            .address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| MonitorError::invalid_event("missing address"))?;

        let kind = match raw.kind {
            Some(kind) => kind.parse()?,
            None => return Err(MonitorError::invalid_event("missing kind")),
        };

        let event = ActivityEvent {
            address,
            kind,
            timestamp: raw.timestamp.unwrap_or_else(Utc::now),
            magnitude: raw.magnitude.unwrap_or(0.0),
            counterparty: raw.counterparty.filter(|c| !c.trim().is_empty()),
            nonce: raw.nonce,
            balance: raw.balance,
            call_depth: raw.call_depth,
            lineage: raw.lineage.filter(|l| !l.trim().is_empty()),
        };
        event.validate()?;
        Ok(event)
    }
}

/// Finding severity, ordered `Low < Medium < Critical`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attack category of a finding
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FindingType {
    DdosAttack,
    DoubleSpend,
    Reentrancy,
    HighFrequency,
    GasGriefing,
    FailedTransactions,
    SybilAttack,
    ExcessiveGas,
    /// Produced by a confidence scorer; carries the scorer's label
    MlAnomaly(String),
    /// Label that matches no known category
    Unknown(String),
}

impl FindingType {
    /// Every enumerable category, used by exhaustive table tests and the API
    pub const KNOWN: [FindingType; 8] = [
        FindingType::DdosAttack,
        FindingType::DoubleSpend,
        FindingType::Reentrancy,
        FindingType::HighFrequency,
        FindingType::GasGriefing,
        FindingType::FailedTransactions,
        FindingType::SybilAttack,
        FindingType::ExcessiveGas,
    ];

    pub fn label(&self) -> &str {
        match self {
            FindingType::DdosAttack => "Potential DDoS Attack",
            FindingType::DoubleSpend => "Potential Double Spending",
            FindingType::Reentrancy => "Potential Reentrancy Attack",
            FindingType::HighFrequency => "High Transaction Frequency",
            FindingType::GasGriefing => "Gas Griefing",
            FindingType::FailedTransactions => "Multiple Failed Transactions",
            FindingType::SybilAttack => "Sybil Attack",
            FindingType::ExcessiveGas => "Excessive Gas Usage",
            FindingType::MlAnomaly(label) | FindingType::Unknown(label) => label,
        }
    }

    /// Map a free-text label (simulation commands, dashboards) onto a category.
    /// Never fails: unrecognized labels become `Unknown`.
    pub fn parse_label(label: &str) -> Self {
        let trimmed = label.trim();
        let normalized = trimmed
            .to_ascii_lowercase()
            .replace(['-', '_'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let normalized = normalized.strip_prefix("potential ").unwrap_or(&normalized);

        match normalized {
            "" => FindingType::Unknown("Unknown Attack".to_string()),
            "ddos" | "ddos attack" | "dos" | "dos attack" => FindingType::DdosAttack,
            "double spend" | "double spending" | "double spend attack" => FindingType::DoubleSpend,
            "reentrancy" | "reentrancy attack" | "re entrancy" => FindingType::Reentrancy,
            "high frequency" | "high transaction frequency" => FindingType::HighFrequency,
            "gas griefing" | "gas grief" => FindingType::GasGriefing,
            "multiple failed transactions" | "failed transactions" => {
                FindingType::FailedTransactions
            }
            "sybil" | "sybil attack" => FindingType::SybilAttack,
            "excessive gas" | "excessive gas usage" => FindingType::ExcessiveGas,
            _ => FindingType::Unknown(trimmed.to_string()),
        }
    }

    pub fn is_ml(&self) -> bool {
        matches!(self, FindingType::MlAnomaly(_))
    }
}

impl fmt::Display for FindingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for FindingType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Structured record of a suspected attack. Built once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub finding_type: FindingType,
    pub address: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Name of the producing detector, or `simulation`
    pub detector: String,
    pub details: String,
}

impl Finding {
    /// Heuristic finding; severity comes from the classifier table
    pub fn new(
        finding_type: FindingType,
        address: impl Into<String>,
        timestamp: DateTime<Utc>,
        detector: &str,
    ) -> Self {
        let severity = classify(&finding_type, None);
        Self {
            id: Uuid::new_v4(),
            finding_type,
            address: address.into(),
            timestamp,
            severity,
            confidence: None,
            detector: detector.to_string(),
            details: String::new(),
        }
    }

    /// Confidence-scored finding; `confidence` is clamped to `[0, 1]`
    pub fn scored(
        label: impl Into<String>,
        confidence: f64,
        address: impl Into<String>,
        timestamp: DateTime<Utc>,
        detector: &str,
    ) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        let finding_type = FindingType::MlAnomaly(label.into());
        let severity = classify(&finding_type, Some(confidence));
        Self {
            id: Uuid::new_v4(),
            finding_type,
            address: address.into(),
            timestamp,
            severity,
            confidence: Some(confidence),
            detector: detector.to_string(),
            details: String::new(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }
}

/// Display tier of a confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            Self::High
        } else if confidence >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// One blacklisted address. `date` is the day it was first listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub address: String,
    pub reason: String,
    pub date: NaiveDate,
}

/// Rolling record of confidence-scored detections
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MlDetectionRecord {
    #[serde(rename = "type")]
    pub label: String,
    pub confidence: f64,
    pub tier: ConfidenceTier,
    pub address: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl MlDetectionRecord {
    /// `None` unless the finding carries a confidence
    pub fn from_finding(finding: &Finding) -> Option<Self> {
        let confidence = finding.confidence?;
        Some(Self {
            label: finding.finding_type.label().to_string(),
            confidence,
            tier: ConfidenceTier::from_confidence(confidence),
            address: finding.address.clone(),
            timestamp: finding.timestamp,
        })
    }
}

/// Process-wide recovery mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryMode {
    Normal,
    Recovery,
}

impl fmt::Display for RecoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryMode::Normal => f.write_str("NORMAL"),
            RecoveryMode::Recovery => f.write_str("RECOVERY"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryState {
    pub mode: RecoveryMode,
    pub transition_count: u64,
    pub last_transition_at: Option<DateTime<Utc>>,
}

impl Default for RecoveryState {
    fn default() -> Self {
        Self {
            mode: RecoveryMode::Normal,
            transition_count: 0,
            last_transition_at: None,
        }
    }
}
