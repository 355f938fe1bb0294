//! Monitor configuration
//!
//! Every section has defaults, so a config file only needs the values it
//! changes. Files ending in `.toml` are read as TOML, anything else as JSON.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::monitor::errors::{MonitorError, Result};
use crate::monitor::types::Severity;

pub const ENV_HISTORY_CAPACITY: &str = "MONITOR_HISTORY_CAPACITY";
pub const ENV_DDOS_THRESHOLD: &str = "MONITOR_DDOS_THRESHOLD";
pub const ENV_BLACKLIST_POLICY: &str = "MONITOR_BLACKLIST_POLICY";
pub const ENV_AUTO_TRIGGER_CRITICAL: &str = "MONITOR_AUTO_TRIGGER_CRITICAL";

/// Monitor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub history: HistoryConfig,
    pub frequency: FrequencyConfig,
    pub reentrancy: ReentrancyConfig,
    pub double_spend: DoubleSpendConfig,
    pub gas: GasConfig,
    pub ml: MlConfig,
    pub recovery: RecoveryConfig,
    pub hub: HubConfig,
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Findings kept in the attack history
    pub attack_capacity: usize,
    /// Records kept in the ML detection log
    pub ml_capacity: usize,
    /// How many records the "recent" views return
    pub recent_default: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            attack_capacity: 50,
            ml_capacity: 50,
            recent_default: 10,
        }
    }
}

/// Frequency / DDoS detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyConfig {
    pub enabled: bool,
    pub ddos_window_secs: u64,
    /// Events inside the DDoS window that make a burst
    pub ddos_threshold: usize,
    pub sustained_window_secs: u64,
    pub sustained_threshold: usize,
    /// Above this many tracked addresses idle ones are pruned
    pub max_tracked_addresses: usize,
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ddos_window_secs: 10,
            ddos_threshold: 3,
            sustained_window_secs: 60,
            sustained_threshold: 10,
            max_tracked_addresses: 10_000,
        }
    }
}

impl FrequencyConfig {
    pub fn ddos_window(&self) -> Duration {
        secs(self.ddos_window_secs)
    }

    pub fn sustained_window(&self) -> Duration {
        secs(self.sustained_window_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReentrancyConfig {
    pub enabled: bool,
    pub max_call_depth: u32,
    /// Calls sharing one lineage that make a burst
    pub lineage_burst: usize,
    pub lineage_window_secs: u64,
    pub max_tracked_lineages: usize,
}

impl Default for ReentrancyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_call_depth: 4,
            lineage_burst: 5,
            lineage_window_secs: 5,
            max_tracked_lineages: 10_000,
        }
    }
}

impl ReentrancyConfig {
    pub fn lineage_window(&self) -> Duration {
        secs(self.lineage_window_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoubleSpendConfig {
    pub enabled: bool,
    pub window_secs: u64,
    pub max_tracked_addresses: usize,
}

impl Default for DoubleSpendConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 30,
            max_tracked_addresses: 10_000,
        }
    }
}

impl DoubleSpendConfig {
    pub fn window(&self) -> Duration {
        secs(self.window_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    pub enabled: bool,
    /// Hard ceiling; anything above is gas griefing
    pub max_gas: f64,
    pub zscore_threshold: f64,
    pub sample_window: usize,
    pub min_samples: usize,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_gas: 8_000_000.0,
            zscore_threshold: 3.0,
            sample_window: 200,
            min_samples: 20,
        }
    }
}

/// ML-confidence detector and its default scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlConfig {
    pub enabled: bool,
    /// Confidence at or above which a finding is reported
    pub min_report_confidence: f64,
    /// Magnitude that saturates the magnitude feature
    pub magnitude_reference: f64,
    /// Inter-event interval (seconds) below which activity counts as bursty
    pub burst_reference_secs: f64,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_report_confidence: 0.4,
            magnitude_reference: 1_000_000.0,
            burst_reference_secs: 60.0,
        }
    }
}

/// When a finding puts its address on the blacklist outside a recovery sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlacklistPolicy {
    /// Only the recovery sweep blacklists
    #[default]
    RecoverySweepOnly,
    /// Critical findings blacklist immediately
    Critical,
    /// Medium and critical findings blacklist immediately
    MediumAndAbove,
}

impl BlacklistPolicy {
    pub fn auto_blacklists(&self, severity: Severity) -> bool {
        match self {
            BlacklistPolicy::RecoverySweepOnly => false,
            BlacklistPolicy::Critical => severity == Severity::Critical,
            BlacklistPolicy::MediumAndAbove => severity >= Severity::Medium,
        }
    }
}

impl fmt::Display for BlacklistPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlacklistPolicy::RecoverySweepOnly => "recovery_sweep_only",
            BlacklistPolicy::Critical => "critical",
            BlacklistPolicy::MediumAndAbove => "medium_and_above",
        };
        f.write_str(name)
    }
}

impl FromStr for BlacklistPolicy {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "recovery_sweep_only" | "sweep" | "none" => Ok(Self::RecoverySweepOnly),
            "critical" => Ok(Self::Critical),
            "medium_and_above" | "medium" => Ok(Self::MediumAndAbove),
            other => Err(MonitorError::Configuration(format!(
                "unknown blacklist policy '{}'",
                other
            ))),
        }
    }
}

/// Address blacklisted at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedEntry {
    pub address: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub blacklist_policy: BlacklistPolicy,
    /// Enter recovery once this many critical findings are active
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_trigger_critical: Option<u32>,
    pub seed_blacklist: Vec<SeedEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Per-subscriber queue length before the oldest events are dropped
    pub channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Events scored concurrently by the feed driver
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

/// Longest window accepted, one century
const MAX_WINDOW_SECS: u64 = 100 * 365 * 24 * 3600;

fn secs(value: u64) -> Duration {
    Duration::seconds(value.min(MAX_WINDOW_SECS) as i64)
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false)
}

impl MonitorConfig {
    /// Load from a TOML or JSON file and validate
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = if is_toml(path) {
            toml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_toml(path) {
            toml::to_string_pretty(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Defaults with `MONITOR_*` environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_HISTORY_CAPACITY) {
            self.history.attack_capacity = parse_number(ENV_HISTORY_CAPACITY, &value)?;
        }
        if let Some(value) = lookup(ENV_DDOS_THRESHOLD) {
            self.frequency.ddos_threshold = parse_number(ENV_DDOS_THRESHOLD, &value)?;
        }
        if let Some(value) = lookup(ENV_BLACKLIST_POLICY) {
            self.recovery.blacklist_policy = value.parse()?;
        }
        if let Some(value) = lookup(ENV_AUTO_TRIGGER_CRITICAL) {
            self.recovery.auto_trigger_critical = match value.trim().to_ascii_lowercase().as_str() {
                "" | "off" | "none" | "0" => None,
                _ => Some(parse_number(ENV_AUTO_TRIGGER_CRITICAL, &value)?),
            };
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| Err(MonitorError::Configuration(message.to_string()));

        if self.history.attack_capacity == 0 || self.history.ml_capacity == 0 {
            return invalid("history capacities must be greater than 0");
        }
        if self.frequency.ddos_threshold == 0 || self.frequency.sustained_threshold == 0 {
            return invalid("frequency thresholds must be greater than 0");
        }
        if self.frequency.ddos_window_secs == 0 || self.frequency.sustained_window_secs == 0 {
            return invalid("frequency windows must be greater than 0");
        }
        if self.reentrancy.max_call_depth == 0 || self.reentrancy.lineage_burst == 0 {
            return invalid("reentrancy limits must be greater than 0");
        }
        if !(self.gas.max_gas > 0.0) || !(self.gas.zscore_threshold > 0.0) {
            return invalid("gas limits must be greater than 0");
        }
        if self.gas.sample_window < 2 || self.gas.min_samples < 2 {
            return invalid("gas sample window and minimum must be at least 2");
        }
        if self.gas.min_samples > self.gas.sample_window {
            return invalid("gas minimum samples cannot exceed the sample window");
        }
        if !(0.0..=1.0).contains(&self.ml.min_report_confidence) {
            return invalid("ML report confidence must be between 0.0 and 1.0");
        }
        if !(self.ml.magnitude_reference > 0.0) || !(self.ml.burst_reference_secs > 0.0) {
            return invalid("ML references must be greater than 0");
        }
        if self.recovery.auto_trigger_critical == Some(0) {
            return invalid("auto trigger count must be greater than 0");
        }
        if self.hub.channel_capacity == 0 {
            return invalid("hub channel capacity must be greater than 0");
        }
        if self.feed.workers == 0 || self.feed.queue_capacity == 0 {
            return invalid("feed workers and queue capacity must be greater than 0");
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        MonitorError::Configuration(format!(
            "{} must be a non-negative integer, got '{}'",
            key, value
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.history.attack_capacity, 50);
        assert_eq!(config.history.recent_default, 10);
        assert_eq!(config.recovery.blacklist_policy, BlacklistPolicy::RecoverySweepOnly);
        assert_eq!(config.recovery.auto_trigger_critical, None);
    }

    #[test]
    fn test_config_validation() {
        let mut config = MonitorConfig::default();
        config.ml.min_report_confidence = 1.5;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.history.attack_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.recovery.auto_trigger_critical = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gas_minimum_must_fit_window() {
        let mut config = MonitorConfig::default();
        config.gas.sample_window = 10;
        config.gas.min_samples = 11;
        assert!(matches!(config.validate(), Err(MonitorError::Configuration(_))));

        config.gas.min_samples = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let mut config = MonitorConfig::default();
        config
            .apply_overrides(lookup(&[
                (ENV_HISTORY_CAPACITY, "20"),
                (ENV_DDOS_THRESHOLD, "5"),
                (ENV_BLACKLIST_POLICY, "medium-and-above"),
                (ENV_AUTO_TRIGGER_CRITICAL, "2"),
            ]))
            .unwrap();

        assert_eq!(config.history.attack_capacity, 20);
        assert_eq!(config.frequency.ddos_threshold, 5);
        assert_eq!(config.recovery.blacklist_policy, BlacklistPolicy::MediumAndAbove);
        assert_eq!(config.recovery.auto_trigger_critical, Some(2));

        config
            .apply_overrides(lookup(&[(ENV_AUTO_TRIGGER_CRITICAL, "off")]))
            .unwrap();
        assert_eq!(config.recovery.auto_trigger_critical, None);
    }

    #[test]
    fn test_bad_override_is_configuration_error() {
        let mut config = MonitorConfig::default();
        let err = config
            .apply_overrides(lookup(&[(ENV_DDOS_THRESHOLD, "lots")]))
            .unwrap_err();
        assert!(matches!(err, MonitorError::Configuration(_)));

        let err = config
            .apply_overrides(lookup(&[(ENV_BLACKLIST_POLICY, "everything")]))
            .unwrap_err();
        assert!(matches!(err, MonitorError::Configuration(_)));
    }

    #[test]
    fn test_policy_thresholds() {
        assert!(!BlacklistPolicy::RecoverySweepOnly.auto_blacklists(Severity::Critical));
        assert!(BlacklistPolicy::Critical.auto_blacklists(Severity::Critical));
        assert!(!BlacklistPolicy::Critical.auto_blacklists(Severity::Medium));
        assert!(BlacklistPolicy::MediumAndAbove.auto_blacklists(Severity::Medium));
        assert!(!BlacklistPolicy::MediumAndAbove.auto_blacklists(Severity::Low));
    }

    #[test]
    fn test_partial_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.toml");
        std::fs::write(
            &path,
            r#"
[frequency]
ddos_threshold = 7

[recovery]
blacklist_policy = "critical"
auto_trigger_critical = 3

[[recovery.seed_blacklist]]
address = "0x1234567890abcdef"
reason = "Sybil Attack"
"#,
        )
        .unwrap();

        let config = MonitorConfig::from_file(&path).unwrap();
        assert_eq!(config.frequency.ddos_threshold, 7);
        assert_eq!(config.frequency.ddos_window_secs, 10);
        assert_eq!(config.recovery.blacklist_policy, BlacklistPolicy::Critical);
        assert_eq!(config.recovery.auto_trigger_critical, Some(3));
        assert_eq!(config.recovery.seed_blacklist.len(), 1);
        assert_eq!(config.recovery.seed_blacklist[0].reason, "Sybil Attack");
    }

    #[test]
    fn test_save_and_reload_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.json");

        let mut config = MonitorConfig::default();
        config.gas.max_gas = 1_000_000.0;
        config.save_to_file(&path).unwrap();

        let loaded = MonitorConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.toml");
        std::fs::write(&path, "[history]\nattack_capacity = 0\n").unwrap();
        assert!(matches!(
            MonitorConfig::from_file(&path),
            Err(MonitorError::Configuration(_))
        ));
    }
}
