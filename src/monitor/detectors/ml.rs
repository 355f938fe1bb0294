//! ML-confidence detector
//!
//! The detector only thresholds a confidence; where that confidence comes
//! from is pluggable through [`ConfidenceScorer`]. The bundled scorer is a
//! lightweight weighted feature sum squashed through a sigmoid, small enough
//! to run on every event.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::Detector;
use crate::monitor::config::MlConfig;
use crate::monitor::errors::{MonitorError, Result};
use crate::monitor::types::{ActivityEvent, EventKind, Finding};

const MAX_PROFILES: usize = 10_000;

/// Output of a confidence scorer
#[derive(Debug, Clone, PartialEq)]
pub struct MlScore {
    /// Detection label, e.g. "Anomaly Detection"
    pub label: String,
    pub confidence: f64,
}

/// Pluggable confidence function
pub trait ConfidenceScorer: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, event: &ActivityEvent) -> Result<MlScore>;
}

/// Feature weights for [`WeightedFeatureScorer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeights {
    pub magnitude: f64,
    pub contract_call: f64,
    pub call_depth: f64,
    pub gas_spend: f64,
    pub burstiness: f64,
    pub bias: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            magnitude: 2.0,
            contract_call: 0.8,
            call_depth: 2.5,
            gas_spend: 0.6,
            burstiness: 2.5,
            bias: -3.5,
        }
    }
}

/// Normalized per-event features, each in `[0, 1]`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EventFeatures {
    pub magnitude: f64,
    pub contract_call: f64,
    pub call_depth: f64,
    pub gas_spend: f64,
    pub burstiness: f64,
}

#[derive(Debug, Clone)]
struct AddressProfile {
    last_seen: DateTime<Utc>,
    /// Exponential moving average of inter-event interval, seconds
    mean_interval: Option<f64>,
}

/// Weighted feature sum + sigmoid
pub struct WeightedFeatureScorer {
    weights: FeatureWeights,
    magnitude_reference: f64,
    burst_reference_secs: f64,
    profiles: Mutex<HashMap<String, AddressProfile>>,
}

impl WeightedFeatureScorer {
    pub fn new(
        weights: FeatureWeights,
        magnitude_reference: f64,
        burst_reference_secs: f64,
    ) -> Self {
        Self {
            weights,
            magnitude_reference,
            burst_reference_secs,
            profiles: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &MlConfig) -> Self {
        Self::new(
            FeatureWeights::default(),
            config.magnitude_reference,
            config.burst_reference_secs,
        )
    }

    pub fn weights(&self) -> &FeatureWeights {
        &self.weights
    }

    /// Extract features and update the address profile
    fn features(&self, event: &ActivityEvent) -> EventFeatures {
        let magnitude = ((1.0 + event.magnitude.abs()).ln() / (1.0 + self.magnitude_reference).ln())
            .clamp(0.0, 1.0);
        let call_depth = event
            .call_depth
            .map_or(0.0, |depth| (f64::from(depth) / 10.0).min(1.0));

        let mut profiles = self.profiles.lock();
        if profiles.len() >= MAX_PROFILES && !profiles.contains_key(&event.address) {
            profiles.clear();
        }

        let burstiness = match profiles.get_mut(&event.address) {
            Some(profile) => {
                let interval = (event.timestamp - profile.last_seen)
                    .num_milliseconds()
                    .max(0) as f64
                    / 1000.0;
                let mean = profile
                    .mean_interval
                    .map_or(interval, |mean| 0.5 * mean + 0.5 * interval);
                profile.mean_interval = Some(mean);
                profile.last_seen = profile.last_seen.max(event.timestamp);
                (1.0 - mean / self.burst_reference_secs).clamp(0.0, 1.0)
            }
            None => {
                profiles.insert(
                    event.address.clone(),
                    AddressProfile {
                        last_seen: event.timestamp,
                        mean_interval: None,
                    },
                );
                0.0
            }
        };

        EventFeatures {
            magnitude,
            contract_call: if event.kind == EventKind::ContractCall { 1.0 } else { 0.0 },
            call_depth,
            gas_spend: if event.kind == EventKind::GasSpend { 1.0 } else { 0.0 },
            burstiness,
        }
    }

    /// Weighted contribution of each feature, largest first
    pub fn explain(&self, features: &EventFeatures) -> Vec<(&'static str, f64)> {
        let mut contributions = vec![
            ("magnitude", features.magnitude * self.weights.magnitude),
            ("contract_call", features.contract_call * self.weights.contract_call),
            ("call_depth", features.call_depth * self.weights.call_depth),
            ("gas_spend", features.gas_spend * self.weights.gas_spend),
            ("burstiness", features.burstiness * self.weights.burstiness),
        ];
        contributions.sort_by(|a, b| {
            b.1.abs()
                .partial_cmp(&a.1.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        contributions
    }

    pub fn predict(&self, features: &EventFeatures) -> f64 {
        let sum = features.magnitude * self.weights.magnitude
            + features.contract_call * self.weights.contract_call
            + features.call_depth * self.weights.call_depth
            + features.gas_spend * self.weights.gas_spend
            + features.burstiness * self.weights.burstiness
            + self.weights.bias;
        sigmoid(sum)
    }

    fn label(&self, features: &EventFeatures) -> &'static str {
        match self.explain(features).first() {
            Some(("burstiness", _)) => "Behavioral Analysis",
            Some(("contract_call", _)) | Some(("call_depth", _)) => "Pattern Recognition",
            _ => "Anomaly Detection",
        }
    }
}

impl Default for WeightedFeatureScorer {
    fn default() -> Self {
        Self::from_config(&MlConfig::default())
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl ConfidenceScorer for WeightedFeatureScorer {
    fn name(&self) -> &str {
        "weighted-features"
    }

    fn score(&self, event: &ActivityEvent) -> Result<MlScore> {
        let features = self.features(event);
        Ok(MlScore {
            label: self.label(&features).to_string(),
            confidence: self.predict(&features),
        })
    }
}

/// Reports a finding when the scorer's confidence reaches the threshold
pub struct MlDetector {
    scorer: Arc<dyn ConfidenceScorer>,
    min_report_confidence: f64,
}

impl MlDetector {
    pub fn new(scorer: Arc<dyn ConfidenceScorer>, min_report_confidence: f64) -> Self {
        Self {
            scorer,
            min_report_confidence,
        }
    }
}

impl Detector for MlDetector {
    fn name(&self) -> &str {
        "ml-confidence"
    }

    fn evaluate(&self, event: &ActivityEvent) -> Result<Option<Finding>> {
        let score = self.scorer.score(event)?;
        if score.confidence.is_nan() {
            return Err(MonitorError::detector(
                self.name(),
                format!("scorer '{}' returned NaN", self.scorer.name()),
            ));
        }

        let confidence = score.confidence.clamp(0.0, 1.0);
        if confidence < self.min_report_confidence {
            return Ok(None);
        }

        let details = format!("{} scored {:.2}", self.scorer.name(), confidence);
        Ok(Some(
            Finding::scored(
                score.label,
                confidence,
                event.address.clone(),
                event.timestamp,
                self.name(),
            )
            .with_details(details),
        ))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Returns the same confidence for every event
    pub struct FixedScorer(pub f64);

    impl ConfidenceScorer for FixedScorer {
        fn name(&self) -> &str {
            "fixed"
        }

        fn score(&self, _event: &ActivityEvent) -> Result<MlScore> {
            Ok(MlScore {
                label: "Anomaly Detection".to_string(),
                confidence: self.0,
            })
        }
    }
}
