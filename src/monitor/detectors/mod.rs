//! Detector bank
//!
//! Independent scoring strategies. Disabled detectors are never registered.
//! Every registered detector sees every event and contributes at most one
//! finding; a detector that errors or panics is isolated and the others
//! still run.

pub mod double_spend;
pub mod frequency;
pub mod gas;
pub mod ml;
pub mod reentrancy;
pub mod window;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::monitor::config::MonitorConfig;
use crate::monitor::errors::{MonitorError, Result};
use crate::monitor::types::{ActivityEvent, Finding};

pub use double_spend::DoubleSpendDetector;
pub use frequency::FrequencyDetector;
pub use gas::GasAnomalyDetector;
pub use ml::{ConfidenceScorer, FeatureWeights, MlDetector, MlScore, WeightedFeatureScorer};
pub use reentrancy::ReentrancyDetector;

/// A scoring strategy. Implementations keep their own window state behind
/// interior locks so `evaluate` can run from many ingestion calls at once.
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    /// Zero or one finding for this event
    fn evaluate(&self, event: &ActivityEvent) -> Result<Option<Finding>>;
}

/// Result of running the whole bank over one event
#[derive(Debug, Default)]
pub struct Evaluation {
    pub findings: Vec<Finding>,
    /// Always `MonitorError::DetectorFailure`
    pub failures: Vec<MonitorError>,
}

impl Evaluation {
    pub fn failed_detectors(&self) -> Vec<String> {
        self.failures
            .iter()
            .filter_map(|failure| match failure {
                MonitorError::DetectorFailure { detector, .. } => Some(detector.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Ordered set of detectors
#[derive(Default)]
pub struct DetectorBank {
    detectors: Vec<Arc<dyn Detector>>,
}

impl DetectorBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in detectors enabled by `config`, with the default scorer
    pub fn from_config(config: &MonitorConfig) -> Self {
        let scorer = Arc::new(WeightedFeatureScorer::from_config(&config.ml));
        Self::with_scorer(config, scorer)
    }

    /// The built-in detectors with a caller-supplied confidence scorer
    pub fn with_scorer(config: &MonitorConfig, scorer: Arc<dyn ConfidenceScorer>) -> Self {
        let mut detectors: Vec<Arc<dyn Detector>> = Vec::new();
        if config.frequency.enabled {
            detectors.push(Arc::new(FrequencyDetector::new(config.frequency.clone())));
        }
        if config.reentrancy.enabled {
            detectors.push(Arc::new(ReentrancyDetector::new(config.reentrancy.clone())));
        }
        if config.double_spend.enabled {
            detectors.push(Arc::new(DoubleSpendDetector::new(config.double_spend.clone())));
        }
        if config.gas.enabled {
            detectors.push(Arc::new(GasAnomalyDetector::new(config.gas.clone())));
        }
        if config.ml.enabled {
            detectors.push(Arc::new(MlDetector::new(scorer, config.ml.min_report_confidence)));
        }
        Self { detectors }
    }

    /// Add a detector; names must be unique
    pub fn register(&mut self, detector: Arc<dyn Detector>) -> Result<()> {
        if self.detectors.iter().any(|d| d.name() == detector.name()) {
            return Err(MonitorError::Configuration(format!(
                "Detector '{}' is already registered",
                detector.name()
            )));
        }
        debug!(detector = detector.name(), "Registered detector");
        self.detectors.push(detector);
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        self.detectors.iter().map(|d| d.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run every registered detector; no short-circuit
    pub fn evaluate(&self, event: &ActivityEvent) -> Evaluation {
        let mut evaluation = Evaluation::default();

        for detector in &self.detectors {
            let name = detector.name().to_string();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| detector.evaluate(event)));

            match outcome {
                Ok(Ok(Some(finding))) => evaluation.findings.push(finding),
                Ok(Ok(None)) => {}
                Ok(Err(err)) => {
                    let message = match err {
                        MonitorError::DetectorFailure { message, .. } => message,
                        other => other.to_string(),
                    };
                    warn!(
                        detector = %name,
                        address = %event.address,
                        error = %message,
                        "Detector failed"
                    );
                    evaluation.failures.push(MonitorError::detector(name, message));
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(
                        detector = %name,
                        address = %event.address,
                        panic = %message,
                        "Detector panicked"
                    );
                    evaluation.failures.push(MonitorError::detector(name, message));
                }
            }
        }

        evaluation
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "detector panicked".to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::monitor::types::{EventKind, FindingType};

    fn event() -> ActivityEvent {
        ActivityEvent::new("0xabc", EventKind::Transfer, 1.0)
    }

    #[test]
    fn test_default_bank_has_all_detectors() {
        let bank = DetectorBank::from_config(&MonitorConfig::default());
        assert_eq!(
            bank.names(),
            vec!["frequency", "reentrancy", "double-spend", "gas", "ml-confidence"]
        );
    }

    #[test]
    fn test_disabled_detectors_are_skipped() {
        let mut config = MonitorConfig::default();
        config.ml.enabled = false;
        config.gas.enabled = false;
        let bank = DetectorBank::from_config(&config);
        assert_eq!(bank.len(), 3);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut bank = DetectorBank::new();
        bank.register(Arc::new(FailingDetector)).unwrap();
        let err = bank.register(Arc::new(FailingDetector)).unwrap_err();
        assert!(matches!(err, MonitorError::Configuration(_)));
    }

    #[test]
    fn test_all_firing_detectors_contribute() {
        let mut bank = DetectorBank::new();
        bank.register(Arc::new(FixedDetector {
            name: "a",
            finding_type: FindingType::DdosAttack,
        }))
        .unwrap();
        bank.register(Arc::new(FixedDetector {
            name: "b",
            finding_type: FindingType::Reentrancy,
        }))
        .unwrap();

        let evaluation = bank.evaluate(&event());
        assert_eq!(evaluation.findings.len(), 2);
        assert!(evaluation.failures.is_empty());
    }

    #[test]
    fn test_failures_are_isolated() {
        let mut bank = DetectorBank::new();
        bank.register(Arc::new(PanickingDetector)).unwrap();
        bank.register(Arc::new(FailingDetector)).unwrap();
        bank.register(Arc::new(FixedDetector {
            name: "fixed",
            finding_type: FindingType::DoubleSpend,
        }))
        .unwrap();

        let evaluation = bank.evaluate(&event());
        assert_eq!(evaluation.findings.len(), 1);
        assert_eq!(evaluation.findings[0].finding_type, FindingType::DoubleSpend);
        assert_eq!(evaluation.failed_detectors(), vec!["panicking", "failing"]);
    }
}
