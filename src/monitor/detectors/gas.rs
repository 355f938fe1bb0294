//! Gas anomaly detector
//!
//! A hard ceiling catches gas griefing outright; below it, a rolling z-score
//! over recent gas samples catches spends far above the usual level.

use parking_lot::Mutex;
use std::collections::VecDeque;

use super::Detector;
use crate::monitor::config::GasConfig;
use crate::monitor::errors::Result;
use crate::monitor::types::{ActivityEvent, EventKind, Finding, FindingType};

pub struct GasAnomalyDetector {
    config: GasConfig,
    samples: Mutex<VecDeque<f64>>,
}

/// Mean and population standard deviation
fn mean_std(samples: &VecDeque<f64>) -> (f64, f64) {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

impl GasAnomalyDetector {
    pub fn new(config: GasConfig) -> Self {
        let capacity = config.sample_window;
        Self {
            config,
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().len()
    }
}

impl Detector for GasAnomalyDetector {
    fn name(&self) -> &str {
        "gas"
    }

    fn evaluate(&self, event: &ActivityEvent) -> Result<Option<Finding>> {
        if event.kind != EventKind::GasSpend {
            return Ok(None);
        }
        let gas = event.magnitude;

        // griefing spends are kept out of the baseline
        if gas > self.config.max_gas {
            let finding = Finding::new(
                FindingType::GasGriefing,
                event.address.clone(),
                event.timestamp,
                self.name(),
            )
            .with_details(format!("{:.0} gas above limit {:.0}", gas, self.config.max_gas));
            return Ok(Some(finding));
        }

        let mut samples = self.samples.lock();
        let mut finding = None;

        if samples.len() >= self.config.min_samples {
            let (mean, std) = mean_std(&samples);
            if std > f64::EPSILON {
                let z = (gas - mean) / std;
                if z > self.config.zscore_threshold {
                    finding = Some(
                        Finding::new(
                            FindingType::ExcessiveGas,
                            event.address.clone(),
                            event.timestamp,
                            self.name(),
                        )
                        .with_details(format!(
                            "gas {:.0} is {:.1} sigma above mean {:.0}",
                            gas, z, mean
                        )),
                    );
                }
            }
        }

        samples.push_back(gas);
        while samples.len() > self.config.sample_window {
            samples.pop_front();
        }

        Ok(finding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::Severity;

    fn spend(gas: f64) -> ActivityEvent {
        ActivityEvent::new("0xgas", EventKind::GasSpend, gas)
    }

    fn warmed_up() -> GasAnomalyDetector {
        let detector = GasAnomalyDetector::new(GasConfig::default());
        for i in 0..40 {
            let gas = if i % 2 == 0 { 20_000.0 } else { 22_000.0 };
            assert!(detector.evaluate(&spend(gas)).unwrap().is_none());
        }
        detector
    }

    #[test]
    fn test_griefing_above_ceiling() {
        let detector = GasAnomalyDetector::new(GasConfig::default());
        let finding = detector.evaluate(&spend(9_000_000.0)).unwrap().unwrap();
        assert_eq!(finding.finding_type, FindingType::GasGriefing);
        assert_eq!(finding.severity, Severity::Medium);
        assert_eq!(detector.sample_count(), 0);
    }

    #[test]
    fn test_outlier_is_excessive_gas() {
        let detector = warmed_up();
        let finding = detector.evaluate(&spend(500_000.0)).unwrap().unwrap();
        assert_eq!(finding.finding_type, FindingType::ExcessiveGas);
        assert_eq!(finding.severity, Severity::Low);
    }

    #[test]
    fn test_no_zscore_before_min_samples() {
        let detector = GasAnomalyDetector::new(GasConfig::default());
        for _ in 0..5 {
            detector.evaluate(&spend(21_000.0)).unwrap();
        }
        assert!(detector.evaluate(&spend(5_000_000.0)).unwrap().is_none());
    }

    #[test]
    fn test_sample_window_bounded() {
        let detector = warmed_up();
        for _ in 0..500 {
            detector.evaluate(&spend(21_000.0)).unwrap();
        }
        assert_eq!(detector.sample_count(), 200);
    }
}
