//! Severity classification
//!
//! Maps a finding type (and, for scored findings, its confidence) to a
//! severity. Pure and deterministic; every category is listed explicitly so a
//! new `FindingType` variant fails to compile until it is classified.

use crate::monitor::types::{FindingType, Severity};

/// Confidence at which a scored finding is escalated from low to medium
pub const ML_MEDIUM_CONFIDENCE: f64 = 0.8;

/// Classify a finding. `signal` is the scorer confidence for ML findings and
/// is ignored for heuristic categories.
pub fn classify(finding_type: &FindingType, signal: Option<f64>) -> Severity {
    match finding_type {
        FindingType::DdosAttack | FindingType::DoubleSpend | FindingType::Reentrancy => {
            Severity::Critical
        }
        FindingType::HighFrequency
        | FindingType::GasGriefing
        | FindingType::FailedTransactions
        | FindingType::SybilAttack => Severity::Medium,
        FindingType::ExcessiveGas => Severity::Low,
        FindingType::MlAnomaly(_) => match signal {
            Some(confidence) if confidence >= ML_MEDIUM_CONFIDENCE => Severity::Medium,
            _ => Severity::Low,
        },
        FindingType::Unknown(_) => Severity::Medium,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(FindingType::DdosAttack, Severity::Critical ; "ddos is critical")]
    #[test_case(FindingType::DoubleSpend, Severity::Critical ; "double spend is critical")]
    #[test_case(FindingType::Reentrancy, Severity::Critical ; "reentrancy is critical")]
    #[test_case(FindingType::HighFrequency, Severity::Medium ; "high frequency is medium")]
    #[test_case(FindingType::GasGriefing, Severity::Medium ; "gas griefing is medium")]
    #[test_case(FindingType::FailedTransactions, Severity::Medium ; "failed txs is medium")]
    #[test_case(FindingType::SybilAttack, Severity::Medium ; "sybil is medium")]
    #[test_case(FindingType::ExcessiveGas, Severity::Low ; "excessive gas is low")]
    fn test_heuristic_table(finding_type: FindingType, expected: Severity) {
        assert_eq!(classify(&finding_type, None), expected);
        // heuristic categories ignore the signal
        assert_eq!(classify(&finding_type, Some(0.99)), expected);
    }

    #[test_case(Some(0.95), Severity::Medium ; "high confidence")]
    #[test_case(Some(0.8), Severity::Medium ; "boundary")]
    #[test_case(Some(0.79), Severity::Low ; "just below")]
    #[test_case(None, Severity::Low ; "missing confidence")]
    fn test_ml_escalation(signal: Option<f64>, expected: Severity) {
        let finding_type = FindingType::MlAnomaly("Anomaly Detection".to_string());
        assert_eq!(classify(&finding_type, signal), expected);
    }

    #[test]
    fn test_unknown_is_medium() {
        let finding_type = FindingType::Unknown("Flash Loan".to_string());
        assert_eq!(classify(&finding_type, None), Severity::Medium);
    }
}
