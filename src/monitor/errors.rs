//! Monitor error types
//!
//! One error enum for the whole engine. Detector failures are isolated by the
//! detector bank and never reach callers of `Monitor::ingest`.

use thiserror::Error;

/// Monitor error type
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Event rejected at the ingestion boundary (missing address, unknown kind, ...)
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// A single detector failed to evaluate an event
    #[error("Detector failure: {detector} - {message}")]
    DetectorFailure {
        detector: String,
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Monitor result type
pub type Result<T> = std::result::Result<T, MonitorError>;

impl MonitorError {
    pub fn invalid_event(message: impl Into<String>) -> Self {
        Self::InvalidEvent(message.into())
    }

    pub fn detector(detector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DetectorFailure {
            detector: detector.into(),
            message: message.into(),
        }
    }

    /// Whether the caller can carry on after this error (drop the event, skip the detector)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidEvent(_) | Self::DetectorFailure { .. }
        )
    }

    /// Short context string for logs
    pub fn context(&self) -> String {
        match self {
            Self::DetectorFailure { detector, .. } => format!("Detector: {}", detector),
            Self::InvalidEvent(_) => "Ingestion boundary".to_string(),
            _ => "No additional context".to_string(),
        }
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for MonitorError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for MonitorError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
