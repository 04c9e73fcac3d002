//! Inbound telemetry errors.
//!
//! Every variant here maps to "log and drop the request". The caller still
//! receives its acknowledgment.

use crate::severity::ErrorSeverity;

/// Errors raised while turning a request body into a telemetry sample.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IngestError {
    /// The body is not a recognizable envelope
    #[error("Malformed telemetry envelope: {0}")]
    MalformedEnvelope(String),

    /// The sample carries an empty device identifier
    #[error("Telemetry sample has an empty device id")]
    EmptyDeviceId,

    /// An axis reading is NaN or infinite
    #[error("Non-finite {axis} reading from device {device}")]
    NonFiniteAxis {
        /// Device identifier
        device: String,
        /// Axis name
        axis: &'static str,
    },

    /// The request body could not be read
    #[error("Failed to read request body: {0}")]
    BodyUnreadable(String),
}

impl IngestError {
    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            IngestError::MalformedEnvelope(_) => ErrorSeverity::Warning,
            IngestError::EmptyDeviceId => ErrorSeverity::Warning,
            IngestError::NonFiniteAxis { .. } => ErrorSeverity::Warning,
            IngestError::BodyUnreadable(_) => ErrorSeverity::Error,
        }
    }

    /// Create a malformed envelope error from any displayable parse failure.
    pub fn malformed(reason: impl std::fmt::Display) -> Self {
        IngestError::MalformedEnvelope(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_keeps_reason() {
        let err = IngestError::malformed("expected value at line 1 column 1");
        assert!(err.to_string().contains("line 1 column 1"));
        assert_eq!(err.severity(), ErrorSeverity::Warning);
    }

    #[test]
    fn test_non_finite_display() {
        let err = IngestError::NonFiniteAxis {
            device: "car7".into(),
            axis: "x",
        };
        let msg = err.to_string();
        assert!(msg.contains("car7"));
        assert!(msg.contains(" x "));
    }
}
