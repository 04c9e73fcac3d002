//! External time-series store errors.
//!
//! Forwarding is best-effort: these errors are logged and counted, never
//! retried, and never surface on the ingestion path.

use crate::severity::ErrorSeverity;

/// Errors raised while talking to the external time-series store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForwardError {
    /// No endpoint configured for this operation
    #[error("No {0} endpoint configured")]
    NotConfigured(&'static str),

    /// Connection, DNS, TLS or timeout failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The store answered with a non-success status
    #[error("Store returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (possibly truncated)
        body: String,
    },
}

impl ForwardError {
    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ForwardError::NotConfigured(_) => ErrorSeverity::Info,
            ForwardError::Transport(_) => ErrorSeverity::Warning,
            ForwardError::Status { status, .. } if *status >= 500 => ErrorSeverity::Warning,
            ForwardError::Status { .. } => ErrorSeverity::Error,
        }
    }

    /// Create a status error.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        ForwardError::Status {
            status,
            body: body.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(reason: impl std::fmt::Display) -> Self {
        ForwardError::Transport(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_severity_split() {
        assert_eq!(
            ForwardError::status(503, "").severity(),
            ErrorSeverity::Warning
        );
        assert_eq!(
            ForwardError::status(401, "bad token").severity(),
            ErrorSeverity::Error
        );
    }

    #[test]
    fn test_not_configured_is_informational() {
        let err = ForwardError::NotConfigured("ingest");
        assert_eq!(err.severity(), ErrorSeverity::Info);
        assert_eq!(err.to_string(), "No ingest endpoint configured");
    }
}
