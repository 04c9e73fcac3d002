//! Viewer push errors.

use crate::severity::ErrorSeverity;

/// Errors raised while handing an update to, or writing it on, the viewer
/// connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastError {
    /// The writer queue is at capacity; the update was discarded
    #[error("Viewer queue full ({capacity} pending updates)")]
    QueueFull {
        /// Configured queue capacity
        capacity: usize,
    },

    /// The writer task is no longer running
    #[error("Viewer writer task has shut down")]
    WriterClosed,

    /// The transport rejected a write. The writer owning the sink logs the
    /// connection id alongside.
    #[error("Viewer write failed: {0}")]
    WriteFailed(String),

    /// The update could not be serialized
    #[error("Failed to encode viewer update: {0}")]
    Encode(String),
}

impl BroadcastError {
    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            BroadcastError::QueueFull { .. } => ErrorSeverity::Warning,
            BroadcastError::WriterClosed => ErrorSeverity::Error,
            BroadcastError::WriteFailed(_) => ErrorSeverity::Warning,
            BroadcastError::Encode(_) => ErrorSeverity::Error,
        }
    }

    /// Create a write failure from a transport error.
    pub fn write_failed(reason: impl std::fmt::Display) -> Self {
        BroadcastError::WriteFailed(reason.to_string())
    }
}
