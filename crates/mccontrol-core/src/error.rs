//! Error taxonomy shared by every component.

use std::time::Duration;

use thiserror::Error;

use crate::SessionId;

/// Failure reported by the orchestration platform boundary.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Platform API error: {0}")]
    Api(String),
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Top-level error for controller operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Invalid or unsupported transport type, incomplete identity, bad config.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No matching instance, or the platform API failed during discovery.
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Transport-level connect failure. Retryable.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Credential rejected. Terminal for the connect attempt.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Retries exhausted.
    #[error("Command failed after {attempts} attempts: {source}")]
    CommandExecution {
        attempts: u32,
        #[source]
        source: Box<ControlError>,
    },

    /// Log read failure. `partial` holds the lines read before the failure.
    #[error("Log stream error: {reason}")]
    Stream { reason: String, partial: Vec<String> },

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Lifecycle cancelled or stop signal observed.
    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

impl ControlError {
    /// Build a stream error with no partial output.
    pub fn stream(reason: impl Into<String>) -> Self {
        Self::Stream {
            reason: reason.into(),
            partial: Vec::new(),
        }
    }

    /// Whether the failure is transient and worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Stream { .. } | Self::Platform(_) | Self::Discovery(_)
        )
    }

    /// Whether the failure must never be retried or masked by a re-discovery.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_) | Self::Configuration(_) | Self::Cancelled
        )
    }
}

/// Convenience alias used across the workspace.
pub type Result<T, E = ControlError> = std::result::Result<T, E>;
