//! Error types for the gateway module.

use std::time::Duration;

use gflow_core::BackendId;
use thiserror::Error;

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors that can occur while opening or reading an upstream stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// No credential for the backend. Recoverable: callers fall back.
    #[error("No API key configured for {}", .backend.display_name())]
    Configuration { backend: BackendId },

    #[error("{} API error {status}: {body}", .backend.display_name())]
    Upstream {
        backend: BackendId,
        status: u16,
        body: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Upstream timed out after {0:?} without data")]
    Timeout(Duration),

    #[error("Upstream request cancelled")]
    Cancelled,
}

impl GatewayError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
