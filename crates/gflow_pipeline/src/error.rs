//! Error types for the pipeline module.

use gflow_llm::GatewayError;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Faults that end an evaluation run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Fatal backend failure; surfaced to the client as one `Error` event.
    #[error("{0}")]
    Upstream(String),

    /// The consumer went away. Never surfaced.
    #[error("Evaluation cancelled")]
    Cancelled,

    #[error("Document text unavailable: {0}")]
    Extraction(String),
}

impl From<GatewayError> for PipelineError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Cancelled => Self::Cancelled,
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl From<gflow_core::CoreError> for PipelineError {
    fn from(err: gflow_core::CoreError) -> Self {
        match err {
            gflow_core::CoreError::Extraction(msg) => Self::Extraction(msg),
            other => Self::Upstream(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gflow_core::{BackendId, CoreError};

    #[test]
    fn test_gateway_errors_classify() {
        assert_eq!(PipelineError::from(GatewayError::Cancelled), PipelineError::Cancelled);

        let upstream = PipelineError::from(GatewayError::Upstream {
            backend: BackendId::OpenAI,
            status: 429,
            body: "rate limited".into(),
        });
        assert_eq!(
            upstream,
            PipelineError::Upstream("OPENAI API error 429: rate limited".into())
        );

        let transport = PipelineError::from(GatewayError::Transport("reset".into()));
        assert!(matches!(transport, PipelineError::Upstream(_)));
    }

    #[test]
    fn test_core_errors_classify() {
        let err = PipelineError::from(CoreError::Extraction("missing.txt".into()));
        assert_eq!(err.to_string(), "Document text unavailable: missing.txt");
        assert!(matches!(
            PipelineError::from(CoreError::Config("bad".into())),
            PipelineError::Upstream(_)
        ));
    }
}
