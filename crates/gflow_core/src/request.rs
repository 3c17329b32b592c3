//! The immutable input of one evaluation run.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::backend::BackendId;
use crate::error::{CoreError, CoreResult};
use crate::stage::PromptContext;

/// Reviewer instructions used when a request brings none.
pub const DEFAULT_INSTRUCTIONS: &str = "Please review this thesis and provide feedback";

/// Questions used when a request brings none.
pub fn default_questions() -> Vec<String> {
    vec![
        "What are the strengths?".to_string(),
        "What areas need improvement?".to_string(),
    ]
}

/// Convert a pacing interval in seconds.
///
/// Negative, non-finite, and out-of-range values are rejected.
pub fn pacing_from_secs(secs: f64) -> CoreResult<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| {
        CoreError::Config(format!(
            "pacing delay must be a non-negative number of seconds, got {} ({})",
            secs, e
        ))
    })
}

/// A request to run an ordered list of stages over one document.
///
/// Built once per incoming call and never mutated afterwards; the document
/// text is reference-counted so cloning a request is cheap.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    id: Uuid,
    document: Arc<str>,
    stage_ids: Vec<String>,
    backend: Option<BackendId>,
    model: Option<String>,
    pacing: Duration,
    instructions: String,
    questions: Vec<String>,
}

impl EvaluationRequest {
    pub fn new(document: impl Into<Arc<str>>, stage_ids: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            document: document.into(),
            stage_ids,
            backend: None,
            model: None,
            pacing: Duration::ZERO,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            questions: default_questions(),
        }
    }

    pub fn with_backend(mut self, backend: BackendId) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.model = if model.trim().is_empty() { None } else { Some(model) };
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_questions(mut self, questions: Vec<String>) -> Self {
        self.questions = questions;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn stage_ids(&self) -> &[String] {
        &self.stage_ids
    }

    pub fn backend(&self) -> Option<BackendId> {
        self.backend
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn prompt_context(&self) -> PromptContext<'_> {
        PromptContext {
            document: &self.document,
            instructions: &self.instructions,
            questions: &self.questions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = EvaluationRequest::new("text", vec!["analysis".into()]);
        assert_eq!(request.document(), "text");
        assert_eq!(request.backend(), None);
        assert_eq!(request.model(), None);
        assert_eq!(request.pacing(), Duration::ZERO);
        assert_eq!(request.instructions(), DEFAULT_INSTRUCTIONS);
        assert_eq!(request.questions().len(), 2);
    }

    #[test]
    fn test_blank_model_is_no_override() {
        let request = EvaluationRequest::new("t", vec![]).with_model("  ");
        assert_eq!(request.model(), None);
        let request = request.with_model("gpt-4o-mini");
        assert_eq!(request.model(), Some("gpt-4o-mini"));
    }

    #[test]
    fn test_pacing_from_secs() {
        assert_eq!(pacing_from_secs(0.0).unwrap(), Duration::ZERO);
        assert_eq!(pacing_from_secs(0.25).unwrap(), Duration::from_millis(250));
        assert!(pacing_from_secs(-1.0).is_err());
        assert!(pacing_from_secs(f64::NAN).is_err());
        assert!(pacing_from_secs(f64::INFINITY).is_err());
        assert!(matches!(pacing_from_secs(1e20), Err(CoreError::Config(_))));
        assert!(pacing_from_secs(f64::MAX).is_err());
    }
}
