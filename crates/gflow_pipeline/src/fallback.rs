//! Canned stage output used when a backend has no credential.

use gflow_core::{BackendId, StreamEvent};

/// Produces the fixed fallback events for a stage.
///
/// Never touches the network; the events are emitted as-is without passing
/// through the rebuffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackSynthesizer;

impl FallbackSynthesizer {
    pub fn status_text(backend: BackendId) -> String {
        format!("[FALLBACK MODE] {} Analysis", backend.display_name())
    }

    pub fn content_text(backend: BackendId) -> String {
        format!(
            "This is a simulated response since no API key is configured for {}.",
            backend.as_str()
        )
    }

    /// One `Status` naming the backend, then one `Content` placeholder.
    pub fn synthesize(backend: BackendId) -> Vec<StreamEvent> {
        vec![
            StreamEvent::status(Self::status_text(backend)),
            StreamEvent::content(Self::content_text(backend)),
        ]
    }
}
