//! The provider gateway interface.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use gflow_core::{BackendId, ChatMessage};
use tokio_util::sync::CancellationToken;

use crate::error::GatewayResult;

/// Forward-only sequence of raw text deltas from one upstream call.
///
/// Dropping the stream closes the underlying connection.
pub type TokenStream = Pin<Box<dyn Stream<Item = GatewayResult<String>> + Send>>;

/// Opens streaming chat completions against a backend.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Whether a credential exists for `backend`. When false, `open_stream`
    /// fails with a configuration error without touching the network.
    fn is_configured(&self, backend: BackendId) -> bool;

    /// The model a call with this override would use.
    fn resolve_model(&self, backend: BackendId, model: Option<&str>) -> String {
        model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(backend.default_model())
            .to_string()
    }

    /// Open one streaming completion.
    ///
    /// Fails with `Configuration` when no credential is present, `Upstream`
    /// on a non-success status (no tokens are yielded), or `Cancelled` if
    /// `cancel` fires before the response headers arrive.
    async fn open_stream(
        &self,
        backend: BackendId,
        model: Option<&str>,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> GatewayResult<TokenStream>;
}
