//! Scripted gateway for testing.
//!
//! Provides a configurable implementation of the ProviderGateway trait that
//! replays scripted token streams without any network access, captures
//! every call, and tracks whether the streams it handed out were closed.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use gflow_core::{BackendId, ChatMessage};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{ProviderGateway, TokenStream};

/// Predefined outcome of one `open_stream` call.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Open successfully and yield these deltas.
    Tokens(Vec<String>),
    /// Yield these deltas, then fail mid-stream.
    TokensThenError(Vec<String>, GatewayError),
    /// Fail to open.
    Fail(GatewayError),
    /// Yield these deltas, then never produce anything again.
    Hang(Vec<String>),
}

impl ScriptedResponse {
    pub fn tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Tokens(tokens.into_iter().map(Into::into).collect())
    }

    pub fn hang<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Hang(tokens.into_iter().map(Into::into).collect())
    }

    /// Non-success status from the backend.
    pub fn upstream(backend: BackendId, status: u16, body: impl Into<String>) -> Self {
        Self::Fail(GatewayError::Upstream {
            backend,
            status,
            body: body.into(),
        })
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub backend: BackendId,
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
}

/// Gateway double that replays scripted responses.
#[derive(Clone)]
pub struct ScriptedGateway {
    /// Backends reported as having no credential.
    unconfigured: Arc<RwLock<Vec<BackendId>>>,
    /// Responses returned in order, cycling when exhausted.
    responses: Arc<RwLock<Vec<ScriptedResponse>>>,
    response_index: Arc<AtomicUsize>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGateway {
    /// Create a gateway where every backend is configured.
    pub fn new() -> Self {
        Self {
            unconfigured: Arc::new(RwLock::new(Vec::new())),
            responses: Arc::new(RwLock::new(Vec::new())),
            response_index: Arc::new(AtomicUsize::new(0)),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Report `backend` as having no credential.
    pub fn without_credentials(self, backend: BackendId) -> Self {
        self.unconfigured.write().push(backend);
        self
    }

    /// Add a response for the next `open_stream` call.
    pub fn add_response(self, response: ScriptedResponse) -> Self {
        self.responses.write().push(response);
        self
    }

    pub fn with_responses(self, responses: Vec<ScriptedResponse>) -> Self {
        *self.responses.write() = responses;
        self
    }

    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    /// Streams handed out so far.
    pub fn opened_streams(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Streams that have since been dropped.
    pub fn closed_streams(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// True once at least one stream was opened and every opened stream is closed.
    pub fn is_closed(&self) -> bool {
        let opened = self.opened_streams();
        opened > 0 && self.closed_streams() == opened
    }

    fn next_response(&self) -> ScriptedResponse {
        let responses = self.responses.read();
        if responses.is_empty() {
            return ScriptedResponse::Tokens(Vec::new());
        }
        let index = self.response_index.fetch_add(1, Ordering::SeqCst);
        responses
            .get(index % responses.len())
            .cloned()
            .unwrap_or(ScriptedResponse::Tokens(Vec::new()))
    }

    fn stream(&self, items: Vec<GatewayResult<String>>, hang: bool) -> TokenStream {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Box::pin(ScriptedStream {
            items: items.into(),
            hang,
            _guard: CloseGuard(self.closed.clone()),
        })
    }
}

#[async_trait]
impl ProviderGateway for ScriptedGateway {
    fn is_configured(&self, backend: BackendId) -> bool {
        !self.unconfigured.read().contains(&backend)
    }

    async fn open_stream(
        &self,
        backend: BackendId,
        model: Option<&str>,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> GatewayResult<TokenStream> {
        self.captured_calls.write().push(CapturedCall {
            backend,
            model: model.map(str::to_string),
            messages: messages.to_vec(),
        });

        if !self.is_configured(backend) {
            return Err(GatewayError::Configuration { backend });
        }
        if cancel.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        match self.next_response() {
            ScriptedResponse::Tokens(tokens) => {
                Ok(self.stream(tokens.into_iter().map(Ok).collect(), false))
            }
            ScriptedResponse::TokensThenError(tokens, err) => {
                let mut items: Vec<_> = tokens.into_iter().map(Ok).collect();
                items.push(Err(err));
                Ok(self.stream(items, false))
            }
            ScriptedResponse::Fail(err) => Err(err),
            ScriptedResponse::Hang(tokens) => {
                Ok(self.stream(tokens.into_iter().map(Ok).collect(), true))
            }
        }
    }
}

struct CloseGuard(Arc<AtomicUsize>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct ScriptedStream {
    items: VecDeque<GatewayResult<String>>,
    hang: bool,
    _guard: CloseGuard,
}

impl Stream for ScriptedStream {
    type Item = GatewayResult<String>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.items.pop_front() {
            Some(item) => Poll::Ready(Some(item)),
            None if this.hang => Poll::Pending,
            None => Poll::Ready(None),
        }
    }
}
