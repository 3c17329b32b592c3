//! reqwest-backed gateway speaking the chat-completions streaming protocol.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gflow_core::{AppConfig, BackendId, BackendTable, ChatMessage};
use reqwest::header::ACCEPT;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{ProviderGateway, TokenStream};
use crate::sse::token_stream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request body shared by all supported backends.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Gateway that talks to real backends over HTTP.
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    backends: Arc<BackendTable>,
    max_tokens: Option<u32>,
    idle_timeout: Option<Duration>,
}

impl HttpGateway {
    pub fn new(backends: Arc<BackendTable>) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            backends,
            max_tokens: None,
            idle_timeout: None,
        })
    }

    pub fn from_config(config: &AppConfig) -> GatewayResult<Self> {
        Ok(Self::new(Arc::new(config.backends.clone()))?
            .with_max_tokens(config.streaming.max_tokens)
            .with_idle_timeout(config.streaming.upstream_idle_timeout))
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Longest wait for response headers or for the next body chunk.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn backends(&self) -> &BackendTable {
        &self.backends
    }

    /// Await `fut` unless `cancel` fires or the idle timeout elapses first.
    async fn bounded<T>(
        &self,
        cancel: &CancellationToken,
        fut: impl Future<Output = Result<T, reqwest::Error>>,
    ) -> GatewayResult<T> {
        let fut = async {
            match self.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result.map_err(GatewayError::from),
                    Err(_) => Err(GatewayError::Timeout(limit)),
                },
                None => fut.await.map_err(GatewayError::from),
            }
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GatewayError::Cancelled),
            result = fut => result,
        }
    }
}

#[async_trait]
impl ProviderGateway for HttpGateway {
    fn is_configured(&self, backend: BackendId) -> bool {
        self.backends.is_configured(backend)
    }

    fn resolve_model(&self, backend: BackendId, model: Option<&str>) -> String {
        match self.backends.get(backend) {
            Some(descriptor) => descriptor.resolve_model(model).to_string(),
            None => backend.default_model().to_string(),
        }
    }

    async fn open_stream(
        &self,
        backend: BackendId,
        model: Option<&str>,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> GatewayResult<TokenStream> {
        let descriptor = self
            .backends
            .get(backend)
            .ok_or(GatewayError::Configuration { backend })?;
        let credential = descriptor
            .credential
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(GatewayError::Configuration { backend })?;

        let model = descriptor.resolve_model(model);
        let body = CompletionRequest {
            model,
            messages,
            stream: true,
            seed: descriptor.shaping.seed,
            max_tokens: self.max_tokens,
        };

        let mut request = self
            .client
            .post(&descriptor.endpoint_url)
            .bearer_auth(credential)
            .header(ACCEPT, "text/event-stream")
            .json(&body);
        for (name, value) in &descriptor.shaping.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        info!(
            "Connecting to {} (model {})",
            backend.display_name(),
            model
        );
        let response = self.bounded(cancel, request.send()).await?;

        let status = response.status();
        if !status.is_success() {
            let body = match self.bounded(cancel, response.text()).await {
                Ok(body) => body,
                Err(GatewayError::Cancelled) => return Err(GatewayError::Cancelled),
                Err(_) => String::new(),
            };
            error!(
                "{} returned {}: {}",
                backend.display_name(),
                status.as_u16(),
                body
            );
            return Err(GatewayError::Upstream {
                backend,
                status: status.as_u16(),
                body,
            });
        }

        debug!("{} stream opened", backend.display_name());
        Ok(token_stream(response.bytes_stream(), self.idle_timeout))
    }
}
