//! Route handlers.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{self, HeaderValue};
use axum::response::Response;
use axum::Json;
use bytes::Bytes;
use futures::StreamExt;
use gflow_core::{pacing_from_secs, BackendId, EvaluationRequest, EventKind, ProviderStatus};
use gflow_pipeline::{EvaluationPipeline, EvaluationStream, PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Body of `POST /ai/evaluate`.
///
/// Exactly one of `document_text` and `document_path` is expected; inline
/// text wins when both are present.
#[derive(Debug, Default, Deserialize)]
pub struct EvaluateBody {
    pub document_text: Option<String>,
    pub document_path: Option<String>,
    /// Stage ids in run order; all catalog stages when absent or empty.
    pub stages: Option<Vec<String>>,
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Seconds to wait after each chunk.
    pub pacing_delay: Option<f64>,
    pub instructions: Option<String>,
    pub questions: Option<Vec<String>>,
}

/// `POST /ai/evaluate`: stream one evaluation as `data: <json>\n\n` frames.
pub async fn evaluate(
    State(state): State<AppState>,
    Json(body): Json<EvaluateBody>,
) -> ApiResult<Response> {
    let EvaluateBody {
        document_text,
        document_path,
        stages,
        provider,
        model,
        pacing_delay,
        instructions,
        questions,
    } = body;

    let backend = match provider.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(name) => name.parse::<BackendId>()?,
        None => state.config.active_backend,
    };
    let pacing = match pacing_delay {
        Some(secs) => pacing_from_secs(secs)?,
        None => state.config.streaming.pacing_delay,
    };
    let stage_ids = stages
        .filter(|ids| !ids.is_empty())
        .unwrap_or_else(|| state.catalog().ids());

    let document = match (document_text, document_path) {
        (Some(text), _) => text,
        (None, Some(path)) => match extract(&state, &path).await {
            Ok(text) => text,
            Err(err) => {
                warn!("Rejecting evaluation: {}", err);
                return Ok(event_stream(EvaluationPipeline::reject(err)));
            }
        },
        (None, None) => {
            return Err(ApiError::BadRequest(
                "document_text or document_path is required".to_string(),
            ))
        }
    };

    let mut request = EvaluationRequest::new(document, stage_ids)
        .with_backend(backend)
        .with_pacing(pacing);
    if let Some(model) = model {
        request = request.with_model(model);
    }
    if let Some(instructions) = instructions {
        request = request.with_instructions(instructions);
    }
    if let Some(questions) = questions {
        request = request.with_questions(questions);
    }

    info!(
        "Accepted evaluation {} ({} stage(s), {})",
        request.id(),
        request.stage_ids().len(),
        backend.display_name()
    );
    Ok(event_stream(state.pipeline.spawn(request)))
}

async fn extract(state: &AppState, path: &str) -> PipelineResult<String> {
    state
        .documents
        .extract_text(path)
        .await
        .map_err(PipelineError::from)
}

/// Frame every event and hand the stream to the response body.
///
/// Dropping the body (client disconnect) drops the stream, which the
/// pipeline observes as a closed channel.
fn event_stream(events: EvaluationStream) -> Response {
    let frames = events.map(|event| Ok::<_, Infallible>(Bytes::from(event.to_frame())));
    let mut response = Response::new(Body::from_stream(frames));

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub active_provider: BackendId,
    pub fallback_mode: bool,
    pub providers: Vec<ProviderStatus>,
}

/// `GET /ai/providers`
pub async fn providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    let config = &state.config;
    Json(ProvidersResponse {
        active_provider: config.active_backend,
        fallback_mode: config.is_fallback_mode(),
        providers: config.backends.statuses(config.active_backend),
    })
}

#[derive(Debug, Serialize)]
pub struct StageSummary {
    pub id: String,
    pub title: String,
    pub max_document_chars: usize,
}

/// `GET /ai/stages`: the catalog in run order.
pub async fn stages(State(state): State<AppState>) -> Json<Vec<StageSummary>> {
    Json(
        state
            .catalog()
            .iter()
            .map(|stage| StageSummary {
                id: stage.id.clone(),
                title: stage.title.clone(),
                max_document_chars: stage.max_document_chars,
            })
            .collect(),
    )
}

#[derive(Debug, Serialize)]
pub struct StreamingConfigResponse {
    /// Seconds.
    pub pacing_delay: f64,
    pub buffer_size: usize,
    /// Upstream idle timeout in seconds; null when disabled.
    pub timeout: Option<u64>,
    pub supported_types: Vec<&'static str>,
}

/// `GET /ai/streaming-config`
pub async fn streaming_config(State(state): State<AppState>) -> Json<StreamingConfigResponse> {
    let streaming = &state.config.streaming;
    Json(StreamingConfigResponse {
        pacing_delay: streaming.pacing_delay.as_secs_f64(),
        buffer_size: streaming.chunk_max_chars,
        timeout: streaming.upstream_idle_timeout.map(|t| t.as_secs()),
        supported_types: EventKind::ALL.iter().map(EventKind::as_str).collect(),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
