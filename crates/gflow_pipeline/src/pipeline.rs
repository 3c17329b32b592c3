//! The streaming aggregator.
//!
//! [`EvaluationPipeline`] walks the requested stages strictly in order. For
//! each known stage it announces the stage, obtains a token stream from the
//! gateway (or the fallback synthesizer when the backend is unconfigured),
//! regroups it into chunks and forwards them as `Content` events.
//!
//! The first failure ends the run with `Error` then `Complete`. A consumer
//! that goes away ends it silently.

use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{FutureExt, Stream, StreamExt};
use gflow_core::{AppConfig, BackendId, EvaluationRequest, StageCatalog, StageDescriptor, StreamEvent};
use gflow_llm::ProviderGateway;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cancel::Supervisor;
use crate::error::{PipelineError, PipelineResult};
use crate::fallback::FallbackSynthesizer;
use crate::rebuffer::{rebuffer, ChunkPolicy};
use crate::session::PipelineSession;

pub const STARTING_STATUS: &str = "Starting analysis...";
pub const COMPLETED_PROGRESS: &str = "Analysis completed successfully!";

const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Process-wide pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Backend used when a request names none.
    pub default_backend: BackendId,
    pub chunk_max_chars: usize,
    /// Events buffered between the run and its consumer.
    pub channel_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_backend: BackendId::OpenRouter,
            chunk_max_chars: gflow_core::config::DEFAULT_CHUNK_MAX_CHARS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_backend: config.active_backend,
            chunk_max_chars: config.streaming.chunk_max_chars,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every stage ran and `Complete` was delivered.
    Completed,
    /// A stage failed; `Error` and `Complete` were delivered.
    Failed(String),
    /// The consumer went away; nothing further was delivered.
    Cancelled,
}

/// Orchestrates stages over a shared gateway and catalog.
#[derive(Clone)]
pub struct EvaluationPipeline {
    gateway: Arc<dyn ProviderGateway>,
    catalog: Arc<StageCatalog>,
    settings: PipelineSettings,
}

impl EvaluationPipeline {
    pub fn new(gateway: Arc<dyn ProviderGateway>, catalog: Arc<StageCatalog>) -> Self {
        Self {
            gateway,
            catalog,
            settings: PipelineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn catalog(&self) -> &StageCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run `request` on its own task and return its event stream.
    pub fn spawn(&self, request: EvaluationRequest) -> EvaluationStream {
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let cancel = CancellationToken::new();

        let pipeline = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { pipeline.run(&request, tx, token).await });

        EvaluationStream {
            events: ReceiverStream::new(rx),
            cancel,
            handle: Some(handle),
        }
    }

    /// A stream that reports `err` and completes without running any stage.
    pub fn reject(err: PipelineError) -> EvaluationStream {
        let (tx, rx) = mpsc::channel(2);
        let message = err.to_string();
        // Capacity 2 always fits both events
        let _ = tx.try_send(StreamEvent::error(message.clone()));
        let _ = tx.try_send(StreamEvent::Complete);

        EvaluationStream {
            events: ReceiverStream::new(rx),
            cancel: CancellationToken::new(),
            handle: Some(tokio::spawn(async move { PipelineOutcome::Failed(message) })),
        }
    }

    /// Run `request`, delivering events to `events` until done or cancelled.
    pub async fn run(
        &self,
        request: &EvaluationRequest,
        events: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> PipelineOutcome {
        let supervisor = Supervisor::new(events, cancel.clone());
        let stages = self.resolve_stages(request);
        let mut session = PipelineSession::new(request.id(), stages.len(), cancel);

        let driven = AssertUnwindSafe(self.drive(&supervisor, &mut session, request, &stages))
            .catch_unwind()
            .await;
        let result = match driven {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Upstream("internal pipeline failure".to_string())),
        };

        match result {
            Ok(()) => {
                info!("Evaluation {} completed successfully", request.id());
                PipelineOutcome::Completed
            }
            Err(PipelineError::Cancelled) => {
                session.abort();
                info!(
                    "Evaluation {} cancelled at stage {}/{}; stopping upstream work",
                    request.id(),
                    session.step(),
                    session.total()
                );
                PipelineOutcome::Cancelled
            }
            Err(err) => {
                session.abort();
                let message = err.to_string();
                error!(
                    "Evaluation {} failed at stage {}/{}: {}",
                    request.id(),
                    session.step(),
                    session.total(),
                    message
                );
                let reported = async {
                    supervisor.emit(StreamEvent::error(message.clone())).await?;
                    supervisor.emit(StreamEvent::Complete).await
                };
                match reported.await {
                    Ok(()) => PipelineOutcome::Failed(message),
                    Err(_) => PipelineOutcome::Cancelled,
                }
            }
        }
    }

    /// Known stages in request order; unknown ids are dropped.
    fn resolve_stages<'a>(&'a self, request: &EvaluationRequest) -> Vec<&'a StageDescriptor> {
        request
            .stage_ids()
            .iter()
            .filter_map(|id| {
                let stage = self.catalog.get(id);
                if stage.is_none() {
                    warn!("Skipping unknown stage '{}'", id);
                }
                stage
            })
            .collect()
    }

    async fn drive(
        &self,
        supervisor: &Supervisor,
        session: &mut PipelineSession,
        request: &EvaluationRequest,
        stages: &[&StageDescriptor],
    ) -> PipelineResult<()> {
        let backend = request.backend().unwrap_or(self.settings.default_backend);
        let model = self.gateway.resolve_model(backend, request.model());
        let total = stages.len();

        info!(
            "Starting evaluation {} with {} stage(s) on {} ({})",
            request.id(),
            total,
            backend.display_name(),
            model
        );
        supervisor
            .emit(StreamEvent::status_with_metadata(
                STARTING_STATUS,
                json!({
                    "request_id": request.id().to_string(),
                    "provider": backend.as_str(),
                    "model": model,
                    "pacing_delay": request.pacing().as_secs_f64(),
                    "stages": stages.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
                }),
            ))
            .await?;

        let policy = ChunkPolicy {
            max_chars: self.settings.chunk_max_chars,
            pacing: request.pacing(),
        };

        for (index, stage) in stages.iter().enumerate() {
            let step = index + 1;
            session.begin_stage(step);
            info!("Running stage [{}/{}]: {}", step, total, stage.id);

            supervisor
                .emit(StreamEvent::progress(stage.progress_label(), step, total))
                .await?;
            supervisor.emit(StreamEvent::section(stage.title.clone())).await?;

            self.stream_stage(supervisor, session, request, stage, backend, policy)
                .await?;

            session.finish_stage();
            info!("Stage '{}' completed", stage.id);
        }

        if total > 0 {
            supervisor
                .emit(StreamEvent::progress(COMPLETED_PROGRESS, total, total))
                .await?;
        }
        supervisor.emit(StreamEvent::Complete).await?;
        session.finish();
        Ok(())
    }

    async fn stream_stage(
        &self,
        supervisor: &Supervisor,
        session: &mut PipelineSession,
        request: &EvaluationRequest,
        stage: &StageDescriptor,
        backend: BackendId,
        policy: ChunkPolicy,
    ) -> PipelineResult<()> {
        if !self.gateway.is_configured(backend) {
            return self.emit_fallback(supervisor, session, backend).await;
        }

        let messages = stage.build_messages(&request.prompt_context());
        let opened = supervisor
            .guard(self.gateway.open_stream(
                backend,
                request.model(),
                &messages,
                supervisor.token(),
            ))
            .await?;

        let tokens = match opened {
            Ok(tokens) => tokens,
            Err(err) if err.is_configuration() => {
                return self.emit_fallback(supervisor, session, backend).await;
            }
            Err(err) => return Err(err.into()),
        };

        supervisor
            .emit(StreamEvent::status(format!(
                "Connected to {}. Generating response...",
                backend.display_name()
            )))
            .await?;
        session.attach(Some(rebuffer(tokens, policy)));

        while let Some(upstream) = session.upstream_mut() {
            match supervisor.guard(upstream.next()).await? {
                Some(Ok(chunk)) => supervisor.emit(StreamEvent::content(chunk)).await?,
                Some(Err(err)) => return Err(err),
                None => break,
            }
        }
        Ok(())
    }

    async fn emit_fallback(
        &self,
        supervisor: &Supervisor,
        session: &mut PipelineSession,
        backend: BackendId,
    ) -> PipelineResult<()> {
        info!(
            "No credential for {}; using fallback response",
            backend.display_name()
        );
        session.attach(None);
        for event in FallbackSynthesizer::synthesize(backend) {
            supervisor.emit(event).await?;
        }
        Ok(())
    }
}

/// Consumer side of a spawned run.
///
/// Yields events in order. Dropping it disconnects the consumer, which the
/// run observes at its next suspension point.
pub struct EvaluationStream {
    events: ReceiverStream<StreamEvent>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<PipelineOutcome>>,
}

impl EvaluationStream {
    /// Stop the run without waiting for the consumer to drop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to end. Drain the events first, or the run may
    /// block on a full channel.
    pub async fn join(mut self) -> PipelineOutcome {
        let Some(handle) = self.handle.take() else {
            return PipelineOutcome::Cancelled;
        };
        match handle.await {
            Ok(outcome) => outcome,
            Err(err) => PipelineOutcome::Failed(format!("pipeline task failed: {}", err)),
        }
    }
}

impl Stream for EvaluationStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_next_unpin(cx)
    }
}
