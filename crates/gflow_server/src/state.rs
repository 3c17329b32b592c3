//! Shared handler state.

use std::sync::Arc;

use gflow_core::{AppConfig, DocumentSource, PlainTextSource, StageCatalog};
use gflow_llm::HttpGateway;
use gflow_pipeline::{EvaluationPipeline, PipelineSettings};
use tracing::info;

use crate::error::ServerResult;

/// Everything a request handler needs, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: EvaluationPipeline,
    pub documents: Arc<dyn DocumentSource>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        pipeline: EvaluationPipeline,
        documents: Arc<dyn DocumentSource>,
    ) -> Self {
        Self {
            config,
            pipeline,
            documents,
        }
    }

    /// Wire the real gateway, the configured stage catalog, and a document
    /// source rooted at the working directory.
    pub fn from_config(config: AppConfig) -> ServerResult<Self> {
        let catalog = match &config.stages_file {
            Some(path) => {
                info!("Loading stage catalog from {}", path.display());
                StageCatalog::load(path)?
            }
            None => StageCatalog::builtin(),
        };
        info!("Stage catalog has {} stage(s)", catalog.len());

        let gateway = HttpGateway::from_config(&config)?;
        let pipeline = EvaluationPipeline::new(Arc::new(gateway), Arc::new(catalog))
            .with_settings(PipelineSettings::from_config(&config));

        Ok(Self::new(
            Arc::new(config),
            pipeline,
            Arc::new(PlainTextSource::rooted(".")),
        ))
    }

    pub fn catalog(&self) -> &StageCatalog {
        self.pipeline.catalog()
    }
}
