//! Evaluate command - Run the pipeline on a local document.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use futures::StreamExt;
use thiserror::Error;
use tracing::info;

use gflow_core::{
    pacing_from_secs, BackendId, DocumentSource, EvaluationRequest, PlainTextSource, StreamEvent,
};
use gflow_pipeline::PipelineOutcome;
use gflow_server::AppState;

/// The run reached a stage failure and reported it on the stream.
#[derive(Debug, Error)]
#[error("Evaluation failed: {0}")]
pub struct EvaluationFailed(pub String);

#[derive(Args)]
pub struct EvaluateArgs {
    /// Document to evaluate (.txt or .md)
    #[arg(short, long)]
    pub file: PathBuf,

    /// Stage id to run; repeat to run several in order (default: all)
    #[arg(short, long = "stage")]
    pub stages: Vec<String>,

    /// Backend (openai, deepseek, openrouter)
    #[arg(long)]
    pub provider: Option<String>,

    /// Model override for the chosen backend
    #[arg(short, long)]
    pub model: Option<String>,

    /// Seconds to wait after each chunk
    #[arg(long)]
    pub pacing: Option<f64>,

    /// Custom reviewer instructions
    #[arg(long)]
    pub instructions: Option<String>,

    /// Predefined question; repeat for several
    #[arg(long = "question")]
    pub questions: Vec<String>,

    /// Print wire frames instead of readable text
    #[arg(long)]
    pub raw: bool,
}

pub async fn execute(args: EvaluateArgs, config_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(config_path)?;

    let backend = match args.provider.as_deref() {
        Some(name) => name.parse::<BackendId>()?,
        None => config.active_backend,
    };
    let pacing = match args.pacing {
        Some(secs) => pacing_from_secs(secs)?,
        None => config.streaming.pacing_delay,
    };

    let handle = args.file.to_string_lossy();
    let document = PlainTextSource::unrestricted()
        .extract_text(&handle)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let state = AppState::from_config(config).context("Failed to initialize pipeline")?;
    let stage_ids = if args.stages.is_empty() {
        state.catalog().ids()
    } else {
        args.stages
    };

    let mut request = EvaluationRequest::new(document, stage_ids)
        .with_backend(backend)
        .with_pacing(pacing);
    if let Some(model) = args.model {
        request = request.with_model(model);
    }
    if let Some(instructions) = args.instructions {
        request = request.with_instructions(instructions);
    }
    if !args.questions.is_empty() {
        request = request.with_questions(args.questions);
    }

    info!("Evaluating {} on {}", args.file.display(), backend.display_name());
    let mut events = state.pipeline.spawn(request);
    let mut stdout = std::io::stdout();
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    stdout.write_all(render(&event, args.raw).as_bytes())?;
                    stdout.flush()?;
                }
                None => break,
            },
            _ = &mut interrupted => {
                info!("Interrupted; cancelling evaluation");
                events.cancel();
                break;
            }
        }
    }

    match events.join().await {
        PipelineOutcome::Completed => Ok(()),
        PipelineOutcome::Failed(message) => Err(EvaluationFailed(message).into()),
        PipelineOutcome::Cancelled => {
            eprintln!("Evaluation cancelled");
            Ok(())
        }
    }
}

/// Text printed for one event.
fn render(event: &StreamEvent, raw: bool) -> String {
    if raw {
        return event.to_frame();
    }
    match event {
        StreamEvent::Status { text, .. } => format!("» {}\n", text),
        StreamEvent::Progress { text, step, total } => format!("\n[{}/{}] {}\n", step, total, text),
        StreamEvent::Section(title) => format!("\n=== {} ===\n\n", title),
        StreamEvent::Content(text) => text.clone(),
        StreamEvent::Error(text) => format!("\n✗ {}\n", text),
        StreamEvent::Complete => "\n".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_raw_is_wire_frame() {
        let event = StreamEvent::content("Hello world.");
        assert_eq!(
            render(&event, true),
            "data: {\"type\":\"content\",\"content\":\"Hello world.\"}\n\n"
        );
    }

    #[test]
    fn test_render_readable() {
        assert_eq!(render(&StreamEvent::content("Hi."), false), "Hi.");
        assert_eq!(
            render(&StreamEvent::progress("THESIS ANALYSIS ...", 1, 3), false),
            "\n[1/3] THESIS ANALYSIS ...\n"
        );
        assert!(render(&StreamEvent::section("GRADING RESULTS AND PRODUCT"), false)
            .contains("=== GRADING RESULTS AND PRODUCT ==="));
    }
}
