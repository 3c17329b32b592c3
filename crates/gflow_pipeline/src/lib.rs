//! # gflow_pipeline
//!
//! Staged streaming evaluation for Gradeflow.
//!
//! # Architecture
//!
//! - **Aggregator**: [`EvaluationPipeline`] drives stages in order and emits [`StreamEvent`](gflow_core::StreamEvent)s
//! - **Rebuffer**: [`rebuffer`] regroups token deltas into paced, readable chunks
//! - **Fallback**: [`FallbackSynthesizer`] stands in for unconfigured backends
//! - **Supervisor**: [`Supervisor`] turns a vanished consumer into prompt cancellation
//! - **Session**: [`PipelineSession`] holds the per-run state and the open upstream
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use gflow_pipeline::EvaluationPipeline;
//!
//! let pipeline = EvaluationPipeline::new(gateway, catalog);
//! let mut events = pipeline.spawn(request);
//! while let Some(event) = events.next().await {
//!     print!("{}", event.to_frame());
//! }
//! ```

pub mod cancel;
pub mod error;
pub mod fallback;
pub mod pipeline;
pub mod rebuffer;
pub mod session;

pub use cancel::Supervisor;
pub use error::{PipelineError, PipelineResult};
pub use fallback::FallbackSynthesizer;
pub use pipeline::{
    EvaluationPipeline, EvaluationStream, PipelineOutcome, PipelineSettings, COMPLETED_PROGRESS,
    STARTING_STATUS,
};
pub use rebuffer::{rebuffer, ChunkPolicy, ChunkStream, Rebuffer};
pub use session::{PipelineSession, SessionState};
