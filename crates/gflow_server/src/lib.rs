//! # Gradeflow Server
//!
//! HTTP surface for streaming evaluations.
//!
//! ## Routes
//!
//! - `POST /ai/evaluate`: runs the requested stages and streams
//!   `data: <json>\n\n` frames until `complete` or disconnect
//! - `GET /ai/providers`: backend status and the active backend
//! - `GET /ai/stages`: the stage catalog in run order
//! - `GET /ai/streaming-config`: chunking and pacing settings
//! - `GET /health`

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult, ServerError, ServerResult};
pub use handlers::EvaluateBody;
pub use router::build_router;
pub use server::serve;
pub use state::AppState;
