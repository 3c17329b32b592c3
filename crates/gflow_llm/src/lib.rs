//! # gflow_llm
//!
//! Streaming chat-completion gateway for Gradeflow.
//!
//! A [`ProviderGateway`] opens one streaming completion per call and hands
//! back a [`TokenStream`] of raw text deltas. [`HttpGateway`] talks to the
//! real backends; [`ScriptedGateway`] replays canned streams in tests.

pub mod error;
pub mod gateway;
pub mod http;
pub mod mock;
pub mod sse;

pub use error::{GatewayError, GatewayResult};
pub use gateway::{ProviderGateway, TokenStream};
pub use http::HttpGateway;
pub use mock::{CapturedCall, ScriptedGateway, ScriptedResponse};
pub use sse::{parse_line, token_stream, SseDecoder, SseLine};
