//! # gflow_core
//!
//! Data model, configuration and collaborator interfaces for Gradeflow.
//!
//! Everything in this crate is either an immutable value shared between
//! requests or a narrow trait implemented elsewhere.
//!
//! # Architecture
//!
//! - **Events**: the typed [`StreamEvent`] protocol and its `data: <json>` framing
//! - **Backends**: [`BackendId`] resolved through a [`BackendTable`] of descriptors
//! - **Stages**: [`StageDescriptor`] templates collected in a [`StageCatalog`]
//! - **Requests**: the immutable [`EvaluationRequest`] for one run
//! - **Config**: [`AppConfig`] layered from defaults, TOML and the environment
//!
//! # Example
//!
//! ```rust,ignore
//! use gflow_core::{AppConfig, EvaluationRequest, StageCatalog};
//!
//! let config = AppConfig::from_env()?;
//! let catalog = StageCatalog::builtin();
//! let request = EvaluationRequest::new(text, catalog.ids())
//!     .with_backend(config.active_backend)
//!     .with_pacing(config.streaming.pacing_delay);
//! ```

pub mod backend;
pub mod config;
pub mod credentials;
pub mod document;
pub mod error;
pub mod event;
pub mod message;
pub mod request;
pub mod stage;

pub use backend::{BackendDescriptor, BackendId, BackendTable, ProviderStatus, RequestShaping};
pub use config::{AppConfig, FileConfig, ServerConfig, StreamingConfig};
pub use credentials::{CredentialStore, EnvCredentials, StaticCredentials};
pub use document::{DocumentSource, PlainTextSource};
pub use error::{CoreError, CoreResult};
pub use event::{EventKind, StreamEvent, WireEvent, FRAME_PREFIX};
pub use message::{ChatMessage, ChatRole};
pub use request::{default_questions, pacing_from_secs, EvaluationRequest, DEFAULT_INSTRUCTIONS};
pub use stage::{PromptContext, StageCatalog, StageDescriptor, StageSource, YamlStageFile};
