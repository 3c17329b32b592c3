//! Application configuration.
//!
//! [`AppConfig`] is built once at startup from three layers, later layers
//! winning: builtin defaults, an optional TOML file, then environment
//! variables. The result is immutable and shared by `Arc`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{BackendId, BackendTable};
use crate::credentials::{CredentialStore, EnvCredentials};
use crate::error::{CoreError, CoreResult};
use crate::request::pacing_from_secs;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_SEED: u64 = 1;
pub const DEFAULT_CHUNK_MAX_CHARS: usize = 50;
pub const DEFAULT_PACING_SECS: f64 = 0.01;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 120;

/// Listener settings for the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Chunking and upstream pacing settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingConfig {
    /// Default delay after each emitted chunk.
    pub pacing_delay: Duration,
    /// Buffer length that forces a chunk out.
    pub chunk_max_chars: usize,
    /// Longest wait for the next upstream bytes; `None` waits forever.
    pub upstream_idle_timeout: Option<Duration>,
    pub max_tokens: Option<u32>,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            pacing_delay: Duration::from_secs_f64(DEFAULT_PACING_SECS),
            chunk_max_chars: DEFAULT_CHUNK_MAX_CHARS,
            upstream_idle_timeout: Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)),
            max_tokens: None,
        }
    }
}

/// Per-backend section of the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendFileConfig {
    pub api_key: Option<String>,
    pub default_model: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamingFileConfig {
    pub pacing_delay: Option<f64>,
    pub chunk_max_chars: Option<usize>,
    pub upstream_idle_timeout: Option<u64>,
    pub max_tokens: Option<u32>,
}

/// On-disk configuration. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub active_backend: Option<String>,
    pub seed: Option<u64>,
    pub stages_file: Option<PathBuf>,
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub streaming: StreamingFileConfig,
    #[serde(default)]
    pub backends: HashMap<String, BackendFileConfig>,
}

impl FileConfig {
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// Resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub active_backend: BackendId,
    pub backends: BackendTable,
    pub server: ServerConfig,
    pub streaming: StreamingConfig,
    pub stages_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            active_backend: BackendId::OpenRouter,
            backends: BackendTable::builtin(DEFAULT_SEED),
            server: ServerConfig::default(),
            streaming: StreamingConfig::default(),
            stages_file: None,
        }
    }
}

impl AppConfig {
    /// Load from an optional TOML file and the process environment.
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let file = match path {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                Some(FileConfig::load(path)?)
            }
            None => None,
        };
        let config = Self::from_lookup(file, |key| std::env::var(key).ok())?
            .with_credentials(&EnvCredentials);
        config.warn_if_unconfigured();
        Ok(config)
    }

    /// Load from the process environment only.
    pub fn from_env() -> CoreResult<Self> {
        Self::load(None)
    }

    /// Build from a file layer and an environment lookup function.
    ///
    /// Credentials are not read here; apply a [`CredentialStore`] with
    /// [`AppConfig::with_credentials`].
    pub fn from_lookup<F>(file: Option<FileConfig>, env: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let file = file.unwrap_or_default();
        let mut config = AppConfig::default();

        if let Some(name) = env("ACTIVE_AI_PROVIDER").or(file.active_backend) {
            config.active_backend = name.parse()?;
        }

        let seed = match env("AI_SEED") {
            Some(raw) => parse_env("AI_SEED", &raw)?,
            None => file.seed.unwrap_or(DEFAULT_SEED),
        };
        config.backends = BackendTable::builtin(seed);

        for (name, section) in &file.backends {
            let id: BackendId = name.parse()?;
            if let Some(descriptor) = config.backends.get_mut(id) {
                if let Some(key) = section.api_key.as_deref().filter(|k| !k.is_empty()) {
                    descriptor.credential = Some(key.to_string());
                }
                if let Some(model) = &section.default_model {
                    descriptor.default_model = model.clone();
                }
                if let Some(url) = &section.api_url {
                    descriptor.endpoint_url = url.clone();
                }
            }
        }

        for id in BackendId::ALL {
            let Some(descriptor) = config.backends.get_mut(id) else {
                continue;
            };
            if let Some(model) = env(&format!("{}_DEFAULT_MODEL", id.display_name())) {
                descriptor.default_model = model;
            }
            if let Some(url) = env(&format!("{}_API_URL", id.display_name())) {
                descriptor.endpoint_url = url;
            }
        }

        if let Some(host) = env("HOST").or(file.server.host) {
            config.server.host = host;
        }
        match env("PORT") {
            Some(raw) => config.server.port = parse_env("PORT", &raw)?,
            None => {
                if let Some(port) = file.server.port {
                    config.server.port = port;
                }
            }
        }

        let pacing = match env("GFLOW_PACING_DELAY") {
            Some(raw) => Some(parse_env::<f64>("GFLOW_PACING_DELAY", &raw)?),
            None => file.streaming.pacing_delay,
        };
        if let Some(secs) = pacing {
            config.streaming.pacing_delay = pacing_from_secs(secs)?;
        }

        let chunk_max = match env("GFLOW_CHUNK_MAX_CHARS") {
            Some(raw) => Some(parse_env::<usize>("GFLOW_CHUNK_MAX_CHARS", &raw)?),
            None => file.streaming.chunk_max_chars,
        };
        if let Some(max) = chunk_max {
            if max == 0 {
                return Err(CoreError::Config("chunk_max_chars must be at least 1".into()));
            }
            config.streaming.chunk_max_chars = max;
        }

        let idle = match env("GFLOW_UPSTREAM_TIMEOUT") {
            Some(raw) => Some(parse_env::<u64>("GFLOW_UPSTREAM_TIMEOUT", &raw)?),
            None => file.streaming.upstream_idle_timeout,
        };
        if let Some(secs) = idle {
            config.streaming.upstream_idle_timeout =
                (secs > 0).then(|| Duration::from_secs(secs));
        }

        config.streaming.max_tokens = match env("AI_MAX_TOKENS") {
            Some(raw) => Some(parse_env("AI_MAX_TOKENS", &raw)?),
            None => file.streaming.max_tokens,
        };

        config.stages_file = env("GFLOW_STAGES_FILE")
            .map(PathBuf::from)
            .or(file.stages_file);

        Ok(config)
    }

    /// Overlay credentials from `store` onto the backend table.
    pub fn with_credentials(mut self, store: &dyn CredentialStore) -> Self {
        self.backends = self.backends.resolve(store);
        self
    }

    /// Whether requests for the active backend will run in fallback mode.
    pub fn is_fallback_mode(&self) -> bool {
        !self.backends.is_configured(self.active_backend)
    }

    pub fn warn_if_unconfigured(&self) {
        if self.backends.configured().is_empty() {
            warn!("No backend credentials configured; every stage will run in fallback mode");
        } else if self.is_fallback_mode() {
            warn!(
                "Active backend {} has no credential; its stages will run in fallback mode",
                self.active_backend.display_name()
            );
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> CoreResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::Config(format!("{} has an invalid value: {}", key, raw)))
}
