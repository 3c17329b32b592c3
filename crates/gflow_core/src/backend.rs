//! Upstream chat-completion backends.
//!
//! Backends are a closed set resolved through a lookup table: each
//! [`BackendId`] maps to one [`BackendDescriptor`] carrying its credential,
//! default model, endpoint and request-shaping rules. Adding a backend means
//! adding a variant and its defaults here; nothing downstream branches on the
//! identifier.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::credentials::CredentialStore;
use crate::error::CoreError;

/// Supported backend identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "openrouter")]
    OpenRouter,
}

impl BackendId {
    pub const ALL: [BackendId; 3] = [BackendId::OpenAI, BackendId::DeepSeek, BackendId::OpenRouter];

    /// Lowercase identifier used in configuration and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::DeepSeek => "deepseek",
            Self::OpenRouter => "openrouter",
        }
    }

    /// Upper-case display name (`OPENAI`), also the environment variable prefix.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI",
            Self::DeepSeek => "DEEPSEEK",
            Self::OpenRouter => "OPENROUTER",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o",
            Self::DeepSeek => "deepseek-chat",
            Self::OpenRouter => "deepseek/deepseek-r1:free",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::OpenAI => "https://api.openai.com/v1/chat/completions",
            Self::DeepSeek => "https://api.deepseek.com/v1/chat/completions",
            Self::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
        }
    }

    /// Request shaping applied to every call against this backend.
    pub fn default_shaping(&self, seed: u64) -> RequestShaping {
        match self {
            Self::OpenRouter => RequestShaping::default()
                .with_seed(seed)
                .with_header("HTTP-Referer", "http://localhost")
                .with_header("X-Title", "Gradeflow"),
            Self::OpenAI | Self::DeepSeek => RequestShaping::default(),
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        BackendId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| CoreError::UnknownBackend(s.to_string()))
    }
}

/// Per-backend request shaping rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestShaping {
    /// Deterministic seed added to the request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Extra headers, e.g. attribution headers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
}

impl RequestShaping {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Everything needed to talk to one backend.
#[derive(Clone)]
pub struct BackendDescriptor {
    pub id: BackendId,
    pub credential: Option<String>,
    pub default_model: String,
    pub endpoint_url: String,
    pub shaping: RequestShaping,
}

impl BackendDescriptor {
    /// Descriptor with builtin defaults and no credential.
    pub fn builtin(id: BackendId, seed: u64) -> Self {
        Self {
            id,
            credential: None,
            default_model: id.default_model().to_string(),
            endpoint_url: id.default_endpoint().to_string(),
            shaping: id.default_shaping(seed),
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into()).filter(|c: &String| !c.is_empty());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = url.into();
        self
    }

    /// Whether a non-empty credential is configured.
    pub fn has_credential(&self) -> bool {
        self.credential.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// Explicit override if given, else the backend default.
    pub fn resolve_model<'a>(&'a self, model: Option<&'a str>) -> &'a str {
        model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model)
    }
}

impl fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("id", &self.id)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("default_model", &self.default_model)
            .field("endpoint_url", &self.endpoint_url)
            .field("shaping", &self.shaping)
            .finish()
    }
}

/// Availability summary for one backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderStatus {
    pub provider: BackendId,
    pub name: String,
    pub has_api_key: bool,
    pub default_model: String,
    pub api_url: String,
    pub is_active: bool,
}

/// Lookup table from backend identifier to descriptor.
///
/// Built once at startup and shared read-only between requests.
#[derive(Debug, Clone)]
pub struct BackendTable {
    backends: HashMap<BackendId, BackendDescriptor>,
}

impl BackendTable {
    /// All backends with builtin defaults and no credentials.
    pub fn builtin(seed: u64) -> Self {
        let backends = BackendId::ALL
            .into_iter()
            .map(|id| (id, BackendDescriptor::builtin(id, seed)))
            .collect();
        Self { backends }
    }

    /// Overlay credentials from a credential store. Backends the store has
    /// nothing for keep whatever they already carry.
    pub fn resolve(mut self, store: &dyn CredentialStore) -> Self {
        for descriptor in self.backends.values_mut() {
            if let Some(key) = store.get_credential(descriptor.id).filter(|c| !c.is_empty()) {
                descriptor.credential = Some(key);
            }
        }
        self
    }

    /// Insert or replace a descriptor.
    pub fn insert(&mut self, descriptor: BackendDescriptor) {
        self.backends.insert(descriptor.id, descriptor);
    }

    pub fn get(&self, id: BackendId) -> Option<&BackendDescriptor> {
        self.backends.get(&id)
    }

    pub fn get_mut(&mut self, id: BackendId) -> Option<&mut BackendDescriptor> {
        self.backends.get_mut(&id)
    }

    /// Whether `id` is present and has a credential.
    pub fn is_configured(&self, id: BackendId) -> bool {
        self.get(id).is_some_and(BackendDescriptor::has_credential)
    }

    /// Descriptors in canonical backend order.
    pub fn iter(&self) -> impl Iterator<Item = &BackendDescriptor> {
        BackendId::ALL.iter().filter_map(|id| self.backends.get(id))
    }

    /// Backends that have a credential configured.
    pub fn configured(&self) -> Vec<BackendId> {
        self.iter()
            .filter(|d| d.has_credential())
            .map(|d| d.id)
            .collect()
    }

    /// Availability summary for every backend.
    pub fn statuses(&self, active: BackendId) -> Vec<ProviderStatus> {
        self.iter()
            .map(|d| ProviderStatus {
                provider: d.id,
                name: d.id.display_name().to_string(),
                has_api_key: d.has_credential(),
                default_model: d.default_model.clone(),
                api_url: d.endpoint_url.clone(),
                is_active: d.id == active,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentials;

    #[test]
    fn test_backend_id_parsing() {
        assert_eq!("openai".parse::<BackendId>().unwrap(), BackendId::OpenAI);
        assert_eq!("DeepSeek".parse::<BackendId>().unwrap(), BackendId::DeepSeek);
        assert_eq!(" openrouter ".parse::<BackendId>().unwrap(), BackendId::OpenRouter);
        assert!(matches!("claude".parse::<BackendId>(), Err(CoreError::UnknownBackend(_))));
    }

    #[test]
    fn test_backend_id_serde_matches_as_str() {
        for id in BackendId::ALL {
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{}\"", id.as_str()));
        }
    }

    #[test]
    fn test_only_openrouter_is_shaped() {
        let table = BackendTable::builtin(7);
        let openrouter = table.get(BackendId::OpenRouter).unwrap();
        assert_eq!(openrouter.shaping.seed, Some(7));
        assert!(openrouter
            .shaping
            .headers
            .iter()
            .any(|(name, _)| name == "X-Title"));

        let openai = table.get(BackendId::OpenAI).unwrap();
        assert_eq!(openai.shaping, RequestShaping::default());
    }

    #[test]
    fn test_resolve_model() {
        let descriptor = BackendDescriptor::builtin(BackendId::DeepSeek, 1);
        assert_eq!(descriptor.resolve_model(None), "deepseek-chat");
        assert_eq!(descriptor.resolve_model(Some("  ")), "deepseek-chat");
        assert_eq!(descriptor.resolve_model(Some("deepseek-reasoner")), "deepseek-reasoner");
    }

    #[test]
    fn test_credentials_and_statuses() {
        let store = StaticCredentials::new()
            .with(BackendId::OpenAI, "sk-test")
            .with(BackendId::DeepSeek, "");
        let table = BackendTable::builtin(1).resolve(&store);

        assert!(table.is_configured(BackendId::OpenAI));
        assert!(!table.is_configured(BackendId::DeepSeek));
        assert_eq!(table.configured(), vec![BackendId::OpenAI]);

        let statuses = table.statuses(BackendId::OpenRouter);
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[0].provider, BackendId::OpenAI);
        assert!(statuses[0].has_api_key);
        assert!(statuses[2].is_active);
        assert!(!statuses[2].has_api_key);
    }

    #[test]
    fn test_debug_redacts_credential() {
        let descriptor = BackendDescriptor::builtin(BackendId::OpenAI, 1).with_credential("sk-secret");
        let debug = format!("{:?}", descriptor);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
