//! Credential lookup for upstream backends.

use std::collections::HashMap;

use crate::backend::BackendId;

/// Source of backend secrets.
pub trait CredentialStore: Send + Sync {
    /// Secret for `backend`, or `None` when nothing is configured.
    fn get_credential(&self, backend: BackendId) -> Option<String>;
}

/// Reads `<BACKEND>_API_KEY` from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl EnvCredentials {
    pub fn variable_name(backend: BackendId) -> String {
        format!("{}_API_KEY", backend.display_name())
    }
}

impl CredentialStore for EnvCredentials {
    fn get_credential(&self, backend: BackendId) -> Option<String> {
        std::env::var(Self::variable_name(backend))
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Fixed in-memory credentials.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    keys: HashMap<BackendId, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, backend: BackendId, key: impl Into<String>) -> Self {
        self.keys.insert(backend, key.into());
        self
    }
}

impl CredentialStore for StaticCredentials {
    fn get_credential(&self, backend: BackendId) -> Option<String> {
        self.keys.get(&backend).filter(|k| !k.is_empty()).cloned()
    }
}
