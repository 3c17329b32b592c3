//! Document text providers.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Resolves a document handle into already-extracted text.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn extract_text(&self, handle: &str) -> CoreResult<String>;
}

/// Reads `.txt` and `.md` files from disk.
///
/// When rooted, handles are paths relative to the root and may not escape
/// it. Invalid UTF-8 is decoded lossily rather than rejected.
#[derive(Debug, Clone)]
pub struct PlainTextSource {
    root: Option<PathBuf>,
}

impl PlainTextSource {
    pub const EXTENSIONS: [&'static str; 2] = ["txt", "md"];

    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Accepts any path the process can read.
    pub fn unrestricted() -> Self {
        Self { root: None }
    }

    fn resolve(&self, handle: &str) -> CoreResult<PathBuf> {
        let path = Path::new(handle);
        let Some(root) = &self.root else {
            return Ok(path.to_path_buf());
        };

        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(CoreError::Extraction(format!(
                "'{}' is outside the document directory",
                handle
            )));
        }
        Ok(root.join(path))
    }
}

#[async_trait]
impl DocumentSource for PlainTextSource {
    async fn extract_text(&self, handle: &str) -> CoreResult<String> {
        let path = self.resolve(handle)?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !Self::EXTENSIONS.contains(&extension.as_str()) {
            return Err(CoreError::Extraction(format!(
                "unsupported file type '{}' (expected .txt or .md)",
                path.display()
            )));
        }

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            CoreError::Extraction(format!("cannot read '{}': {}", path.display(), e))
        })?;
        debug!("Read {} bytes from {}", bytes.len(), path.display());

        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        })
    }
}
