use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Storage credentials persisted by the setup flow.
///
/// Every field defaults to empty so partially written files still load.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub app_secret: String,
    #[serde(default)]
    pub access_token: String,
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials from {path:?}"))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse credentials in {path:?}"))
    }

    /// Async variant of [`Credentials::load`] for use inside upload tasks
    pub async fn load_async(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read credentials from {path:?}"))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse credentials in {path:?}"))
    }

    /// Write as pretty-printed JSON, replacing any existing file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write credentials to {path:?}"))
    }

    pub fn has_access_token(&self) -> bool {
        !self.access_token.is_empty()
    }
}
