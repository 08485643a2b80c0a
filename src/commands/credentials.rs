use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::credentials::Credentials;

/// Command to write or update the storage credential file
pub struct CredentialsCommand {
    file: PathBuf,
    app_key: Option<String>,
    app_secret: Option<String>,
    access_token: Option<String>,
}

impl CredentialsCommand {
    pub fn new(
        file: PathBuf,
        app_key: Option<String>,
        app_secret: Option<String>,
        access_token: Option<String>,
    ) -> Self {
        Self {
            file,
            app_key,
            app_secret,
            access_token,
        }
    }

    pub async fn execute(&self) -> Result<()> {
        if self.app_key.is_none() && self.app_secret.is_none() && self.access_token.is_none() {
            return Err(anyhow!("Nothing to update, pass at least one credential"));
        }

        let mut credentials = if self.file.exists() {
            Credentials::load(&self.file)?
        } else {
            Credentials::default()
        };

        if let Some(key) = &self.app_key {
            credentials.app_key = key.clone();
        }
        if let Some(secret) = &self.app_secret {
            credentials.app_secret = secret.clone();
        }
        if let Some(token) = &self.access_token {
            credentials.access_token = token.clone();
        }

        credentials.save(&self.file)?;
        if !credentials.has_access_token() {
            warn!("No access token stored yet; uploads will run unauthenticated");
        }
        info!("🔑 Credentials written to {:?}", self.file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_updates_keep_existing_fields() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("credentials.json");

        CredentialsCommand::new(file.clone(), Some("key".into()), Some("secret".into()), None)
            .execute()
            .await
            .unwrap();
        CredentialsCommand::new(file.clone(), None, None, Some("token".into()))
            .execute()
            .await
            .unwrap();

        let stored = Credentials::load(&file).unwrap();
        assert_eq!(stored.app_key, "key");
        assert_eq!(stored.app_secret, "secret");
        assert_eq!(stored.access_token, "token");
    }

    #[tokio::test]
    async fn test_requires_a_value() {
        let temp_dir = TempDir::new().unwrap();
        let cmd = CredentialsCommand::new(temp_dir.path().join("c.json"), None, None, None);
        assert!(cmd.execute().await.is_err());
    }
}
