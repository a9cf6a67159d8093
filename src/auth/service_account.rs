use crate::error::{AppError, Result};
use jsonwebtoken::EncodingKey;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Google service-account credentials used for both Firestore and FCM.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub private_key_id: String,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

// Keep the private key out of logs.
impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// Build the key from individual `FIREBASE_*` variables.
    ///
    /// Hosting platforms usually store the PEM on one line with literal `\n`
    /// sequences, so those are turned back into newlines.
    pub fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| AppError::Credentials(format!("{} must be set", key)))
        };

        let key = Self {
            project_id: required("FIREBASE_PROJECT_ID")?,
            private_key_id: required("FIREBASE_PRIVATE_KEY_ID")?,
            private_key: required("FIREBASE_PRIVATE_KEY")?.replace("\\n", "\n"),
            client_email: required("FIREBASE_CLIENT_EMAIL")?,
            token_uri: lookup("FIREBASE_TOKEN_URI")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(default_token_uri),
        };

        key.validate()?;
        Ok(key)
    }

    /// Load a downloaded service-account JSON key file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Credentials(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let key: Self = serde_json::from_str(&raw)
            .map_err(|e| AppError::Credentials(format!("Malformed key file: {}", e)))?;

        key.validate()?;
        Ok(key)
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(AppError::Credentials("project_id is empty".to_string()));
        }
        if self.client_email.trim().is_empty() {
            return Err(AppError::Credentials("client_email is empty".to_string()));
        }
        self.encoding_key()?;
        Ok(())
    }

    pub fn encoding_key(&self) -> Result<EncodingKey> {
        EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| AppError::Credentials(format!("Invalid private key: {}", e)))
    }
}
