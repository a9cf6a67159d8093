use crate::auth::ServiceAccountKey;
use crate::error::{AppError, Result};
use std::time::Duration;

pub const DEFAULT_MESSAGES_COLLECTION: &str = "messages/NnDlHK8QVQaBcTkXPNXIHtFFoiW2-Au1Lb3viduUE2KmfI4xXDgsVYAO2/NnDlHK8QVQaBcTkXPNXIHtFFoiW2-Au1Lb3viduUE2KmfI4xXDgsVYAO2";
pub const DEFAULT_USERS_COLLECTION: &str = "users";
pub const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com";
pub const DEFAULT_FCM_BASE_URL: &str = "https://fcm.googleapis.com";

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub credentials: ServiceAccountKey,
    pub messages_collection: String,
    pub users_collection: String,
    pub poll_interval: Duration,
    pub max_resubscribe_backoff: Duration,
    pub firestore_base_url: String,
    pub fcm_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse configuration from an arbitrary key lookup. Read once at startup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credentials = match lookup("GOOGLE_APPLICATION_CREDENTIALS") {
            Some(path) if !path.trim().is_empty() => ServiceAccountKey::from_file(path.trim())?,
            _ => ServiceAccountKey::from_lookup(&lookup)?,
        };

        let or_default = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let poll_interval_ms: u64 = parse_number(&lookup, "POLL_INTERVAL_MS", 2000)?;
        if poll_interval_ms == 0 {
            return Err(AppError::Config("POLL_INTERVAL_MS must be greater than 0".to_string()));
        }

        Ok(Self {
            host: or_default("HOST", "0.0.0.0"),
            port: parse_number(&lookup, "PORT", 3000)?,
            credentials,
            messages_collection: or_default("MESSAGES_COLLECTION", DEFAULT_MESSAGES_COLLECTION)
                .trim_matches('/')
                .to_string(),
            users_collection: or_default("USERS_COLLECTION", DEFAULT_USERS_COLLECTION)
                .trim_matches('/')
                .to_string(),
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_resubscribe_backoff: Duration::from_secs(parse_number(
                &lookup,
                "RESUBSCRIBE_MAX_BACKOFF_SECS",
                60,
            )?),
            firestore_base_url: or_default("FIRESTORE_BASE_URL", DEFAULT_FIRESTORE_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            fcm_base_url: or_default("FCM_BASE_URL", DEFAULT_FCM_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} must be a number, got {:?}", key, raw))),
        _ => Ok(default),
    }
}
