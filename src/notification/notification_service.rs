use super::notification_models::{FcmRequest, FcmResponse, PushNotification, SendReceipt};
use crate::auth::AccessTokenSource;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Push delivery. One call, one message, no retries.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, push: &PushNotification) -> Result<SendReceipt>;
}

/// Sends through the FCM HTTP v1 API.
pub struct FcmSender {
    client: reqwest::Client,
    tokens: Arc<dyn AccessTokenSource>,
    send_url: String,
}

impl FcmSender {
    pub fn new(
        client: reqwest::Client,
        tokens: Arc<dyn AccessTokenSource>,
        base_url: &str,
        project_id: &str,
    ) -> Self {
        Self {
            client,
            tokens,
            send_url: format!(
                "{}/v1/projects/{}/messages:send",
                base_url.trim_end_matches('/'),
                project_id
            ),
        }
    }
}

#[async_trait]
impl NotificationSender for FcmSender {
    async fn send(&self, push: &PushNotification) -> Result<SendReceipt> {
        let access_token = self.tokens.access_token().await?;

        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&FcmRequest::from(push))
            .send()
            .await
            .map_err(|e| AppError::Push(format!("Failed to connect to FCM: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Push(format!(
                "FCM returned error status {}: {}",
                status, body
            )));
        }

        let fcm_response: FcmResponse = response
            .json()
            .await
            .map_err(|e| AppError::Push(format!("Failed to parse FCM response: {}", e)))?;

        Ok(SendReceipt(fcm_response.name))
    }
}
