use serde::{Deserialize, Serialize};

pub const DEFAULT_SOUND: &str = "default";

/// A single push notification addressed to one device token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    pub token: String,
    pub title: String,
    pub body: String,
}

impl PushNotification {
    pub fn new(token: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Identifier FCM assigns to an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt(pub String);

impl std::fmt::Display for SendReceipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// FCM HTTP v1 wire format

#[derive(Debug, Serialize)]
pub struct FcmRequest {
    pub message: FcmMessage,
}

#[derive(Debug, Serialize)]
pub struct FcmMessage {
    pub token: String,
    pub notification: FcmNotification,
    pub android: FcmAndroidConfig,
    pub apns: FcmApnsConfig,
}

#[derive(Debug, Serialize)]
pub struct FcmNotification {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct FcmAndroidConfig {
    pub notification: FcmAndroidNotification,
}

#[derive(Debug, Serialize)]
pub struct FcmAndroidNotification {
    pub sound: String,
}

#[derive(Debug, Serialize)]
pub struct FcmApnsConfig {
    pub payload: FcmApnsPayload,
}

#[derive(Debug, Serialize)]
pub struct FcmApnsPayload {
    pub aps: FcmAps,
}

#[derive(Debug, Serialize)]
pub struct FcmAps {
    pub sound: String,
}

#[derive(Debug, Deserialize)]
pub struct FcmResponse {
    pub name: String,
}

impl From<&PushNotification> for FcmRequest {
    fn from(push: &PushNotification) -> Self {
        Self {
            message: FcmMessage {
                token: push.token.clone(),
                notification: FcmNotification {
                    title: push.title.clone(),
                    body: push.body.clone(),
                },
                android: FcmAndroidConfig {
                    notification: FcmAndroidNotification {
                        sound: DEFAULT_SOUND.to_string(),
                    },
                },
                apns: FcmApnsConfig {
                    payload: FcmApnsPayload {
                        aps: FcmAps {
                            sound: DEFAULT_SOUND.to_string(),
                        },
                    },
                },
            },
        }
    }
}
