//! In-memory collaborators and fixtures shared by unit tests.

use crate::auth::{AccessTokenSource, ServiceAccountKey};
use crate::error::{AppError, Result};
use crate::notification::{NotificationSender, PushNotification, SendReceipt};
use crate::user::user_models::UserProfile;
use crate::user::UserDirectory;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const TEST_PRIVATE_KEY: &str = include_str!("../testdata/service_account_key.pem");
pub const TEST_PUBLIC_KEY: &str = include_str!("../testdata/service_account_key.pub.pem");

pub fn env_lookup(vars: Vec<(&'static str, String)>) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<&'static str, String> = vars.into_iter().collect();
    move |key| vars.get(key).cloned()
}

pub fn test_service_account(token_uri: &str) -> ServiceAccountKey {
    ServiceAccountKey {
        project_id: "demo-project".to_string(),
        private_key_id: "test-key-id".to_string(),
        private_key: TEST_PRIVATE_KEY.to_string(),
        client_email: "relay@demo-project.iam.gserviceaccount.com".to_string(),
        token_uri: token_uri.to_string(),
    }
}

pub struct StaticToken(pub &'static str);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.to_string())
    }
}

#[derive(Default)]
pub struct InMemoryDirectory {
    users: HashMap<String, UserProfile>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    lookups: AtomicUsize,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: &str, profile: UserProfile) -> Self {
        self.users.insert(user_id.to_string(), profile);
        self
    }

    /// Lookups of `user_id` fail as if the backend were unavailable.
    pub fn failing_for(mut self, user_id: &str) -> Self {
        self.failing.insert(user_id.to_string());
        self
    }

    /// Lookups of `user_id` panic inside the dispatch task.
    pub fn panicking_for(mut self, user_id: &str) -> Self {
        self.panicking.insert(user_id.to_string());
        self
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn find_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        if self.panicking.contains(user_id) {
            panic!("directory crashed looking up {}", user_id);
        }
        if self.failing.contains(user_id) {
            return Err(AppError::Firestore(format!("lookup of {} failed", user_id)));
        }
        Ok(self.users.get(user_id).cloned())
    }
}

pub struct RecordingSender {
    fail: bool,
    attempts: AtomicUsize,
    sent: Mutex<Vec<PushNotification>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self {
            fail: false,
            attempts: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn sent(&self) -> Vec<PushNotification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, push: &PushNotification) -> Result<SendReceipt> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if self.fail {
            return Err(AppError::Push("FCM returned error status 503".to_string()));
        }

        self.sent.lock().unwrap().push(push.clone());
        Ok(SendReceipt(format!("projects/test/messages/{}", attempt)))
    }
}
