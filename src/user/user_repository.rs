use super::user_models::UserProfile;
use crate::error::Result;
use crate::firestore::FirestoreClient;
use async_trait::async_trait;

/// Point lookup of user profiles by id.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;
}

#[derive(Clone)]
pub struct FirestoreUserDirectory {
    client: FirestoreClient,
    collection: String,
}

impl FirestoreUserDirectory {
    pub fn new(client: FirestoreClient, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl UserDirectory for FirestoreUserDirectory {
    async fn find_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let path = format!("{}/{}", self.collection, user_id);
        let doc = self.client.get_document(&path).await?;

        Ok(doc.as_ref().map(UserProfile::from_document))
    }
}
