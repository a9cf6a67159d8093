use super::firestore_value::Document;
use crate::auth::AccessTokenSource;
use crate::error::{AppError, Result};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;

const PAGE_SIZE: &str = "300";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Read-only client for the Firestore REST API.
#[derive(Clone)]
pub struct FirestoreClient {
    client: reqwest::Client,
    tokens: Arc<dyn AccessTokenSource>,
    documents_url: Url,
}

impl FirestoreClient {
    pub fn new(
        client: reqwest::Client,
        tokens: Arc<dyn AccessTokenSource>,
        base_url: &str,
        project_id: &str,
    ) -> Result<Self> {
        let documents_url = Url::parse(&format!(
            "{}/v1/projects/{}/databases/(default)/documents",
            base_url.trim_end_matches('/'),
            project_id
        ))
        .map_err(|e| AppError::Config(format!("Invalid Firestore URL: {}", e)))?;

        Ok(Self {
            client,
            tokens,
            documents_url,
        })
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        let mut url = self.documents_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config("Firestore URL cannot be a base".to_string()))?
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }

    /// Fetch a single document, `None` when it does not exist.
    pub async fn get_document(&self, path: &str) -> Result<Option<Document>> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .get(self.url_for(path)?)
            .bearer_auth(token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(firestore_error(response).await);
        }

        Ok(Some(response.json().await?))
    }

    /// List every document of a collection, following pagination.
    ///
    /// `mask` restricts the returned fields; an empty mask returns them all.
    pub async fn list_documents(&self, collection: &str, mask: &[&str]) -> Result<Vec<Document>> {
        let url = self.url_for(collection)?;
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = vec![("pageSize", PAGE_SIZE)];
            for field in mask.iter().copied() {
                query.push(("mask.fieldPaths", field));
            }
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let access_token = self.tokens.access_token().await?;
            let response = self
                .client
                .get(url.clone())
                .query(&query)
                .bearer_auth(access_token)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(firestore_error(response).await);
            }

            let page: ListDocumentsResponse = response.json().await?;
            documents.extend(page.documents);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(documents)
    }
}

async fn firestore_error(response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    AppError::Firestore(format!("Firestore returned {}: {}", status, body))
}
