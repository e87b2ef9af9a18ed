use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::error::{ApiError, ResponseExt};
use crate::settings::NotionSettings;

pub const NOTION_VERSION: &str = "2022-06-28";
const NOTION_VERSION_HEADER: &str = "notion-version";

/// The subset of the Notion REST API this tool consumes.
#[async_trait]
pub trait NotionApi: Send + Sync {
    /// `GET /v1/databases/{id}`
    async fn retrieve_database(&self, database_id: &str) -> Result<Value, ApiError>;
    /// `POST /v1/pages`
    async fn create_page(&self, body: &Value) -> Result<Value, ApiError>;
    /// `GET /v1/pages/{id}`
    async fn retrieve_page(&self, page_id: &str) -> Result<Value, ApiError>;
    /// `PATCH /v1/blocks/{id}/children`
    async fn append_children(&self, block_id: &str, body: &Value) -> Result<Value, ApiError>;
}

#[derive(Clone)]
pub struct NotionClient {
    url: String,
    client: reqwest::Client,
}

impl NotionClient {
    pub fn new(settings: &NotionSettings) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", settings.token))
            .context("NOTION_TOKEN is not a valid header value")?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            HeaderName::from_static(NOTION_VERSION_HEADER),
            HeaderValue::from_static(NOTION_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            url: settings.api_url.clone(),
            client,
        })
    }

    async fn decode(response: reqwest::Response) -> Result<Value, ApiError> {
        response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl NotionApi for NotionClient {
    #[tracing::instrument(skip(self))]
    async fn retrieve_database(&self, database_id: &str) -> Result<Value, ApiError> {
        let url = format!("{}/v1/databases/{}", self.url, database_id);
        let response = self.client.get(&url).send().await.map_api_error().await?;
        Self::decode(response).await
    }

    #[tracing::instrument(skip_all)]
    async fn create_page(&self, body: &Value) -> Result<Value, ApiError> {
        let url = format!("{}/v1/pages", self.url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_api_error()
            .await?;
        Self::decode(response).await
    }

    #[tracing::instrument(skip(self))]
    async fn retrieve_page(&self, page_id: &str) -> Result<Value, ApiError> {
        let url = format!("{}/v1/pages/{}", self.url, page_id);
        let response = self.client.get(&url).send().await.map_api_error().await?;
        Self::decode(response).await
    }

    #[tracing::instrument(skip(self, body))]
    async fn append_children(&self, block_id: &str, body: &Value) -> Result<Value, ApiError> {
        let url = format!("{}/v1/blocks/{}/children", self.url, block_id);
        let response = self
            .client
            .patch(&url)
            .json(body)
            .send()
            .await
            .map_api_error()
            .await?;
        Self::decode(response).await
    }
}

/// In-process stand-in for the Notion API that records every call.
#[cfg(test)]
pub(crate) mod fake {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::NotionApi;
    use crate::error::ApiError;

    pub const PAGE_ID: &str = "8a1f3c52-page";

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        RetrieveDatabase(String),
        CreatePage(Value),
        RetrievePage(String),
        AppendChildren(String, Value),
    }

    #[derive(Default)]
    pub struct FakeNotion {
        /// Body returned by `retrieve_database`; `None` answers 404.
        pub database: Option<Value>,
        /// Status to fail `create_page` with.
        pub create_status: Option<u16>,
        /// Omit `id` from the create response.
        pub create_without_id: bool,
        /// Number of `retrieve_page` calls answered with 404 before the page shows up.
        pub hidden_for: usize,
        /// Status every `retrieve_page` call fails with, e.g. 401.
        pub lookup_status: Option<u16>,
        pub(crate) page_lookups: AtomicUsize,
        pub(crate) calls: Mutex<Vec<Call>>,
    }

    impl FakeNotion {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn creates(&self) -> Vec<Value> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::CreatePage(body) => Some(body),
                    _ => None,
                })
                .collect()
        }

        pub fn appends(&self) -> Vec<(String, Value)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::AppendChildren(id, body) => Some((id, body)),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    fn not_found() -> ApiError {
        ApiError::Status {
            status: 404,
            body: r#"{"object":"error","code":"object_not_found"}"#.to_string(),
        }
    }

    #[async_trait]
    impl NotionApi for FakeNotion {
        async fn retrieve_database(&self, database_id: &str) -> Result<Value, ApiError> {
            self.record(Call::RetrieveDatabase(database_id.to_string()));
            self.database.clone().ok_or_else(not_found)
        }

        async fn create_page(&self, body: &Value) -> Result<Value, ApiError> {
            self.record(Call::CreatePage(body.clone()));
            if let Some(status) = self.create_status {
                return Err(ApiError::Status {
                    status,
                    body: r#"{"object":"error","code":"validation_error"}"#.to_string(),
                });
            }
            if self.create_without_id {
                return Ok(json!({ "object": "page" }));
            }
            Ok(json!({ "object": "page", "id": PAGE_ID }))
        }

        async fn retrieve_page(&self, page_id: &str) -> Result<Value, ApiError> {
            self.record(Call::RetrievePage(page_id.to_string()));
            if let Some(status) = self.lookup_status {
                return Err(ApiError::Status {
                    status,
                    body: r#"{"object":"error","code":"unauthorized"}"#.to_string(),
                });
            }
            if self.page_lookups.fetch_add(1, Ordering::SeqCst) < self.hidden_for {
                return Err(not_found());
            }
            Ok(json!({ "object": "page", "id": page_id }))
        }

        async fn append_children(&self, block_id: &str, body: &Value) -> Result<Value, ApiError> {
            self.record(Call::AppendChildren(block_id.to_string(), body.clone()));
            Ok(json!({ "object": "list", "results": [] }))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn settings(token: &str) -> NotionSettings {
        NotionSettings {
            token: token.to_string(),
            database_id: "db-1".to_string(),
            api_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn builds_with_plain_token() {
        assert!(NotionClient::new(&settings("secret_abc123")).is_ok());
    }

    #[test]
    fn rejects_token_with_newline() {
        assert!(NotionClient::new(&settings("secret\nabc")).is_err());
    }

    #[tokio::test]
    async fn unreachable_api_is_transport_error() {
        let client = NotionClient::new(&settings("secret_abc123")).unwrap();
        let err = client.retrieve_database("db-1").await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
