use async_trait::async_trait;
use reqwest::{Error, Response};
use tracing::error;

/// Failure of a single Notion API call.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("request error: {0}")]
    Transport(#[from] Error),
    #[error("notion returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Log the failure with the remote status and body, if there is one.
    pub fn log(&self, action: &str) {
        match self {
            ApiError::Status { status, body } => {
                error!("Notion API error while trying to {}: {}", action, status);
                error!("Response: {}", body);
            }
            other => error!("Notion request failed while trying to {}: {}", action, other),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("missing required fields in schema: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("no properties found in the database schema")]
    Empty,
}

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("failed to read configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[async_trait]
pub trait ResponseExt {
    async fn map_api_error(self) -> Result<Response, ApiError>;
}

#[async_trait]
impl ResponseExt for Response {
    async fn map_api_error(self) -> Result<Response, ApiError> {
        if self.status().is_success() {
            return Ok(self);
        }
        Err(ApiError::Status {
            status: self.status().as_u16(),
            body: self.text().await.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl ResponseExt for Result<Response, Error> {
    async fn map_api_error(self) -> Result<Response, ApiError> {
        match self {
            Ok(response) => response.map_api_error().await,
            Err(e) => Err(ApiError::Transport(e)),
        }
    }
}
