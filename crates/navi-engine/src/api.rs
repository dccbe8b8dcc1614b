use async_trait::async_trait;
use navi_common::protocol::{ErrorBody, StartNavigationRequest, StartNavigationResponse};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response. `message` comes from the body when it has one.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("{0}")]
    Other(String),
}

/// Request/response calls the navigation service exposes.
///
/// Step and completion events are not part of this trait; they arrive on the
/// shared event channel.
#[async_trait]
pub trait NavigationApi: Send + Sync {
    /// Ask the server to start driving the browser session.
    async fn start(
        &self,
        request: &StartNavigationRequest,
    ) -> Result<StartNavigationResponse, ApiError>;

    /// Ask the server to stop a running navigation.
    async fn abort(&self, navigation_id: &str) -> Result<(), ApiError>;

    /// Continue a navigation paused for human intervention.
    async fn resume(&self, navigation_id: &str) -> Result<(), ApiError>;
}

pub struct HttpNavigationApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpNavigationApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Self::with_client(base_url, client)
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Other(format!("Not a base URL: {}", base_url)));
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::Other(format!("Not a base URL: {}", self.base_url)))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn post_empty(&self, url: Url) -> Result<(), ApiError> {
        debug!("POST {}", url);
        let resp = self.client.post(url).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(rejection(resp).await)
        }
    }
}

#[async_trait]
impl NavigationApi for HttpNavigationApi {
    async fn start(
        &self,
        request: &StartNavigationRequest,
    ) -> Result<StartNavigationResponse, ApiError> {
        let url = self.endpoint(&["ai-navigation", "start"])?;
        debug!("POST {} (model={})", url, request.model);
        let resp = self.client.post(url).json(request).send().await?;
        if !resp.status().is_success() {
            return Err(rejection(resp).await);
        }
        Ok(resp.json::<StartNavigationResponse>().await?)
    }

    async fn abort(&self, navigation_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["ai-navigation", navigation_id, "abort"])?;
        self.post_empty(url).await
    }

    async fn resume(&self, navigation_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["ai-navigation", navigation_id, "resume"])?;
        self.post_empty(url).await
    }
}

async fn rejection(resp: reqwest::Response) -> ApiError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    ApiError::Rejected {
        status,
        message: rejection_message(status, &body),
    }
}

/// Error text for a non-2xx response: the body's `message` when present,
/// otherwise a generic status-derived message.
pub fn rejection_message(status: u16, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("Request failed with status {}", status))
}
