//! Finnhub HTTP collaborator
//!
//! Owns endpoint dispatch against the configured API root. Auth is a static
//! token injected as a query parameter; requests are single-attempt with
//! errors logged and propagated.

use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

/// Public Finnhub API root
pub const DEFAULT_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Connection settings supplied by the host
#[derive(Debug, Clone)]
pub struct DataSourceSettings {
    pub base_url: String,
    pub api_token: String,
}

impl DataSourceSettings {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_token: api_token.into(),
        }
    }
}

/// The HTTP collaborator seam: the orchestrator only decides paths and
/// parameters, never transport concerns.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// One-shot GET against a kind-specific endpoint.
    async fn get(&self, path: &str, params: &[(String, String)]) -> Result<Value>;

    /// Verbatim passthrough for free-text queries; `path_and_query` may
    /// already carry its own query string.
    async fn get_raw(&self, path_and_query: &str) -> Result<Value>;
}

/// reqwest-backed Finnhub client
pub struct FinnhubClient {
    http: Client,
    base_url: String,
    token: String,
}

impl FinnhubClient {
    pub fn new(settings: &DataSourceSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(AdapterError::Http)?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.api_token.clone(),
        })
    }

    /// Streaming endpoint: the configured base URL with the scheme swapped to
    /// its secure WebSocket variant, the REST path dropped, and the token
    /// carried as a query parameter.
    pub fn websocket_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        url.set_scheme("wss").map_err(|_| {
            AdapterError::Validation(format!(
                "cannot derive a streaming endpoint from {}",
                self.base_url
            ))
        })?;
        url.set_path("");
        url.set_query(Some(&format!("token={}", self.token)));
        Ok(url)
    }

    fn raw_url(&self, path_and_query: &str) -> String {
        let separator = if path_and_query.contains('?') { '&' } else { '?' };
        format!(
            "{}/{}{}token={}",
            self.base_url, path_and_query, separator, self.token
        )
    }

    async fn fetch_json(&self, request: reqwest::RequestBuilder, context: &str) -> Result<Value> {
        let response = request.send().await.map_err(|e| {
            error!(endpoint = context, error = %e, "upstream request failed");
            AdapterError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(endpoint = context, %status, "upstream returned an error status");
            return Err(AdapterError::Upstream(format!(
                "{context} returned {status}"
            )));
        }

        response.json().await.map_err(|e| {
            error!(endpoint = context, error = %e, "failed to decode upstream response");
            AdapterError::from(e)
        })
    }
}

#[async_trait]
impl ApiClient for FinnhubClient {
    async fn get(&self, path: &str, params: &[(String, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "dispatching upstream request");
        let request = self
            .http
            .get(&url)
            .query(params)
            .query(&[("token", self.token.as_str())]);
        self.fetch_json(request, path).await
    }

    async fn get_raw(&self, path_and_query: &str) -> Result<Value> {
        let url = self.raw_url(path_and_query);
        debug!(%url, "dispatching free-text request");
        self.fetch_json(self.http.get(&url), path_and_query).await
    }
}
